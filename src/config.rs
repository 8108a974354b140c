//! Configuration for the artifact store and its reports
//!
//! Supports loading configuration from:
//! - Default values
//! - Config file (artifacts.toml)
//! - Environment variables (ARTIFACTS__*)
//!
//! ## Example config file (artifacts.toml):
//! ```toml
//! [store]
//! data_dir = "./design"
//!
//! [analysis]
//! low_coverage_threshold = 2
//! priority_limit = 10
//!
//! [diagram]
//! default_depth = 1
//! format = "mermaid"
//!
//! [scaffold]
//! default_format = "vitest"
//! ```

use config_crate::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::codegen::TestFormat;
use crate::graph::DiagramFormat;

/// Main configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default)]
    pub store: StoreSection,

    /// Gap and priority reports
    #[serde(default)]
    pub analysis: AnalysisConfig,

    #[serde(default)]
    pub diagram: DiagramConfig,

    /// Test scaffold generation
    #[serde(default)]
    pub scaffold: ScaffoldConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreSection {
    /// Root holding one subdirectory per entity type
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisConfig {
    /// Categories with fewer entities than this are reported as gaps
    #[serde(default = "default_low_coverage_threshold")]
    pub low_coverage_threshold: usize,

    /// Cap on priority results; unbounded when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority_limit: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiagramConfig {
    #[serde(default = "default_depth")]
    pub default_depth: usize,

    #[serde(default)]
    pub format: DiagramFormat,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScaffoldConfig {
    #[serde(default)]
    pub default_format: TestFormat,
}

// Default value functions
fn default_data_dir() -> PathBuf {
    PathBuf::from(".")
}

fn default_low_coverage_threshold() -> usize {
    2
}

fn default_depth() -> usize {
    1
}

impl Default for StoreSection {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
        }
    }
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            low_coverage_threshold: default_low_coverage_threshold(),
            priority_limit: None,
        }
    }
}

impl Default for DiagramConfig {
    fn default() -> Self {
        Self {
            default_depth: default_depth(),
            format: DiagramFormat::default(),
        }
    }
}

impl StoreConfig {
    /// Load configuration from default locations
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(None)
    }

    /// Load configuration, layering an explicit file over the default locations
    pub fn load_from(config_path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut builder = Config::builder();

        for location in ["artifacts.toml", ".artifacts.toml", "config/artifacts.toml"] {
            builder = builder.add_source(File::with_name(location).required(false));
        }

        if let Some(dirs) = directories::ProjectDirs::from("dev", "design", "artifacts") {
            let xdg_config = dirs.config_dir().join("artifacts.toml");
            if xdg_config.exists() {
                builder = builder.add_source(File::from(xdg_config).required(false));
            }
        }

        if let Some(path) = config_path {
            builder = builder.add_source(File::from(path).required(true));
        }

        // ARTIFACTS__STORE__DATA_DIR=./design
        builder = builder.add_source(
            Environment::with_prefix("ARTIFACTS")
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

        builder.build()?.try_deserialize()
    }

    /// Save configuration to a file
    pub fn save(&self, path: &Path) -> std::io::Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        std::fs::write(path, content)
    }

    /// Data directory, resolved against the working directory when relative
    pub fn data_dir(&self) -> PathBuf {
        if self.store.data_dir.is_absolute() {
            self.store.data_dir.clone()
        } else {
            std::env::current_dir()
                .unwrap_or_default()
                .join(&self.store.data_dir)
        }
    }
}
