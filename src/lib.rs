//! Design Artifact Store
//!
//! A file-backed store and consistency engine for design artifacts:
//! workflows, the capabilities and components they need, the personas who
//! perform them, and the design tokens, views, interactions and test results
//! around them.
//!
//! ## Features
//!
//! - **Flat YAML files**: one human-editable file per entity, one directory per type
//! - **Typed validation**: every record is decoded into its own struct and checked field by field
//! - **Bidirectional references**: back-reference arrays are kept in step with forward references
//! - **Schema migrations**: old files are upgraded on load without being rewritten
//! - **Reports**: validation, orphans, gaps, priorities, coverage, diagrams and test scaffolds
//!
//! ## Layout
//!
//! ```text
//! <data_dir>/
//! ├── workflows/W01.yaml
//! ├── capabilities/data-export.yaml
//! ├── personas/analyst.yaml
//! ├── components/
//! ├── tokens/
//! ├── views/
//! ├── interactions/
//! └── test-results/
//! ```

pub mod analysis;
pub mod checksum;
pub mod codec;
pub mod codegen;
pub mod config;
pub mod entity;
pub mod error;
pub mod graph;
pub mod migration;
pub mod search;
pub mod store;
pub mod version;

pub use analysis::{coverage_report, suggest_priority, CoverageReport, PriorityFocus, PriorityReport};
pub use checksum::Checksum;
pub use codegen::{generate_tests, TestFormat};
pub use config::StoreConfig;
pub use entity::{Entity, EntityType, VersionMeta};
pub use error::{Result, StoreError};
pub use graph::{
    find_gaps, find_orphans, render_diagram, validate, DiagramFormat, DiagramOptions, GapReport,
    RelationshipGraph, ValidationReport,
};
pub use migration::{Migration, MigrationRegistry};
pub use search::{search, SearchHit};
pub use store::{DeleteOptions, DeleteOutcome, EntityStore, ListFilter, LoadReport};
pub use version::{check_schema_version, CURRENT_SCHEMA_VERSION};
