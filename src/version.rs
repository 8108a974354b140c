//! Version metadata utilities
//!
//! Stamps `version`, `schema_version`, `created_at` and `updated_at` on every
//! write and classifies stored schema versions against the running release.

use chrono::{SecondsFormat, Utc};
use semver::Version;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::entity::{EntityType, VersionMeta};
use crate::error::{Result, StoreError};

/// Shape version produced by this release
pub const CURRENT_SCHEMA_VERSION: &str = "1.1.0";
/// Oldest shape this release reads without migration
pub const MINIMUM_COMPATIBLE_VERSION: &str = "1.0.0";
/// Stand-in for files written before `schema_version` existed
pub const LEGACY_SCHEMA_VERSION: &str = "0.0.0";
/// Content version of a freshly created entity
pub const INITIAL_VERSION: &str = "1.0.0";

/// Parse `major.minor.patch`; anything else compares as `0.0.0`
pub fn parse_lenient(raw: &str) -> Version {
    let parts: Vec<&str> = raw.trim().split('.').collect();
    if parts.len() != 3 {
        return Version::new(0, 0, 0);
    }
    match (parts[0].parse(), parts[1].parse(), parts[2].parse()) {
        (Ok(major), Ok(minor), Ok(patch)) => Version::new(major, minor, patch),
        _ => Version::new(0, 0, 0),
    }
}

/// Parse a version strictly, stripping a leading `v`
pub fn parse_strict(raw: &str) -> Result<Version> {
    let raw = raw.strip_prefix('v').unwrap_or(raw);
    let version = Version::parse(raw).map_err(|e| StoreError::InvalidVersion(format!("{}: {}", raw, e)))?;
    Ok(Version::new(version.major, version.minor, version.patch))
}

/// Bump the patch component
pub fn bump_patch(raw: &str) -> Result<String> {
    let v = parse_strict(raw)?;
    Ok(Version::new(v.major, v.minor, v.patch + 1).to_string())
}

/// RFC 3339 timestamp with millisecond precision
pub fn timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

// =============================================================================
// Stamping
// =============================================================================

/// Metadata for a brand new entity
pub fn stamp_created(meta: &mut VersionMeta) {
    let now = timestamp();
    meta.version = Some(INITIAL_VERSION.to_string());
    meta.schema_version = Some(CURRENT_SCHEMA_VERSION.to_string());
    meta.created_at = Some(now.clone());
    meta.updated_at = Some(now);
}

/// Metadata for a content update: patch bump plus legacy backfill
pub fn stamp_updated(meta: &mut VersionMeta) -> Result<()> {
    let next = match meta.version.as_deref() {
        Some(current) => bump_patch(current)?,
        None => bump_patch(INITIAL_VERSION)?,
    };
    let now = timestamp();
    meta.version = Some(next);
    meta.schema_version = Some(CURRENT_SCHEMA_VERSION.to_string());
    meta.created_at.get_or_insert_with(|| now.clone());
    meta.updated_at = Some(now);
    Ok(())
}

/// Metadata for a store-maintained rewrite (back-reference refresh); content version unchanged
pub fn stamp_touched(meta: &mut VersionMeta) {
    let now = timestamp();
    meta.version.get_or_insert_with(|| INITIAL_VERSION.to_string());
    meta.schema_version = Some(CURRENT_SCHEMA_VERSION.to_string());
    meta.created_at.get_or_insert_with(|| now.clone());
    meta.updated_at = Some(now);
}

// =============================================================================
// Schema Version Checks
// =============================================================================

/// Severity of a schema-version verdict
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Error,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Info => write!(f, "info"),
            Self::Warning => write!(f, "warning"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// Verdict for a stored schema version
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaVersionCheck {
    pub compatible: bool,
    pub needs_migration: bool,
    pub severity: Severity,
    pub message: String,
    pub stored_version: String,
    pub current_version: String,
}

/// Classify a stored schema version; absent means legacy `0.0.0`
pub fn check_schema_version(stored: Option<&str>) -> SchemaVersionCheck {
    let stored_raw = stored.unwrap_or(LEGACY_SCHEMA_VERSION).to_string();
    let stored_v = parse_lenient(&stored_raw);
    let current = parse_lenient(CURRENT_SCHEMA_VERSION);
    let minimum = parse_lenient(MINIMUM_COMPATIBLE_VERSION);
    let legacy = parse_lenient(LEGACY_SCHEMA_VERSION);

    let verdict = |compatible, needs_migration, severity, message: String| SchemaVersionCheck {
        compatible,
        needs_migration,
        severity,
        message,
        stored_version: stored_raw.clone(),
        current_version: CURRENT_SCHEMA_VERSION.to_string(),
    };

    if stored_v > current {
        verdict(
            false,
            false,
            Severity::Error,
            format!(
                "Entity from a newer release (schema {} > {}); upgrade this tool before editing it",
                stored_raw, CURRENT_SCHEMA_VERSION
            ),
        )
    } else if stored_v == current {
        verdict(true, false, Severity::Info, "Schema version is current".to_string())
    } else if stored_v >= minimum {
        verdict(
            true,
            false,
            Severity::Info,
            format!("Schema {} is compatible with {}", stored_raw, CURRENT_SCHEMA_VERSION),
        )
    } else if stored_v == legacy {
        verdict(
            true,
            true,
            Severity::Warning,
            "Legacy entity without schema version; it will be upgraded on next write".to_string(),
        )
    } else if stored_v.major < minimum.major {
        verdict(
            false,
            true,
            Severity::Error,
            format!(
                "Schema {} predates minimum compatible version {}; migration required",
                stored_raw, MINIMUM_COMPATIBLE_VERSION
            ),
        )
    } else {
        verdict(
            true,
            true,
            Severity::Warning,
            format!("Schema {} is older than {}; migration recommended", stored_raw, CURRENT_SCHEMA_VERSION),
        )
    }
}

/// True when `stored` was written by a newer release than this one
pub fn is_from_newer_release(stored: Option<&str>) -> bool {
    let check = check_schema_version(stored);
    !check.compatible && !check.needs_migration
}

/// Schema drift entry carried by the validation report
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaWarning {
    pub entity_type: EntityType,
    pub entity_id: String,
    pub stored_version: String,
    pub current_version: String,
    pub severity: Severity,
    pub message: String,
}

impl fmt::Display for SchemaWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[Schema] {} '{}' ({} -> {}, {}): {}",
            self.entity_type.display_name(),
            self.entity_id,
            self.stored_version,
            self.current_version,
            self.severity,
            self.message
        )
    }
}

/// Warning for an entity whose schema version needs attention, if any
pub fn create_schema_warning(
    entity_type: EntityType,
    entity_id: &str,
    stored: Option<&str>,
) -> Option<SchemaWarning> {
    let check = check_schema_version(stored);
    if check.compatible && !check.needs_migration {
        return None;
    }
    Some(SchemaWarning {
        entity_type,
        entity_id: entity_id.to_string(),
        stored_version: check.stored_version,
        current_version: check.current_version,
        severity: check.severity,
        message: check.message,
    })
}
