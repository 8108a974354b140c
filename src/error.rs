//! Error types for the artifact store

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::entity::EntityType;

/// Result type for store operations
pub type Result<T> = std::result::Result<T, StoreError>;

/// A single field-level validation message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldError {
    /// Field name (`id`, `status`, `starting_state.view`, ...)
    pub field: String,
    /// Human-readable message
    pub message: String,
}

impl FieldError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// A forward reference whose target does not exist
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MissingReference {
    /// Relation field on the owning entity
    pub field: String,
    /// Expected type of the target
    pub target_type: EntityType,
    /// The id that could not be resolved
    pub target_id: String,
}

impl fmt::Display for MissingReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} '{}' does not exist (field {})",
            self.target_type.display_name(),
            self.target_id,
            self.field
        )
    }
}

/// An entity that still points at another one
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dependent {
    pub entity_type: EntityType,
    pub id: String,
    pub field: String,
}

impl fmt::Display for Dependent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} '{}' ({})", self.entity_type.display_name(), self.id, self.field)
    }
}

fn join<T: fmt::Display>(items: &[T]) -> String {
    items.iter().map(|i| i.to_string()).collect::<Vec<_>>().join("; ")
}

/// Artifact store errors
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Invalid {entity_type} '{id}': {}", join(.errors))]
    Validation {
        entity_type: EntityType,
        id: String,
        errors: Vec<FieldError>,
    },

    #[error("{} '{id}' already exists", .entity_type.display_name())]
    AlreadyExists { entity_type: EntityType, id: String },

    #[error("{} '{id}' has broken references: {}", .entity_type.display_name(), join(.missing))]
    Reference {
        entity_type: EntityType,
        id: String,
        missing: Vec<MissingReference>,
    },

    #[error("{} '{id}' not found", .entity_type.display_name())]
    NotFound { entity_type: EntityType, id: String },

    #[error("Cannot delete {} '{id}': still referenced by {}", .entity_type.display_name(), join(.dependents))]
    HasDependents {
        entity_type: EntityType,
        id: String,
        dependents: Vec<Dependent>,
    },

    #[error("ID of {} '{id}' is immutable (attempted to change it to '{attempted}')", .entity_type.display_name())]
    ImmutableId {
        entity_type: EntityType,
        id: String,
        attempted: String,
    },

    #[error("{} '{id}' has schema {stored}, newer than supported {current}; upgrade before editing it", .entity_type.display_name())]
    IncompatibleSchema {
        entity_type: EntityType,
        id: String,
        stored: String,
        current: String,
    },

    #[error("{} '{id}' is indexed but its file {} is gone; refresh the store", .entity_type.display_name(), .path.display())]
    MissingFile {
        entity_type: EntityType,
        id: String,
        path: PathBuf,
    },

    #[error("Migration failed: {0}")]
    Migration(String),

    #[error("Invalid version: {0}")]
    InvalidVersion(String),

    #[error("Unsupported operation: {0}")]
    Unsupported(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl StoreError {
    /// True for errors a caller should render as "not found"
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound { .. })
    }

    /// Field-level messages when this is a validation failure
    pub fn field_errors(&self) -> &[FieldError] {
        match self {
            StoreError::Validation { errors, .. } => errors,
            _ => &[],
        }
    }
}
