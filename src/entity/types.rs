//! Typed entity records
//!
//! Field order here is the field order on disk. Required domain fields are
//! plain `String`s defaulting to empty so a missing value surfaces as a
//! field-level validation message instead of an opaque parse failure.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::VersionMeta;

// =============================================================================
// Vocabularies
// =============================================================================

macro_rules! vocabulary {
    (
        $(#[$doc:meta])*
        $name:ident { $default:ident => $default_str:literal $(, $variant:ident => $text:literal)* $(,)? }
    ) => {
        $(#[$doc])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
        pub enum $name {
            #[default]
            #[serde(rename = $default_str)]
            $default,
            $(
                #[serde(rename = $text)]
                $variant,
            )*
        }

        impl $name {
            /// Accepted on-disk spellings
            pub const VALUES: &'static [&'static str] = &[$default_str $(, $text)*];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $name::$default => $default_str,
                    $($name::$variant => $text,)*
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

vocabulary! {
    /// Lifecycle of a workflow
    WorkflowStatus {
        Draft => "draft",
        Designed => "designed",
        Validated => "validated",
        Implementing => "implementing",
        Implemented => "implemented",
        Deprecated => "deprecated",
    }
}

vocabulary! {
    /// Build status shared by capabilities and components
    ImplementationStatus {
        Planned => "planned",
        InProgress => "in-progress",
        Implemented => "implemented",
        Deprecated => "deprecated",
    }
}

vocabulary! {
    ExpertiseLevel {
        Intermediate => "intermediate",
        Novice => "novice",
        Expert => "expert",
    }
}

vocabulary! {
    /// Whether a test run was simulated or performed with a real user
    TestType {
        Simulated => "simulated",
        Real => "real",
    }
}

// =============================================================================
// Workflow
// =============================================================================

/// Where a workflow begins
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StartingState {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_loaded: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub view: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
}

impl StartingState {
    pub fn is_empty(&self) -> bool {
        self.data_loaded.is_none() && self.view.is_none() && self.context.is_none()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Workflow {
    pub id: String,
    pub name: String,
    pub category: String,
    pub goal: String,
    pub status: WorkflowStatus,
    pub validated: bool,
    pub personas: Vec<String>,
    pub requires_capabilities: Vec<String>,
    pub suggested_components: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub starting_state: Option<StartingState>,
    pub success_criteria: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub implementation_notes: Option<String>,
    #[serde(flatten)]
    pub meta: VersionMeta,
}

// =============================================================================
// Capability
// =============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Capability {
    pub id: String,
    pub name: String,
    pub category: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub status: ImplementationStatus,
    pub algorithms: Vec<String>,
    pub used_by_workflows: Vec<String>,
    pub implemented_by_components: Vec<String>,
    #[serde(flatten)]
    pub meta: VersionMeta,
}

// =============================================================================
// Persona
// =============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Persona {
    pub id: String,
    pub name: String,
    pub role: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub expertise_level: ExpertiseLevel,
    pub goals: Vec<String>,
    pub pain_points: Vec<String>,
    pub workflows: Vec<String>,
    #[serde(flatten)]
    pub meta: VersionMeta,
}

// =============================================================================
// Component
// =============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Component {
    pub id: String,
    pub name: String,
    pub category: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub status: ImplementationStatus,
    pub implements_capabilities: Vec<String>,
    pub dependencies: Vec<String>,
    pub used_in_workflows: Vec<String>,
    #[serde(flatten)]
    pub meta: VersionMeta,
}

// =============================================================================
// Design Tokens
// =============================================================================

/// A token set; `extends` names a single parent set whose values it overrides
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Tokens {
    pub id: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extends: Option<String>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub colors: BTreeMap<String, serde_json::Value>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub spacing: BTreeMap<String, serde_json::Value>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub typography: BTreeMap<String, serde_json::Value>,
    #[serde(flatten)]
    pub meta: VersionMeta,
}

// =============================================================================
// View / Interaction
// =============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct View {
    pub id: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub layout: Option<String>,
    pub components: Vec<String>,
    pub workflows: Vec<String>,
    #[serde(flatten)]
    pub meta: VersionMeta,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Interaction {
    pub id: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub trigger: String,
    pub components: Vec<String>,
    #[serde(flatten)]
    pub meta: VersionMeta,
}

// =============================================================================
// Test Result
// =============================================================================

/// Outcome of running a workflow as a persona
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TestResult {
    pub id: String,
    pub workflow: String,
    pub persona: String,
    pub test_type: TestType,
    pub passed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(flatten)]
    pub meta: VersionMeta,
}
