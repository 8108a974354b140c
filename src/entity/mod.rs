//! Entity Model
//!
//! Closed set of entity variants, each backed by its own strongly-typed record.
//! Relationships are plain id arrays embedded in the owning record; the
//! [`RELATIONS`] table is the single description of which field points where
//! and which back-reference array mirrors it.

pub mod types;
pub mod validate;

pub use types::{
    Capability, Component, ExpertiseLevel, ImplementationStatus, Interaction, Persona,
    StartingState, TestResult, TestType, Tokens, View, Workflow, WorkflowStatus,
};
pub use validate::{parse_entity, EntityRecord, ID_PATTERN_KEBAB, ID_PATTERN_TEST_RESULT, ID_PATTERN_WORKFLOW};

use serde::{Deserialize, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

use crate::error::StoreError;

// =============================================================================
// Entity Type
// =============================================================================

/// Kind of entity managed by the store
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EntityType {
    Workflow,
    Capability,
    Persona,
    Component,
    Tokens,
    View,
    Interaction,
    TestResult,
}

impl EntityType {
    /// Every type, in load order
    pub const ALL: [EntityType; 8] = [
        EntityType::Workflow,
        EntityType::Capability,
        EntityType::Persona,
        EntityType::Component,
        EntityType::Tokens,
        EntityType::View,
        EntityType::Interaction,
        EntityType::TestResult,
    ];

    /// Types that must be reachable from some workflow
    pub const ORPHAN_CHECKED: [EntityType; 3] = [
        EntityType::Capability,
        EntityType::Persona,
        EntityType::Component,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EntityType::Workflow => "workflow",
            EntityType::Capability => "capability",
            EntityType::Persona => "persona",
            EntityType::Component => "component",
            EntityType::Tokens => "tokens",
            EntityType::View => "view",
            EntityType::Interaction => "interaction",
            EntityType::TestResult => "test-result",
        }
    }

    /// Capitalized name used in user-facing messages
    pub fn display_name(&self) -> &'static str {
        match self {
            EntityType::Workflow => "Workflow",
            EntityType::Capability => "Capability",
            EntityType::Persona => "Persona",
            EntityType::Component => "Component",
            EntityType::Tokens => "Tokens",
            EntityType::View => "View",
            EntityType::Interaction => "Interaction",
            EntityType::TestResult => "TestResult",
        }
    }

    /// Subdirectory of the data root holding this type
    pub fn dir_name(&self) -> &'static str {
        match self {
            EntityType::Workflow => "workflows",
            EntityType::Capability => "capabilities",
            EntityType::Persona => "personas",
            EntityType::Component => "components",
            EntityType::Tokens => "tokens",
            EntityType::View => "views",
            EntityType::Interaction => "interactions",
            EntityType::TestResult => "test-results",
        }
    }

    /// Forward relations owned by this type
    pub fn relations(&self) -> impl Iterator<Item = &'static Relation> {
        let owner = *self;
        RELATIONS.iter().filter(move |r| r.owner == owner)
    }

    /// Relations whose back-reference array lives on this type
    pub fn mirrored_relations(&self) -> impl Iterator<Item = &'static Relation> {
        let target = *self;
        RELATIONS
            .iter()
            .filter(move |r| r.target == target && r.back_field.is_some())
    }

    /// Names of the back-reference fields stored on this type
    pub fn back_fields(&self) -> Vec<&'static str> {
        self.mirrored_relations().filter_map(|r| r.back_field).collect()
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for EntityType {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase().replace('_', "-");
        EntityType::ALL
            .into_iter()
            .find(|t| t.as_str() == normalized || t.dir_name() == normalized)
            .ok_or_else(|| StoreError::Unsupported(format!("unknown entity type '{}'", s)))
    }
}

// =============================================================================
// Relations
// =============================================================================

/// A forward relation field and the back-reference array that mirrors it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Relation {
    pub owner: EntityType,
    pub field: &'static str,
    pub target: EntityType,
    /// Edge label used by the diagram renderer
    pub label: &'static str,
    /// Back-reference array on the target, if the store maintains one
    pub back_field: Option<&'static str>,
}

pub const RELATIONS: &[Relation] = &[
    Relation {
        owner: EntityType::Workflow,
        field: "requires_capabilities",
        target: EntityType::Capability,
        label: "requires",
        back_field: Some("used_by_workflows"),
    },
    Relation {
        owner: EntityType::Workflow,
        field: "personas",
        target: EntityType::Persona,
        label: "involves",
        back_field: Some("workflows"),
    },
    Relation {
        owner: EntityType::Workflow,
        field: "suggested_components",
        target: EntityType::Component,
        label: "uses",
        back_field: Some("used_in_workflows"),
    },
    Relation {
        owner: EntityType::Component,
        field: "implements_capabilities",
        target: EntityType::Capability,
        label: "implements",
        back_field: Some("implemented_by_components"),
    },
    Relation {
        owner: EntityType::Component,
        field: "dependencies",
        target: EntityType::Component,
        label: "depends on",
        back_field: None,
    },
    Relation {
        owner: EntityType::Tokens,
        field: "extends",
        target: EntityType::Tokens,
        label: "extends",
        back_field: None,
    },
    Relation {
        owner: EntityType::View,
        field: "components",
        target: EntityType::Component,
        label: "contains",
        back_field: None,
    },
    Relation {
        owner: EntityType::View,
        field: "workflows",
        target: EntityType::Workflow,
        label: "supports",
        back_field: None,
    },
    Relation {
        owner: EntityType::Interaction,
        field: "components",
        target: EntityType::Component,
        label: "applies to",
        back_field: None,
    },
    Relation {
        owner: EntityType::TestResult,
        field: "workflow",
        target: EntityType::Workflow,
        label: "tests",
        back_field: None,
    },
    Relation {
        owner: EntityType::TestResult,
        field: "persona",
        target: EntityType::Persona,
        label: "as",
        back_field: None,
    },
];

// =============================================================================
// Version Metadata
// =============================================================================

/// Universal version metadata, optional on read and stamped on write
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionMeta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema_version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
}

impl VersionMeta {
    pub const FIELDS: [&'static str; 4] = ["version", "schema_version", "created_at", "updated_at"];
}

// =============================================================================
// Entity
// =============================================================================

/// One persisted record of any type
#[derive(Debug, Clone, PartialEq)]
pub enum Entity {
    Workflow(Workflow),
    Capability(Capability),
    Persona(Persona),
    Component(Component),
    Tokens(Tokens),
    View(View),
    Interaction(Interaction),
    TestResult(TestResult),
}

macro_rules! dispatch {
    ($entity:expr, $record:ident => $body:expr) => {
        match $entity {
            Entity::Workflow($record) => $body,
            Entity::Capability($record) => $body,
            Entity::Persona($record) => $body,
            Entity::Component($record) => $body,
            Entity::Tokens($record) => $body,
            Entity::View($record) => $body,
            Entity::Interaction($record) => $body,
            Entity::TestResult($record) => $body,
        }
    };
}

fn option_slice(value: &Option<String>) -> Vec<&str> {
    value.as_deref().into_iter().collect()
}

fn vec_slice(values: &[String]) -> Vec<&str> {
    values.iter().map(String::as_str).collect()
}

impl Entity {
    pub fn entity_type(&self) -> EntityType {
        match self {
            Entity::Workflow(_) => EntityType::Workflow,
            Entity::Capability(_) => EntityType::Capability,
            Entity::Persona(_) => EntityType::Persona,
            Entity::Component(_) => EntityType::Component,
            Entity::Tokens(_) => EntityType::Tokens,
            Entity::View(_) => EntityType::View,
            Entity::Interaction(_) => EntityType::Interaction,
            Entity::TestResult(_) => EntityType::TestResult,
        }
    }

    pub fn id(&self) -> &str {
        dispatch!(self, r => r.id())
    }

    pub fn meta(&self) -> &VersionMeta {
        dispatch!(self, r => r.meta())
    }

    pub fn meta_mut(&mut self) -> &mut VersionMeta {
        dispatch!(self, r => r.meta_mut())
    }

    /// Display name; test results fall back to their id
    pub fn name(&self) -> &str {
        match self {
            Entity::Workflow(w) => &w.name,
            Entity::Capability(c) => &c.name,
            Entity::Persona(p) => &p.name,
            Entity::Component(c) => &c.name,
            Entity::Tokens(t) => &t.name,
            Entity::View(v) => &v.name,
            Entity::Interaction(i) => &i.name,
            Entity::TestResult(t) => &t.id,
        }
    }

    pub fn category(&self) -> Option<&str> {
        match self {
            Entity::Workflow(w) => Some(&w.category),
            Entity::Capability(c) => Some(&c.category),
            Entity::Component(c) => Some(&c.category),
            Entity::Persona(p) => Some(&p.role),
            _ => None,
        }
    }

    pub fn status(&self) -> Option<&str> {
        match self {
            Entity::Workflow(w) => Some(w.status.as_str()),
            Entity::Capability(c) => Some(c.status.as_str()),
            Entity::Component(c) => Some(c.status.as_str()),
            Entity::TestResult(t) => Some(if t.passed { "passed" } else { "failed" }),
            _ => None,
        }
    }

    /// Ids listed in a forward relation field
    pub fn forward_refs(&self, field: &str) -> Vec<&str> {
        match (self, field) {
            (Entity::Workflow(w), "requires_capabilities") => vec_slice(&w.requires_capabilities),
            (Entity::Workflow(w), "personas") => vec_slice(&w.personas),
            (Entity::Workflow(w), "suggested_components") => vec_slice(&w.suggested_components),
            (Entity::Component(c), "implements_capabilities") => vec_slice(&c.implements_capabilities),
            (Entity::Component(c), "dependencies") => vec_slice(&c.dependencies),
            (Entity::Tokens(t), "extends") => option_slice(&t.extends),
            (Entity::View(v), "components") => vec_slice(&v.components),
            (Entity::View(v), "workflows") => vec_slice(&v.workflows),
            (Entity::Interaction(i), "components") => vec_slice(&i.components),
            (Entity::TestResult(t), "workflow") => vec![t.workflow.as_str()],
            (Entity::TestResult(t), "persona") => vec![t.persona.as_str()],
            _ => Vec::new(),
        }
    }

    /// Back-reference array by field name
    pub fn back_refs(&self, field: &str) -> Option<&Vec<String>> {
        match (self, field) {
            (Entity::Capability(c), "used_by_workflows") => Some(&c.used_by_workflows),
            (Entity::Capability(c), "implemented_by_components") => Some(&c.implemented_by_components),
            (Entity::Persona(p), "workflows") => Some(&p.workflows),
            (Entity::Component(c), "used_in_workflows") => Some(&c.used_in_workflows),
            _ => None,
        }
    }

    pub fn back_refs_mut(&mut self, field: &str) -> Option<&mut Vec<String>> {
        match (self, field) {
            (Entity::Capability(c), "used_by_workflows") => Some(&mut c.used_by_workflows),
            (Entity::Capability(c), "implemented_by_components") => Some(&mut c.implemented_by_components),
            (Entity::Persona(p), "workflows") => Some(&mut p.workflows),
            (Entity::Component(c), "used_in_workflows") => Some(&mut c.used_in_workflows),
            _ => None,
        }
    }

    /// True when any forward or back-reference field lists `id`
    pub fn mentions(&self, id: &str) -> bool {
        let ty = self.entity_type();
        ty.relations().any(|r| self.forward_refs(r.field).contains(&id))
            || ty
                .back_fields()
                .into_iter()
                .any(|f| self.back_refs(f).is_some_and(|ids| ids.iter().any(|x| x == id)))
    }

    /// Generic data view used by merges and migrations
    pub fn to_value(&self) -> serde_json::Result<serde_json::Value> {
        serde_json::to_value(self)
    }

    /// Canonical on-disk text
    pub fn to_yaml(&self) -> serde_yaml::Result<String> {
        serde_yaml::to_string(self)
    }

    pub fn as_workflow(&self) -> Option<&Workflow> {
        match self {
            Entity::Workflow(w) => Some(w),
            _ => None,
        }
    }

    pub fn as_capability(&self) -> Option<&Capability> {
        match self {
            Entity::Capability(c) => Some(c),
            _ => None,
        }
    }

    pub fn as_persona(&self) -> Option<&Persona> {
        match self {
            Entity::Persona(p) => Some(p),
            _ => None,
        }
    }

    pub fn as_component(&self) -> Option<&Component> {
        match self {
            Entity::Component(c) => Some(c),
            _ => None,
        }
    }

    pub fn as_test_result(&self) -> Option<&TestResult> {
        match self {
            Entity::TestResult(t) => Some(t),
            _ => None,
        }
    }
}

/// Serializes as the bare record, without a type tag
impl Serialize for Entity {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        dispatch!(self, r => r.serialize(serializer))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entity_type_parsing() {
        assert_eq!("workflow".parse::<EntityType>().unwrap(), EntityType::Workflow);
        assert_eq!("capabilities".parse::<EntityType>().unwrap(), EntityType::Capability);
        assert_eq!("test_result".parse::<EntityType>().unwrap(), EntityType::TestResult);
        assert!("gizmo".parse::<EntityType>().is_err());
    }

    #[test]
    fn test_back_fields_follow_relation_table() {
        let mut capability = EntityType::Capability.back_fields();
        capability.sort();
        assert_eq!(capability, vec!["implemented_by_components", "used_by_workflows"]);
        assert_eq!(EntityType::Persona.back_fields(), vec!["workflows"]);
        assert!(EntityType::Workflow.back_fields().is_empty());
    }

    #[test]
    fn test_every_relation_field_is_readable() {
        for relation in RELATIONS {
            if let Some(back) = relation.back_field {
                let entity = match relation.target {
                    EntityType::Capability => Entity::Capability(Capability::default()),
                    EntityType::Persona => Entity::Persona(Persona::default()),
                    EntityType::Component => Entity::Component(Component::default()),
                    other => panic!("unexpected back-reference owner {}", other),
                };
                assert!(entity.back_refs(back).is_some(), "{} missing", back);
            }
        }
    }
}
