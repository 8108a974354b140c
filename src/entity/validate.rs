//! Schema Validation
//!
//! Each record type carries its own check function. Parsing happens in two
//! passes: vocabulary fields are checked on the raw mapping (so a bad enum
//! value is reported against its field name), then the mapping is decoded
//! into the typed record and the record-level checks run.

use std::sync::LazyLock;

use regex::Regex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};

use super::types::{
    Capability, Component, ExpertiseLevel, ImplementationStatus, Interaction, Persona, TestResult,
    TestType, Tokens, View, Workflow, WorkflowStatus,
};
use super::{Entity, EntityType, VersionMeta};
use crate::error::FieldError;

pub const ID_PATTERN_KEBAB: &str = r"^[a-z0-9]+(?:-[a-z0-9]+)*$";
pub const ID_PATTERN_WORKFLOW: &str = r"^W\d{1,3}$";
pub const ID_PATTERN_TEST_RESULT: &str = r"^W\d{1,3}-[a-z0-9]+(?:-[a-z0-9]+)*$";

static KEBAB_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(ID_PATTERN_KEBAB).unwrap());
static WORKFLOW_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(ID_PATTERN_WORKFLOW).unwrap());
static TEST_RESULT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(ID_PATTERN_TEST_RESULT).unwrap());
static SEMVER_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\d+\.\d+\.\d+$").unwrap());

/// Field used for failures that cannot be pinned to a single field
const DOCUMENT_FIELD: &str = "(document)";

// =============================================================================
// Record Trait
// =============================================================================

/// Common surface of every typed record
pub trait EntityRecord: Serialize + DeserializeOwned + Clone {
    const TYPE: EntityType;

    /// Fields holding closed vocabularies, with their accepted spellings
    const VOCABULARY_FIELDS: &'static [(&'static str, &'static [&'static str])] = &[];

    fn id(&self) -> &str;
    fn meta(&self) -> &VersionMeta;
    fn meta_mut(&mut self) -> &mut VersionMeta;

    /// Record-level checks beyond what decoding enforces
    fn check(&self, errors: &mut Vec<FieldError>);

    fn into_entity(self) -> Entity;
}

// =============================================================================
// Shared Checks
// =============================================================================

/// Validate an id against the pattern for its type
pub fn check_id(entity_type: EntityType, id: &str, errors: &mut Vec<FieldError>) {
    if id.trim().is_empty() {
        errors.push(FieldError::new("id", "Required"));
        return;
    }
    let (re, label) = match entity_type {
        EntityType::Workflow => (&*WORKFLOW_RE, "W followed by 1-3 digits (e.g. W01)"),
        EntityType::TestResult => (&*TEST_RESULT_RE, "<workflow-id>-<persona-id>[-suffix]"),
        _ => (&*KEBAB_RE, "kebab-case"),
    };
    if !re.is_match(id) {
        errors.push(FieldError::new("id", format!("ID must match pattern {}", label)));
    }
}

fn require(field: &str, value: &str, errors: &mut Vec<FieldError>) {
    if value.trim().is_empty() {
        errors.push(FieldError::new(field, "Required"));
    }
}

fn check_id_list(field: &str, ids: &[String], errors: &mut Vec<FieldError>) {
    for (i, id) in ids.iter().enumerate() {
        if id.trim().is_empty() {
            errors.push(FieldError::new(format!("{}[{}]", field, i), "Reference must not be empty"));
        }
    }
}

fn check_meta(meta: &VersionMeta, errors: &mut Vec<FieldError>) {
    if let Some(version) = &meta.version {
        if !SEMVER_RE.is_match(version) {
            errors.push(FieldError::new(
                "version",
                format!("'{}' must be a semantic version (major.minor.patch)", version),
            ));
        }
    }
}

fn check_vocabularies(
    map: &Map<String, Value>,
    fields: &[(&str, &[&str])],
    errors: &mut Vec<FieldError>,
) {
    for (field, allowed) in fields {
        match map.get(*field) {
            None | Some(Value::Null) => {}
            Some(Value::String(s)) if allowed.contains(&s.as_str()) => {}
            Some(Value::String(s)) => errors.push(FieldError::new(
                *field,
                format!("'{}' must be one of: {}", s, allowed.join(", ")),
            )),
            Some(_) => errors.push(FieldError::new(*field, "must be a string")),
        }
    }
}

// =============================================================================
// Parsing
// =============================================================================

fn parse_record<T: EntityRecord>(value: Value) -> Result<Entity, Vec<FieldError>> {
    let Value::Object(map) = value else {
        return Err(vec![FieldError::new(DOCUMENT_FIELD, "expected a mapping of fields")]);
    };

    let mut errors = Vec::new();
    check_vocabularies(&map, T::VOCABULARY_FIELDS, &mut errors);
    if !errors.is_empty() {
        return Err(errors);
    }

    let record: T = serde_json::from_value(Value::Object(map))
        .map_err(|e| vec![FieldError::new(DOCUMENT_FIELD, e.to_string())])?;

    check_id(T::TYPE, record.id(), &mut errors);
    check_meta(record.meta(), &mut errors);
    record.check(&mut errors);

    if errors.is_empty() {
        Ok(record.into_entity())
    } else {
        Err(errors)
    }
}

/// Decode and validate raw data as an entity of the given type
pub fn parse_entity(entity_type: EntityType, value: Value) -> Result<Entity, Vec<FieldError>> {
    match entity_type {
        EntityType::Workflow => parse_record::<Workflow>(value),
        EntityType::Capability => parse_record::<Capability>(value),
        EntityType::Persona => parse_record::<Persona>(value),
        EntityType::Component => parse_record::<Component>(value),
        EntityType::Tokens => parse_record::<Tokens>(value),
        EntityType::View => parse_record::<View>(value),
        EntityType::Interaction => parse_record::<Interaction>(value),
        EntityType::TestResult => parse_record::<TestResult>(value),
    }
}

// =============================================================================
// Per-type Checks
// =============================================================================

macro_rules! record_accessors {
    ($variant:ident) => {
        fn id(&self) -> &str {
            &self.id
        }

        fn meta(&self) -> &VersionMeta {
            &self.meta
        }

        fn meta_mut(&mut self) -> &mut VersionMeta {
            &mut self.meta
        }

        fn into_entity(self) -> Entity {
            Entity::$variant(self)
        }
    };
}

impl EntityRecord for Workflow {
    const TYPE: EntityType = EntityType::Workflow;
    const VOCABULARY_FIELDS: &'static [(&'static str, &'static [&'static str])] =
        &[("status", WorkflowStatus::VALUES)];

    record_accessors!(Workflow);

    fn check(&self, errors: &mut Vec<FieldError>) {
        require("name", &self.name, errors);
        require("category", &self.category, errors);
        require("goal", &self.goal, errors);
        check_id_list("personas", &self.personas, errors);
        check_id_list("requires_capabilities", &self.requires_capabilities, errors);
        check_id_list("suggested_components", &self.suggested_components, errors);
        for (i, criterion) in self.success_criteria.iter().enumerate() {
            if criterion.trim().is_empty() {
                errors.push(FieldError::new(format!("success_criteria[{}]", i), "must not be empty"));
            }
        }
    }
}

impl EntityRecord for Capability {
    const TYPE: EntityType = EntityType::Capability;
    const VOCABULARY_FIELDS: &'static [(&'static str, &'static [&'static str])] =
        &[("status", ImplementationStatus::VALUES)];

    record_accessors!(Capability);

    fn check(&self, errors: &mut Vec<FieldError>) {
        require("name", &self.name, errors);
        require("category", &self.category, errors);
    }
}

impl EntityRecord for Persona {
    const TYPE: EntityType = EntityType::Persona;
    const VOCABULARY_FIELDS: &'static [(&'static str, &'static [&'static str])] =
        &[("expertise_level", ExpertiseLevel::VALUES)];

    record_accessors!(Persona);

    fn check(&self, errors: &mut Vec<FieldError>) {
        require("name", &self.name, errors);
        require("role", &self.role, errors);
    }
}

impl EntityRecord for Component {
    const TYPE: EntityType = EntityType::Component;
    const VOCABULARY_FIELDS: &'static [(&'static str, &'static [&'static str])] =
        &[("status", ImplementationStatus::VALUES)];

    record_accessors!(Component);

    fn check(&self, errors: &mut Vec<FieldError>) {
        require("name", &self.name, errors);
        require("category", &self.category, errors);
        check_id_list("implements_capabilities", &self.implements_capabilities, errors);
        check_id_list("dependencies", &self.dependencies, errors);
        if self.dependencies.iter().any(|d| d == &self.id) {
            errors.push(FieldError::new("dependencies", "Component cannot depend on itself"));
        }
    }
}

impl EntityRecord for Tokens {
    const TYPE: EntityType = EntityType::Tokens;

    record_accessors!(Tokens);

    fn check(&self, errors: &mut Vec<FieldError>) {
        require("name", &self.name, errors);
        if let Some(parent) = &self.extends {
            if parent == &self.id {
                errors.push(FieldError::new("extends", "Tokens cannot extend themselves"));
            } else if !KEBAB_RE.is_match(parent) {
                errors.push(FieldError::new("extends", "ID must match pattern kebab-case"));
            }
        }
    }
}

impl EntityRecord for View {
    const TYPE: EntityType = EntityType::View;

    record_accessors!(View);

    fn check(&self, errors: &mut Vec<FieldError>) {
        require("name", &self.name, errors);
        check_id_list("components", &self.components, errors);
        check_id_list("workflows", &self.workflows, errors);
    }
}

impl EntityRecord for Interaction {
    const TYPE: EntityType = EntityType::Interaction;

    record_accessors!(Interaction);

    fn check(&self, errors: &mut Vec<FieldError>) {
        require("name", &self.name, errors);
        require("trigger", &self.trigger, errors);
        check_id_list("components", &self.components, errors);
    }
}

impl EntityRecord for TestResult {
    const TYPE: EntityType = EntityType::TestResult;
    const VOCABULARY_FIELDS: &'static [(&'static str, &'static [&'static str])] =
        &[("test_type", TestType::VALUES)];

    record_accessors!(TestResult);

    fn check(&self, errors: &mut Vec<FieldError>) {
        require("workflow", &self.workflow, errors);
        require("persona", &self.persona, errors);
        if !self.workflow.is_empty() && !self.id.starts_with(&format!("{}-", self.workflow)) {
            errors.push(FieldError::new(
                "id",
                format!("ID must start with its workflow id '{}'", self.workflow),
            ));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn messages(result: Result<Entity, Vec<FieldError>>) -> Vec<String> {
        result.unwrap_err().into_iter().map(|e| e.to_string()).collect()
    }

    #[test]
    fn test_minimal_capability_is_accepted() {
        let entity = parse_entity(
            EntityType::Capability,
            json!({"id": "data-export", "name": "Data export", "category": "io"}),
        )
        .unwrap();
        let capability = entity.as_capability().unwrap();
        assert!(capability.used_by_workflows.is_empty());
        assert_eq!(capability.status, ImplementationStatus::Planned);
        assert!(capability.meta.version.is_none());
    }

    #[test]
    fn test_kebab_case_id_pattern() {
        let errors = messages(parse_entity(
            EntityType::Persona,
            json!({"id": "Data_Analyst", "name": "Analyst", "role": "analyst"}),
        ));
        assert!(errors.iter().any(|m| m.contains("ID must match pattern kebab-case")));
    }

    #[test]
    fn test_workflow_id_pattern() {
        let ok = json!({"id": "W7", "name": "n", "category": "c", "goal": "g"});
        assert!(parse_entity(EntityType::Workflow, ok).is_ok());

        let bad = json!({"id": "W1000", "name": "n", "category": "c", "goal": "g"});
        let errors = messages(parse_entity(EntityType::Workflow, bad));
        assert!(errors.iter().any(|m| m.starts_with("id: ID must match pattern W")));
    }

    #[test]
    fn test_required_fields_are_reported_individually() {
        let errors = parse_entity(EntityType::Workflow, json!({"id": "W01"})).unwrap_err();
        let fields: Vec<_> = errors.iter().map(|e| e.field.as_str()).collect();
        assert_eq!(fields, vec!["name", "category", "goal"]);
    }

    #[test]
    fn test_bad_enum_value_names_field() {
        let errors = parse_entity(
            EntityType::Capability,
            json!({"id": "x", "name": "X", "category": "c", "status": "done"}),
        )
        .unwrap_err();
        assert_eq!(errors[0].field, "status");
        assert!(errors[0].message.contains("planned, in-progress, implemented, deprecated"));
    }

    #[test]
    fn test_malformed_version_is_rejected() {
        let errors = messages(parse_entity(
            EntityType::View,
            json!({"id": "home", "name": "Home", "version": "one"}),
        ));
        assert!(errors.iter().any(|m| m.starts_with("version:")));
    }

    #[test]
    fn test_test_result_id_must_embed_workflow() {
        let ok = json!({"id": "W01-analyst-1", "workflow": "W01", "persona": "analyst"});
        assert!(parse_entity(EntityType::TestResult, ok).is_ok());

        let bad = json!({"id": "W02-analyst-1", "workflow": "W01", "persona": "analyst"});
        assert!(parse_entity(EntityType::TestResult, bad).is_err());
    }
}
