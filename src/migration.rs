//! Migration Registry
//!
//! Ordered set of data transformations between schema versions. A registry is
//! built once at startup and shared with the store; tests build their own.
//!
//! Migrations receive an owned copy of the data, so the caller's value is
//! never touched and a failed chain can hand back the original unchanged.

use semver::Version;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

use crate::entity::EntityType;
use crate::error::{Result, StoreError};
use crate::version::{parse_lenient, parse_strict, CURRENT_SCHEMA_VERSION, LEGACY_SCHEMA_VERSION};

/// Transformation applied to one entity's raw data
pub type MigrateFn = Box<dyn Fn(Value, EntityType) -> std::result::Result<Value, String> + Send + Sync>;

/// Entity types a migration applies to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppliesTo {
    All,
    Types(Vec<EntityType>),
}

impl AppliesTo {
    pub fn includes(&self, entity_type: EntityType) -> bool {
        match self {
            AppliesTo::All => true,
            AppliesTo::Types(types) => types.contains(&entity_type),
        }
    }
}

/// A registered migration step
pub struct Migration {
    pub id: String,
    pub description: String,
    pub from_version: Version,
    pub to_version: Version,
    pub applies_to: AppliesTo,
    migrate: MigrateFn,
}

impl Migration {
    pub fn new<F>(
        id: impl Into<String>,
        from_version: &str,
        to_version: &str,
        applies_to: AppliesTo,
        migrate: F,
    ) -> Result<Self>
    where
        F: Fn(Value, EntityType) -> std::result::Result<Value, String> + Send + Sync + 'static,
    {
        let id = id.into();
        let from_version = parse_strict(from_version)?;
        let to_version = parse_strict(to_version)?;
        if from_version >= to_version {
            return Err(StoreError::InvalidVersion(format!(
                "migration '{}' must move forward ({} -> {})",
                id, from_version, to_version
            )));
        }
        Ok(Self {
            id,
            description: String::new(),
            from_version,
            to_version,
            applies_to,
            migrate: Box::new(migrate),
        })
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    fn apply(&self, data: Value, entity_type: EntityType) -> std::result::Result<Value, String> {
        (self.migrate)(data, entity_type)
    }
}

impl fmt::Debug for Migration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Migration")
            .field("id", &self.id)
            .field("from_version", &self.from_version)
            .field("to_version", &self.to_version)
            .field("applies_to", &self.applies_to)
            .finish()
    }
}

/// Outcome of running a migration chain
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MigrationOutcome {
    pub success: bool,
    /// Migrated data on success; the untouched input on failure
    pub data: Value,
    pub migrations_applied: usize,
    pub from_version: String,
    pub to_version: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Ordered collection of migrations
#[derive(Debug, Default)]
pub struct MigrationRegistry {
    migrations: Vec<Migration>,
}

impl MigrationRegistry {
    /// Empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry preloaded with the migrations shipped with this release
    pub fn with_builtin() -> Self {
        let mut registry = Self::new();
        for migration in builtin_migrations() {
            let id = migration.id.clone();
            if let Err(e) = registry.register(migration) {
                tracing::warn!(migration = %id, "built-in migration not registered: {}", e);
            }
        }
        registry
    }

    /// Add a migration; keeps the list sorted by source version, then id
    pub fn register(&mut self, migration: Migration) -> Result<()> {
        if self.migrations.iter().any(|m| m.id == migration.id) {
            return Err(StoreError::Migration(format!(
                "migration '{}' is already registered",
                migration.id
            )));
        }
        self.migrations.push(migration);
        self.migrations
            .sort_by(|a, b| a.from_version.cmp(&b.from_version).then_with(|| a.id.cmp(&b.id)));
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.migrations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.migrations.is_empty()
    }

    pub fn migrations(&self) -> &[Migration] {
        &self.migrations
    }

    /// Migrations within `[from, to]` applicable to `entity_type`, in registry order
    pub fn migrations_for_upgrade(&self, from: &str, to: &str, entity_type: EntityType) -> Vec<&Migration> {
        let from = parse_lenient(from);
        let to = parse_lenient(to);
        if from >= to {
            return Vec::new();
        }
        self.migrations
            .iter()
            .filter(|m| m.from_version >= from && m.to_version <= to && m.applies_to.includes(entity_type))
            .collect()
    }

    /// Apply the chain from `from` to `to`; the input is left untouched
    pub fn migrate_entity(&self, data: &Value, from: &str, to: &str, entity_type: EntityType) -> Result<Value> {
        let mut current = data.clone();
        for migration in self.migrations_for_upgrade(from, to, entity_type) {
            current = migration
                .apply(current, entity_type)
                .map_err(|e| StoreError::Migration(format!("{}: {}", migration.id, e)))?;
        }
        Ok(current)
    }

    /// Like [`migrate_entity`](Self::migrate_entity) but reports instead of failing
    pub fn migrate_entity_with_result(
        &self,
        data: &Value,
        from: &str,
        to: &str,
        entity_type: EntityType,
    ) -> MigrationOutcome {
        let mut current = data.clone();
        let mut applied = 0;
        for migration in self.migrations_for_upgrade(from, to, entity_type) {
            match migration.apply(current, entity_type) {
                Ok(next) => {
                    current = next;
                    applied += 1;
                }
                Err(e) => {
                    tracing::warn!(migration = %migration.id, %entity_type, "migration failed: {}", e);
                    return MigrationOutcome {
                        success: false,
                        data: data.clone(),
                        migrations_applied: applied,
                        from_version: from.to_string(),
                        to_version: to.to_string(),
                        error: Some(format!("{}: {}", migration.id, e)),
                    };
                }
            }
        }
        MigrationOutcome {
            success: true,
            data: current,
            migrations_applied: applied,
            from_version: from.to_string(),
            to_version: to.to_string(),
            error: None,
        }
    }

    /// Bring stored data up to the current schema shape
    pub fn upgrade_to_current(&self, data: &Value, entity_type: EntityType) -> MigrationOutcome {
        let stored = data
            .get("schema_version")
            .and_then(Value::as_str)
            .unwrap_or(LEGACY_SCHEMA_VERSION)
            .to_string();
        self.migrate_entity_with_result(data, &stored, CURRENT_SCHEMA_VERSION, entity_type)
    }
}

// =============================================================================
// Built-in Migrations
// =============================================================================

fn object_mut<'a>(data: &'a mut Value) -> std::result::Result<&'a mut Map<String, Value>, String> {
    data.as_object_mut().ok_or_else(|| "entity data is not a mapping".to_string())
}

/// Legacy files used `capabilities` and `components` on workflows
fn rename_legacy_workflow_fields(mut data: Value, entity_type: EntityType) -> std::result::Result<Value, String> {
    if entity_type != EntityType::Workflow {
        return Ok(data);
    }
    let map = object_mut(&mut data)?;
    for (old, new) in [("capabilities", "requires_capabilities"), ("components", "suggested_components")] {
        if let Some(value) = map.remove(old) {
            map.entry(new.to_string()).or_insert(value);
        }
    }
    Ok(data)
}

/// 1.1.0 turned `starting_state` from a free-text view name into a mapping
fn structure_starting_state(mut data: Value, _entity_type: EntityType) -> std::result::Result<Value, String> {
    let map = object_mut(&mut data)?;
    if let Some(Value::String(view)) = map.get("starting_state").cloned() {
        let mut state = Map::new();
        state.insert("view".to_string(), Value::String(view));
        map.insert("starting_state".to_string(), Value::Object(state));
    }
    if let Some(Value::String(criterion)) = map.get("success_criteria").cloned() {
        map.insert("success_criteria".to_string(), Value::Array(vec![Value::String(criterion)]));
    }
    Ok(data)
}

type BuiltinSpec = (
    &'static str,
    &'static str,
    &'static str,
    AppliesTo,
    fn(Value, EntityType) -> std::result::Result<Value, String>,
    &'static str,
);

fn builtin_specs() -> [BuiltinSpec; 2] {
    [
        (
            "0001-legacy-field-names",
            "0.0.0",
            "1.0.0",
            AppliesTo::All,
            rename_legacy_workflow_fields,
            "Rename legacy workflow relation fields",
        ),
        (
            "0002-structured-starting-state",
            "1.0.0",
            "1.1.0",
            AppliesTo::Types(vec![EntityType::Workflow]),
            structure_starting_state,
            "Structure workflow starting state and success criteria",
        ),
    ]
}

fn builtin_migrations() -> Vec<Migration> {
    builtin_specs()
        .into_iter()
        .filter_map(|(id, from, to, applies_to, f, description)| {
            match Migration::new(id, from, to, applies_to, f) {
                Ok(m) => Some(m.with_description(description)),
                Err(e) => {
                    tracing::warn!(migration = %id, "invalid built-in migration: {}", e);
                    None
                }
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn add_field(name: &'static str) -> impl Fn(Value, EntityType) -> std::result::Result<Value, String> {
        move |mut data, _| {
            data[name] = json!(true);
            Ok(data)
        }
    }

    fn registry() -> MigrationRegistry {
        let mut registry = MigrationRegistry::new();
        registry
            .register(Migration::new("b-second", "1.0.0", "2.0.0", AppliesTo::All, add_field("second")).unwrap())
            .unwrap();
        registry
            .register(Migration::new("a-first", "0.0.0", "1.0.0", AppliesTo::All, add_field("first")).unwrap())
            .unwrap();
        registry
            .register(
                Migration::new(
                    "c-workflow-only",
                    "1.0.0",
                    "2.0.0",
                    AppliesTo::Types(vec![EntityType::Workflow]),
                    add_field("workflow_only"),
                )
                .unwrap(),
            )
            .unwrap();
        registry
    }

    #[test]
    fn test_registration_sorts_by_from_version_then_id() {
        let registry = registry();
        let ids: Vec<_> = registry.migrations().iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec!["a-first", "b-second", "c-workflow-only"]);
    }

    #[test]
    fn test_duplicate_id_rejected() {
        let mut registry = registry();
        let dup = Migration::new("a-first", "0.0.0", "1.0.0", AppliesTo::All, add_field("x")).unwrap();
        assert!(registry.register(dup).is_err());
    }

    #[test]
    fn test_backward_migration_rejected() {
        assert!(Migration::new("back", "2.0.0", "1.0.0", AppliesTo::All, add_field("x")).is_err());
    }

    #[test]
    fn test_equal_versions_select_nothing() {
        let registry = registry();
        for v in ["0.0.0", "1.0.0", "2.0.0"] {
            assert!(registry.migrations_for_upgrade(v, v, EntityType::Workflow).is_empty());
        }
        assert!(registry.migrations_for_upgrade("2.0.0", "1.0.0", EntityType::Workflow).is_empty());
    }

    #[test]
    fn test_selection_respects_entity_types() {
        let registry = registry();
        let for_workflow = registry.migrations_for_upgrade("0.0.0", "2.0.0", EntityType::Workflow);
        assert_eq!(for_workflow.len(), 3);
        let for_persona = registry.migrations_for_upgrade("0.0.0", "2.0.0", EntityType::Persona);
        assert_eq!(for_persona.len(), 2);
    }

    #[test]
    fn test_chain_composes() {
        let registry = registry();
        let data = json!({"id": "x"});
        let full = registry.migrate_entity(&data, "0.0.0", "2.0.0", EntityType::Persona).unwrap();
        let step = registry.migrate_entity(&data, "0.0.0", "1.0.0", EntityType::Persona).unwrap();
        let step = registry.migrate_entity(&step, "1.0.0", "2.0.0", EntityType::Persona).unwrap();
        assert_eq!(full, step);
        assert_eq!(full, json!({"id": "x", "first": true, "second": true}));
        // caller's value untouched
        assert_eq!(data, json!({"id": "x"}));
    }

    #[test]
    fn test_failure_returns_original_data() {
        let mut registry = registry();
        registry
            .register(
                Migration::new("z-broken", "1.0.0", "2.0.0", AppliesTo::All, |_, _| Err("boom".to_string()))
                    .unwrap(),
            )
            .unwrap();

        let data = json!({"id": "x"});
        let outcome = registry.migrate_entity_with_result(&data, "0.0.0", "2.0.0", EntityType::Persona);
        assert!(!outcome.success);
        assert_eq!(outcome.data, data);
        assert_eq!(outcome.migrations_applied, 2);
        assert!(outcome.error.unwrap().contains("boom"));
    }

    #[test]
    fn test_every_builtin_registers() {
        let registry = MigrationRegistry::with_builtin();
        let specs = builtin_specs();
        assert_eq!(registry.len(), specs.len());
        for (id, from, to, ..) in specs {
            let migration = registry
                .migrations()
                .iter()
                .find(|m| m.id == id)
                .unwrap_or_else(|| panic!("built-in '{}' missing", id));
            assert_eq!(migration.from_version, parse_strict(from).unwrap());
            assert_eq!(migration.to_version, parse_strict(to).unwrap());
            assert!(!migration.description.is_empty());
        }
        let last = registry.migrations().iter().map(|m| &m.to_version).max().unwrap();
        assert_eq!(*last, parse_strict(CURRENT_SCHEMA_VERSION).unwrap());
    }

    #[test]
    fn test_builtin_upgrade_of_legacy_workflow() {
        let registry = MigrationRegistry::with_builtin();
        assert_eq!(registry.len(), 2);
        let legacy = json!({
            "id": "W01",
            "capabilities": ["search"],
            "starting_state": "dashboard",
            "success_criteria": "User finds the report"
        });
        let outcome = registry.upgrade_to_current(&legacy, EntityType::Workflow);
        assert!(outcome.success);
        assert_eq!(outcome.migrations_applied, 2);
        assert_eq!(outcome.data["requires_capabilities"], json!(["search"]));
        assert_eq!(outcome.data["starting_state"], json!({"view": "dashboard"}));
        assert_eq!(outcome.data["success_criteria"], json!(["User finds the report"]));
        assert!(outcome.data.get("capabilities").is_none());
    }
}
