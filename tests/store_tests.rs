//! Store Tests
//!
//! Persistence, reference integrity and back-reference maintenance against a
//! real data directory.

use std::fs;
use std::path::Path;
use std::sync::Arc;

use serde_json::{json, Value};
use tempfile::TempDir;
use walkdir::WalkDir;

use design_artifacts::entity::Entity;
use design_artifacts::migration::AppliesTo;
use design_artifacts::version::{check_schema_version, Severity};
use design_artifacts::{
    validate, DeleteOptions, EntityStore, EntityType, Migration, MigrationRegistry, StoreError,
    CURRENT_SCHEMA_VERSION,
};

fn fixtures_path() -> &'static Path {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures").leak()
}

fn open(dir: &Path) -> EntityStore {
    EntityStore::open(dir, Arc::new(MigrationRegistry::with_builtin())).unwrap()
}

/// Copy a fixture tree so tests can mutate it freely
fn copy_fixture(name: &str) -> TempDir {
    let tmp = TempDir::new().unwrap();
    let source = fixtures_path().join(name);
    for entry in WalkDir::new(&source).min_depth(1) {
        let entry = entry.unwrap();
        let target = tmp.path().join(entry.path().strip_prefix(&source).unwrap());
        if entry.file_type().is_dir() {
            fs::create_dir_all(&target).unwrap();
        } else {
            fs::copy(entry.path(), &target).unwrap();
        }
    }
    tmp
}

fn read_file(store: &EntityStore, entity_type: EntityType, id: &str) -> String {
    fs::read_to_string(store.type_dir(entity_type).join(format!("{}.yaml", id))).unwrap()
}

/// Every key of `input` is present with the same value in `entity`
fn assert_superset(entity: &Entity, input: &Value) {
    let stored = entity.to_value().unwrap();
    for (key, value) in input.as_object().unwrap() {
        assert_eq!(&stored[key], value, "field {} of {}", key, entity.id());
    }
}

fn seed(store: &mut EntityStore) {
    store
        .create(EntityType::Capability, json!({"id": "data-export", "name": "Data export", "category": "io"}))
        .unwrap();
    store
        .create(EntityType::Persona, json!({"id": "analyst", "name": "Analyst", "role": "analyst"}))
        .unwrap();
    store
        .create(EntityType::Component, json!({"id": "export-button", "name": "Export button", "category": "controls"}))
        .unwrap();
}

// =============================================================================
// Create / Get
// =============================================================================

#[test]
fn test_create_then_get_for_every_type() {
    let tmp = TempDir::new().unwrap();
    let mut store = open(tmp.path());

    let inputs = [
        (EntityType::Capability, json!({"id": "data-export", "name": "Data export", "category": "io",
            "status": "in-progress", "algorithms": ["csv"]})),
        (EntityType::Persona, json!({"id": "analyst", "name": "Analyst", "role": "analyst",
            "expertise_level": "expert", "goals": ["Ship reports"]})),
        (EntityType::Component, json!({"id": "export-button", "name": "Export button", "category": "controls",
            "implements_capabilities": ["data-export"]})),
        (EntityType::Workflow, json!({"id": "W01", "name": "Export report", "category": "reporting",
            "goal": "Get a CSV", "personas": ["analyst"], "requires_capabilities": ["data-export"],
            "suggested_components": ["export-button"], "starting_state": {"view": "dashboard"},
            "success_criteria": ["CSV downloads"], "validated": true})),
        (EntityType::Tokens, json!({"id": "base", "name": "Base", "colors": {"primary": "#112233"},
            "spacing": {"sm": 4}})),
        (EntityType::Tokens, json!({"id": "dark", "name": "Dark", "extends": "base"})),
        (EntityType::View, json!({"id": "dashboard", "name": "Dashboard", "layout": "grid",
            "components": ["export-button"], "workflows": ["W01"]})),
        (EntityType::Interaction, json!({"id": "click-export", "name": "Click export", "trigger": "click",
            "components": ["export-button"]})),
        (EntityType::TestResult, json!({"id": "W01-analyst-1", "workflow": "W01", "persona": "analyst",
            "test_type": "real", "passed": true, "date": "2024-05-01"})),
    ];

    for (entity_type, input) in &inputs {
        let created = store.create(*entity_type, input.clone()).unwrap();
        let fetched = store.get(*entity_type, created.id()).unwrap();
        assert_eq!(&created, fetched);
        assert_superset(fetched, input);

        let meta = fetched.meta();
        assert_eq!(meta.version.as_deref(), Some("1.0.0"));
        assert_eq!(meta.schema_version.as_deref(), Some(CURRENT_SCHEMA_VERSION));
        assert!(meta.created_at.is_some());
        assert_eq!(meta.created_at, meta.updated_at);
    }

    assert_eq!(store.count(EntityType::Tokens), 2);
    assert!(store.type_dir(EntityType::TestResult).join("W01-analyst-1.yaml").is_file());
}

#[test]
fn test_create_rejects_duplicates_and_bad_ids() {
    let tmp = TempDir::new().unwrap();
    let mut store = open(tmp.path());
    seed(&mut store);

    let err = store
        .create(EntityType::Capability, json!({"id": "data-export", "name": "Again", "category": "io"}))
        .unwrap_err();
    assert!(matches!(err, StoreError::AlreadyExists { .. }));
    assert_eq!(err.to_string(), "Capability 'data-export' already exists");

    let err = store
        .create(EntityType::Capability, json!({"id": "Data_Export", "name": "Bad", "category": "io"}))
        .unwrap_err();
    let messages: Vec<String> = err.field_errors().iter().map(|e| e.to_string()).collect();
    assert_eq!(messages, vec!["id: ID must match pattern kebab-case"]);

    let err = store
        .create(EntityType::Workflow, json!({"id": "W1000", "name": "n", "category": "c", "goal": "g"}))
        .unwrap_err();
    assert!(err.field_errors().iter().any(|e| e.field == "id"));

    let err = store
        .create(EntityType::Capability, json!({"id": "search", "name": "Search", "category": "q", "status": "done"}))
        .unwrap_err();
    assert!(err.field_errors().iter().any(|e| e.field == "status"));
    assert!(!store.type_dir(EntityType::Capability).join("search.yaml").exists());
}

#[test]
fn test_missing_reference_names_id_and_type() {
    let tmp = TempDir::new().unwrap();
    let mut store = open(tmp.path());
    seed(&mut store);

    let err = store
        .create(
            EntityType::Workflow,
            json!({"id": "W01", "name": "n", "category": "c", "goal": "g",
                   "requires_capabilities": ["data-export", "nope"], "personas": ["ghost"]}),
        )
        .unwrap_err();
    let StoreError::Reference { missing, .. } = &err else {
        panic!("expected reference error, got {:?}", err);
    };
    assert_eq!(missing.len(), 2);
    let text = err.to_string();
    assert!(text.contains("Capability 'nope' does not exist"));
    assert!(text.contains("Persona 'ghost' does not exist"));

    // nothing was written and no back-reference was pushed
    assert!(!store.contains(EntityType::Workflow, "W01"));
    assert!(!store.type_dir(EntityType::Workflow).join("W01.yaml").exists());
    let capability = store.get(EntityType::Capability, "data-export").unwrap().as_capability().unwrap();
    assert!(capability.used_by_workflows.is_empty());
}

// =============================================================================
// Update
// =============================================================================

#[test]
fn test_update_bumps_version_and_merges() {
    let tmp = TempDir::new().unwrap();
    let mut store = open(tmp.path());
    seed(&mut store);
    store
        .create(
            EntityType::Workflow,
            json!({"id": "W01", "name": "Export", "category": "reporting", "goal": "g",
                   "implementation_notes": "later"}),
        )
        .unwrap();

    let first = store
        .update(EntityType::Workflow, "W01", json!({"status": "designed", "implementation_notes": null}))
        .unwrap();
    assert_eq!(first.meta().version.as_deref(), Some("1.0.1"));
    let workflow = first.as_workflow().unwrap();
    assert_eq!(workflow.name, "Export");
    assert_eq!(workflow.status.as_str(), "designed");
    assert_eq!(workflow.implementation_notes, None);

    let second = store.update(EntityType::Workflow, "W01", json!({"goal": "new goal"})).unwrap();
    assert_eq!(second.meta().version.as_deref(), Some("1.0.2"));
    assert_eq!(second.meta().created_at, first.meta().created_at);
}

#[test]
fn test_rejected_update_leaves_store_unchanged() {
    let tmp = TempDir::new().unwrap();
    let mut store = open(tmp.path());
    seed(&mut store);
    store
        .create(
            EntityType::Workflow,
            json!({"id": "W01", "name": "Export", "category": "reporting", "goal": "g",
                   "requires_capabilities": ["data-export"]}),
        )
        .unwrap();
    let before_entity = store.get(EntityType::Workflow, "W01").unwrap().clone();
    let before_file = read_file(&store, EntityType::Workflow, "W01");

    let err = store
        .update(EntityType::Workflow, "W01", json!({"requires_capabilities": ["missing-cap"]}))
        .unwrap_err();
    assert!(err.to_string().contains("Capability 'missing-cap' does not exist"));

    let err = store.update(EntityType::Workflow, "W01", json!({"status": "finished"})).unwrap_err();
    assert!(matches!(err, StoreError::Validation { .. }));

    let err = store.update(EntityType::Workflow, "W01", json!({"id": "W02"})).unwrap_err();
    assert!(matches!(err, StoreError::ImmutableId { .. }));

    assert_eq!(store.get(EntityType::Workflow, "W01").unwrap(), &before_entity);
    assert_eq!(read_file(&store, EntityType::Workflow, "W01"), before_file);
    let capability = store.get(EntityType::Capability, "data-export").unwrap().as_capability().unwrap();
    assert_eq!(capability.used_by_workflows, vec!["W01"]);

    let err = store.update(EntityType::Workflow, "W09", json!({"goal": "x"})).unwrap_err();
    assert!(err.is_not_found());
}

// =============================================================================
// Back-references
// =============================================================================

#[test]
fn test_back_references_follow_forward_references() {
    let tmp = TempDir::new().unwrap();
    let mut store = open(tmp.path());
    seed(&mut store);
    store
        .create(EntityType::Capability, json!({"id": "search", "name": "Search", "category": "query"}))
        .unwrap();
    store
        .create(
            EntityType::Workflow,
            json!({"id": "W01", "name": "Export", "category": "reporting", "goal": "g",
                   "personas": ["analyst"], "requires_capabilities": ["data-export"],
                   "suggested_components": ["export-button"]}),
        )
        .unwrap();

    let capability = store.get(EntityType::Capability, "data-export").unwrap().as_capability().unwrap();
    assert_eq!(capability.used_by_workflows, vec!["W01"]);
    // back-reference edits rewrite the target without bumping its version
    assert_eq!(capability.meta.version.as_deref(), Some("1.0.0"));
    assert_eq!(store.get(EntityType::Persona, "analyst").unwrap().as_persona().unwrap().workflows, vec!["W01"]);
    assert!(read_file(&store, EntityType::Component, "export-button").contains("W01"));

    store
        .update(EntityType::Workflow, "W01", json!({"requires_capabilities": ["search"]}))
        .unwrap();
    let old = store.get(EntityType::Capability, "data-export").unwrap().as_capability().unwrap();
    assert!(old.used_by_workflows.is_empty());
    let new = store.get(EntityType::Capability, "search").unwrap().as_capability().unwrap();
    assert_eq!(new.used_by_workflows, vec!["W01"]);

    // back-reference arrays in input are ignored
    store
        .update(EntityType::Capability, "search", json!({"used_by_workflows": [], "description": "Find"}))
        .unwrap();
    let search = store.get(EntityType::Capability, "search").unwrap().as_capability().unwrap();
    assert_eq!(search.used_by_workflows, vec!["W01"]);

    store
        .update(EntityType::Component, "export-button", json!({"implements_capabilities": ["search"]}))
        .unwrap();
    let search = store.get(EntityType::Capability, "search").unwrap().as_capability().unwrap();
    assert_eq!(search.implemented_by_components, vec!["export-button"]);

    assert!(validate(&store).structural_warnings().all(|w| !w.starts_with("Bidirectional")));
}

// =============================================================================
// Delete
// =============================================================================

#[test]
fn test_delete_with_dependents_requires_force() {
    let tmp = TempDir::new().unwrap();
    let mut store = open(tmp.path());
    seed(&mut store);
    store
        .create(
            EntityType::Workflow,
            json!({"id": "W01", "name": "Export", "category": "reporting", "goal": "g",
                   "requires_capabilities": ["data-export"]}),
        )
        .unwrap();

    let err = store
        .delete(EntityType::Capability, "data-export", DeleteOptions::default())
        .unwrap_err();
    let StoreError::HasDependents { dependents, .. } = &err else {
        panic!("expected dependents error, got {:?}", err);
    };
    assert_eq!(dependents[0].id, "W01");
    assert!(store.contains(EntityType::Capability, "data-export"));

    let outcome = store
        .delete(EntityType::Capability, "data-export", DeleteOptions { force: true })
        .unwrap();
    assert_eq!(outcome.warnings.len(), 1);
    assert!(outcome.warnings[0].contains("W01"));
    assert!(outcome.warnings[0].contains("data-export"));
    assert!(!store.contains(EntityType::Capability, "data-export"));
    assert!(!store.type_dir(EntityType::Capability).join("data-export.yaml").exists());

    let report = validate(&store);
    assert!(!report.valid);
    assert!(report.errors[0].contains("W01") && report.errors[0].contains("data-export"));

    let err = store
        .delete(EntityType::Capability, "data-export", DeleteOptions::default())
        .unwrap_err();
    assert!(err.is_not_found());
}

#[test]
fn test_delete_workflow_clears_back_references() {
    let tmp = TempDir::new().unwrap();
    let mut store = open(tmp.path());
    seed(&mut store);
    store
        .create(
            EntityType::Workflow,
            json!({"id": "W01", "name": "Export", "category": "reporting", "goal": "g",
                   "personas": ["analyst"]}),
        )
        .unwrap();

    let outcome = store.delete(EntityType::Workflow, "W01", DeleteOptions::default()).unwrap();
    assert!(outcome.warnings.is_empty());
    assert!(store.get(EntityType::Persona, "analyst").unwrap().as_persona().unwrap().workflows.is_empty());
}

// =============================================================================
// Refresh / Legacy
// =============================================================================

#[test]
fn test_refresh_round_trip() {
    let tmp = TempDir::new().unwrap();
    let mut store = open(tmp.path());
    seed(&mut store);
    store
        .create(
            EntityType::Workflow,
            json!({"id": "W01", "name": "Export: \"monthly\"", "category": "reporting", "goal": "g",
                   "personas": ["analyst"], "starting_state": {"view": "dashboard", "data_loaded": "sales"},
                   "success_criteria": ["one", "two"]}),
        )
        .unwrap();
    store.update(EntityType::Workflow, "W01", json!({"validated": true})).unwrap();
    let before: Vec<Entity> = store.all().cloned().collect();
    let fingerprint = store.load_report().fingerprint.clone();

    let report = store.refresh();
    let after: Vec<Entity> = store.all().cloned().collect();
    assert_eq!(before, after);
    assert!(report.issues.is_empty());
    assert_ne!(report.fingerprint, fingerprint);

    let reopened = open(tmp.path());
    let again: Vec<Entity> = reopened.all().cloned().collect();
    assert_eq!(before, again);
    assert_eq!(reopened.load_report().fingerprint, report.fingerprint);
}

#[test]
fn test_legacy_files_load_and_upgrade() {
    let tmp = copy_fixture("legacy");
    let mut store = open(tmp.path());

    let report = store.load_report();
    assert_eq!(report.counts[&EntityType::Workflow], 1);
    assert_eq!(report.counts[&EntityType::Component], 1);
    assert_eq!(report.skipped(), 1);
    assert!(report.issues[0].to_string().contains("half-written.yaml"));

    let workflow = store.get(EntityType::Workflow, "W01").unwrap().as_workflow().unwrap();
    assert_eq!(workflow.requires_capabilities, vec!["data-export"]);
    assert_eq!(workflow.suggested_components, vec!["export-button"]);
    assert_eq!(workflow.starting_state.as_ref().unwrap().view.as_deref(), Some("dashboard"));
    assert_eq!(workflow.success_criteria, vec!["Report downloads as CSV"]);
    assert_eq!(workflow.meta.schema_version, None);
    assert!(store.contains(EntityType::Persona, "analyst"));

    let check = check_schema_version(None);
    assert!(check.needs_migration);
    assert_eq!(check.severity, Severity::Warning);

    let report = validate(&store);
    assert!(report.valid, "{:?}", report.errors);
    assert!(report.warnings.iter().any(|w| w.starts_with("[Schema] Workflow 'W01'")));
    assert!(report.warnings.iter().any(|w| w.starts_with("[Load]")));
    assert!(report.warnings.iter().any(|w| w.contains("used_by_workflows")));

    let updated = store.update(EntityType::Workflow, "W01", json!({"status": "designed"})).unwrap();
    assert_eq!(updated.meta().version.as_deref(), Some("1.0.1"));
    assert_eq!(updated.meta().schema_version.as_deref(), Some(CURRENT_SCHEMA_VERSION));
    assert!(updated.meta().created_at.is_some());
    let text = read_file(&store, EntityType::Workflow, "W01");
    assert!(text.contains("requires_capabilities"));
    assert!(!text.contains("\ncapabilities:"));
}

// =============================================================================
// File Placement
// =============================================================================

fn persona_dir(tmp: &TempDir, files: &[(&str, &str)]) -> std::path::PathBuf {
    let dir = tmp.path().join("personas");
    fs::create_dir_all(&dir).unwrap();
    for (name, text) in files {
        fs::write(dir.join(name), text).unwrap();
    }
    dir
}

fn file_names(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
        .collect();
    names.sort();
    names
}

#[test]
fn test_delete_removes_yml_file() {
    let tmp = TempDir::new().unwrap();
    let dir = persona_dir(&tmp, &[("analyst.yml", "id: analyst\nname: Analyst\nrole: analyst\n")]);

    let mut store = open(tmp.path());
    let source = dir.join("analyst.yml");
    assert_eq!(store.source_path(EntityType::Persona, "analyst"), Some(source.as_path()));

    store.delete(EntityType::Persona, "analyst", DeleteOptions::default()).unwrap();
    assert!(file_names(&dir).is_empty());

    store.refresh();
    assert!(!store.contains(EntityType::Persona, "analyst"));
}

#[test]
fn test_update_moves_yml_file_to_canonical_name() {
    let tmp = TempDir::new().unwrap();
    let dir = persona_dir(&tmp, &[("analyst.yml", "id: analyst\nname: Analyst\nrole: analyst\n")]);

    let mut store = open(tmp.path());
    store
        .update(EntityType::Persona, "analyst", json!({"description": "Reads reports"}))
        .unwrap();
    assert_eq!(file_names(&dir), vec!["analyst.yaml"]);

    let report = store.refresh();
    assert!(report.issues.is_empty(), "{:?}", report.issues);
    let persona = store.get(EntityType::Persona, "analyst").unwrap().as_persona().unwrap();
    assert_eq!(persona.description.as_deref(), Some("Reads reports"));
}

#[test]
fn test_mismatched_file_name_is_renamed_then_deleted() {
    let tmp = TempDir::new().unwrap();
    let dir = persona_dir(&tmp, &[("old-name.yaml", "id: analyst\nname: Analyst\nrole: analyst\n")]);

    let mut store = open(tmp.path());
    store.update(EntityType::Persona, "analyst", json!({"name": "Data analyst"})).unwrap();
    assert_eq!(file_names(&dir), vec!["analyst.yaml"]);

    let report = store.refresh();
    assert!(report.issues.is_empty(), "{:?}", report.issues);
    assert_eq!(store.get(EntityType::Persona, "analyst").unwrap().name(), "Data analyst");

    store.delete(EntityType::Persona, "analyst", DeleteOptions::default()).unwrap();
    store.refresh();
    assert!(!store.contains(EntityType::Persona, "analyst"));
    assert!(file_names(&dir).is_empty());
}

#[test]
fn test_mismatched_file_name_deleted_in_place() {
    let tmp = TempDir::new().unwrap();
    let dir = persona_dir(&tmp, &[("old-name.yaml", "id: analyst\nname: Analyst\nrole: analyst\n")]);

    let mut store = open(tmp.path());
    store.delete(EntityType::Persona, "analyst", DeleteOptions::default()).unwrap();
    assert!(file_names(&dir).is_empty());

    store.refresh();
    assert!(!store.contains(EntityType::Persona, "analyst"));
}

#[test]
fn test_rename_does_not_clobber_another_entity() {
    let tmp = TempDir::new().unwrap();
    let dir = persona_dir(
        &tmp,
        &[
            ("analyst.yaml", "id: admin\nname: Admin\nrole: admin\n"),
            ("old-name.yaml", "id: analyst\nname: Analyst\nrole: analyst\n"),
        ],
    );

    let mut store = open(tmp.path());
    store.update(EntityType::Persona, "analyst", json!({"name": "Data analyst"})).unwrap();
    assert_eq!(file_names(&dir), vec!["analyst.yaml", "old-name.yaml"]);

    store.refresh();
    assert_eq!(store.get(EntityType::Persona, "admin").unwrap().name(), "Admin");
    assert_eq!(store.get(EntityType::Persona, "analyst").unwrap().name(), "Data analyst");
}

#[test]
fn test_create_refuses_file_held_by_another_entity() {
    let tmp = TempDir::new().unwrap();
    let dir = persona_dir(&tmp, &[("analyst.yaml", "id: admin\nname: Admin\nrole: admin\n")]);

    let mut store = open(tmp.path());
    let err = store
        .create(EntityType::Persona, json!({"id": "analyst", "name": "Analyst", "role": "analyst"}))
        .unwrap_err();
    assert!(matches!(err, StoreError::Io(_)), "{:?}", err);
    assert!(!store.contains(EntityType::Persona, "analyst"));
    assert!(fs::read_to_string(dir.join("analyst.yaml")).unwrap().contains("id: admin"));
}

#[test]
fn test_delete_fails_when_file_vanished() {
    let tmp = TempDir::new().unwrap();
    let dir = persona_dir(&tmp, &[("analyst.yaml", "id: analyst\nname: Analyst\nrole: analyst\n")]);

    let mut store = open(tmp.path());
    fs::remove_file(dir.join("analyst.yaml")).unwrap();

    let err = store
        .delete(EntityType::Persona, "analyst", DeleteOptions::default())
        .unwrap_err();
    assert!(matches!(err, StoreError::MissingFile { .. }), "{:?}", err);
    assert!(store.contains(EntityType::Persona, "analyst"));
}

// =============================================================================
// Newer Schema
// =============================================================================

#[test]
fn test_entity_from_newer_release_is_never_rewritten() {
    let tmp = TempDir::new().unwrap();
    let dir = tmp.path().join("capabilities");
    fs::create_dir_all(&dir).unwrap();
    let original = "id: search\nname: Search\ncategory: query\nschema_version: 9.0.0\nfuture_field: keep-me\n";
    fs::write(dir.join("search.yaml"), original).unwrap();

    let mut store = open(tmp.path());
    store
        .create(
            EntityType::Workflow,
            json!({"id": "W01", "name": "Find", "category": "query", "goal": "g",
                   "requires_capabilities": ["search"]}),
        )
        .unwrap();
    assert_eq!(fs::read_to_string(dir.join("search.yaml")).unwrap(), original);

    let err = store
        .update(EntityType::Capability, "search", json!({"status": "implemented"}))
        .unwrap_err();
    let StoreError::IncompatibleSchema { stored, current, .. } = &err else {
        panic!("expected schema error, got {:?}", err);
    };
    assert_eq!(stored, "9.0.0");
    assert_eq!(current, CURRENT_SCHEMA_VERSION);
    assert_eq!(fs::read_to_string(dir.join("search.yaml")).unwrap(), original);

    let report = validate(&store);
    assert!(report
        .warnings
        .iter()
        .any(|w| w.starts_with("[Schema] Capability 'search'") && w.contains("newer release")));
}

// =============================================================================
// Load Issues
// =============================================================================

#[test]
fn test_failed_migration_is_reported_and_original_data_kept() {
    let tmp = TempDir::new().unwrap();
    persona_dir(&tmp, &[("analyst.yaml", "id: analyst\nname: Analyst\nrole: analyst\n")]);
    let workflows = tmp.path().join("workflows");
    fs::create_dir_all(&workflows).unwrap();
    fs::write(
        workflows.join("W01.yaml"),
        "id: W01\nname: Flow\ncategory: core\ngoal: g\nstarting_state: dashboard\n",
    )
    .unwrap();

    let mut registry = MigrationRegistry::new();
    registry
        .register(
            Migration::new("0001-always-fails", "0.0.0", "1.1.0", AppliesTo::All, |_, _| {
                Err("unsupported layout".to_string())
            })
            .unwrap(),
        )
        .unwrap();
    let store = EntityStore::open(tmp.path(), Arc::new(registry)).unwrap();

    // the original persona data is still valid
    assert!(store.contains(EntityType::Persona, "analyst"));
    // the workflow needed the migration to become valid
    assert!(!store.contains(EntityType::Workflow, "W01"));

    let report = store.load_report();
    let persona_issue = report
        .issues
        .iter()
        .find(|i| i.entity_type == EntityType::Persona)
        .unwrap();
    assert!(!persona_issue.skipped);
    assert!(persona_issue.message.contains("0001-always-fails: unsupported layout"));
    assert!(report
        .issues
        .iter()
        .any(|i| i.entity_type == EntityType::Workflow && i.skipped));

    let validation = validate(&store);
    assert!(validation
        .warnings
        .iter()
        .any(|w| w.starts_with("[Load] personas/analyst.yaml: migration from 0.0.0 failed")));
    assert!(validation
        .warnings
        .iter()
        .any(|w| w.starts_with("[Load] workflows/W01.yaml") && w.ends_with("(skipped)")));
}

#[test]
fn test_duplicate_id_keeps_first_file() {
    let tmp = TempDir::new().unwrap();
    persona_dir(
        &tmp,
        &[
            ("analyst.yaml", "id: analyst\nname: Analyst\nrole: analyst\n"),
            ("copy.yaml", "id: analyst\nname: Copy\nrole: analyst\n"),
        ],
    );

    let store = open(tmp.path());
    assert_eq!(store.count(EntityType::Persona), 1);
    assert_eq!(store.get(EntityType::Persona, "analyst").unwrap().name(), "Analyst");
    assert!(store
        .source_path(EntityType::Persona, "analyst")
        .unwrap()
        .ends_with("analyst.yaml"));
    assert_eq!(store.load_report().skipped(), 1);

    let report = validate(&store);
    assert!(report
        .warnings
        .contains(&"[Load] personas/copy.yaml: duplicate id 'analyst' (skipped)".to_string()));
}
