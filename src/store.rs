//! Entity Store
//!
//! In-memory index of every entity, built by scanning the data directory and
//! kept in step with disk on every mutation. The store is single-writer:
//! callers serialize access (a `Mutex<EntityStore>` or a single task).
//!
//! ```text
//! <root>/
//! ├── workflows/W01.yaml
//! ├── capabilities/data-export.yaml
//! ├── personas/
//! ├── components/
//! ├── tokens/
//! ├── views/
//! ├── interactions/
//! └── test-results/
//! ```

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::checksum::Checksum;
use crate::codec::{self, RawDocument};
use crate::entity::{
    parse_entity, Capability, Component, Entity, EntityType, Persona, TestResult, VersionMeta,
    Workflow, RELATIONS,
};
use crate::error::{Dependent, FieldError, MissingReference, Result, StoreError};
use crate::migration::MigrationRegistry;
use crate::version;

// =============================================================================
// Load Report
// =============================================================================

/// A file that was skipped or only partly understood during a scan
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadIssue {
    pub entity_type: EntityType,
    pub path: PathBuf,
    pub message: String,
    /// True when the file was left out of the index
    pub skipped: bool,
}

impl fmt::Display for LoadIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = self
            .path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        write!(
            f,
            "[Load] {}/{}: {}{}",
            self.entity_type.dir_name(),
            name,
            self.message,
            if self.skipped { " (skipped)" } else { "" }
        )
    }
}

/// Summary of the last directory scan
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadReport {
    pub counts: BTreeMap<EntityType, usize>,
    pub issues: Vec<LoadIssue>,
    /// Fingerprint over every readable file
    pub fingerprint: Checksum,
}

impl LoadReport {
    pub fn total(&self) -> usize {
        self.counts.values().sum()
    }

    pub fn skipped(&self) -> usize {
        self.issues.iter().filter(|i| i.skipped).count()
    }
}

// =============================================================================
// Queries
// =============================================================================

/// Equality/containment filters applied by [`EntityStore::list`]
#[derive(Debug, Clone, Default)]
pub struct ListFilter {
    pub category: Option<String>,
    pub status: Option<String>,
    /// Keep entities whose relation fields mention this id
    pub related_to: Option<String>,
    /// Workflows only
    pub validated: Option<bool>,
}

impl ListFilter {
    pub fn matches(&self, entity: &Entity) -> bool {
        if let Some(category) = &self.category {
            if entity.category() != Some(category.as_str()) {
                return false;
            }
        }
        if let Some(status) = &self.status {
            if entity.status() != Some(status.as_str()) {
                return false;
            }
        }
        if let Some(id) = &self.related_to {
            if !entity.mentions(id) {
                return false;
            }
        }
        if let Some(validated) = self.validated {
            match entity.as_workflow() {
                Some(w) if w.validated == validated => {}
                _ => return false,
            }
        }
        true
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct DeleteOptions {
    /// Delete even when other entities still reference the target
    pub force: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteOutcome {
    pub entity_type: EntityType,
    pub id: String,
    /// References left dangling by a forced delete
    pub warnings: Vec<String>,
}

// =============================================================================
// Store
// =============================================================================

type Index = BTreeMap<EntityType, BTreeMap<String, Entity>>;
type SourcePaths = BTreeMap<(EntityType, String), PathBuf>;

/// File-backed entity store
pub struct EntityStore {
    root: PathBuf,
    migrations: Arc<MigrationRegistry>,
    index: Index,
    /// File each indexed entity was read from or last written to
    paths: SourcePaths,
    report: LoadReport,
}

impl EntityStore {
    /// Open (creating if needed) a data directory and load every entity
    pub fn open(root: impl AsRef<Path>, migrations: Arc<MigrationRegistry>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root)?;

        let mut store = Self {
            root,
            migrations,
            index: Index::new(),
            paths: SourcePaths::new(),
            report: LoadReport {
                counts: BTreeMap::new(),
                issues: Vec::new(),
                fingerprint: Checksum::combine(std::iter::empty()),
            },
        };
        store.refresh();
        Ok(store)
    }

    /// Get the root path of the store
    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn migrations(&self) -> &MigrationRegistry {
        &self.migrations
    }

    pub fn type_dir(&self, entity_type: EntityType) -> PathBuf {
        self.root.join(entity_type.dir_name())
    }

    pub fn load_report(&self) -> &LoadReport {
        &self.report
    }

    /// File backing an indexed entity
    pub fn source_path(&self, entity_type: EntityType, id: &str) -> Option<&Path> {
        self.paths.get(&(entity_type, id.to_string())).map(PathBuf::as_path)
    }

    /// Discard the index and rescan the data directory
    pub fn refresh(&mut self) -> LoadReport {
        let mut index = Index::new();
        let mut paths = SourcePaths::new();
        let mut issues = Vec::new();
        let mut checksums: Vec<(String, Checksum)> = Vec::new();

        for entity_type in EntityType::ALL {
            let dir = self.type_dir(entity_type);
            let scan = codec::read_all(&dir);
            let bucket = index.entry(entity_type).or_insert_with(BTreeMap::new);

            for failure in scan.failures {
                warn!(path = %failure.path.display(), "skipping unreadable file: {}", failure.message);
                issues.push(LoadIssue {
                    entity_type,
                    path: failure.path,
                    message: failure.message,
                    skipped: true,
                });
            }

            for doc in scan.documents {
                checksums.push((format!("{}/{}", entity_type.dir_name(), doc.stem), doc.checksum.clone()));
                let path = doc.path.clone();
                let Some(entity) = decode_document(&self.migrations, entity_type, doc, &mut issues) else {
                    continue;
                };
                if bucket.contains_key(entity.id()) {
                    let message = format!("duplicate id '{}'", entity.id());
                    warn!(path = %path.display(), "{}", message);
                    issues.push(LoadIssue {
                        entity_type,
                        path,
                        message,
                        skipped: true,
                    });
                    continue;
                }
                paths.insert((entity_type, entity.id().to_string()), path);
                bucket.insert(entity.id().to_string(), entity);
            }
        }

        let counts = index.iter().map(|(t, b)| (*t, b.len())).collect();
        let fingerprint = Checksum::combine(checksums.iter().map(|(k, c)| (k.as_str(), c)));
        let report = LoadReport {
            counts,
            issues,
            fingerprint,
        };

        info!(
            root = %self.root.display(),
            entities = report.total(),
            skipped = report.skipped(),
            "loaded artifact store"
        );

        self.index = index;
        self.paths = paths;
        self.report = report.clone();
        report
    }

    // ========== Reads ==========

    pub fn contains(&self, entity_type: EntityType, id: &str) -> bool {
        self.index.get(&entity_type).is_some_and(|b| b.contains_key(id))
    }

    pub fn find(&self, entity_type: EntityType, id: &str) -> Option<&Entity> {
        self.index.get(&entity_type)?.get(id)
    }

    pub fn get(&self, entity_type: EntityType, id: &str) -> Result<&Entity> {
        self.find(entity_type, id).ok_or_else(|| StoreError::NotFound {
            entity_type,
            id: id.to_string(),
        })
    }

    /// First entity with this id, searching types in load order
    pub fn resolve(&self, id: &str) -> Option<&Entity> {
        EntityType::ALL.iter().find_map(|t| self.find(*t, id))
    }

    /// Every entity of one type, ordered by id
    pub fn entities(&self, entity_type: EntityType) -> impl Iterator<Item = &Entity> {
        self.index.get(&entity_type).into_iter().flat_map(|b| b.values())
    }

    /// Every entity of every type
    pub fn all(&self) -> impl Iterator<Item = &Entity> {
        self.index.values().flat_map(|b| b.values())
    }

    pub fn count(&self, entity_type: EntityType) -> usize {
        self.index.get(&entity_type).map_or(0, BTreeMap::len)
    }

    pub fn list(&self, entity_type: EntityType, filter: &ListFilter) -> Vec<&Entity> {
        self.entities(entity_type).filter(|e| filter.matches(e)).collect()
    }

    pub fn workflows(&self) -> impl Iterator<Item = &Workflow> {
        self.entities(EntityType::Workflow).filter_map(Entity::as_workflow)
    }

    pub fn capabilities(&self) -> impl Iterator<Item = &Capability> {
        self.entities(EntityType::Capability).filter_map(Entity::as_capability)
    }

    pub fn personas(&self) -> impl Iterator<Item = &Persona> {
        self.entities(EntityType::Persona).filter_map(Entity::as_persona)
    }

    pub fn components(&self) -> impl Iterator<Item = &Component> {
        self.entities(EntityType::Component).filter_map(Entity::as_component)
    }

    pub fn test_results(&self) -> impl Iterator<Item = &TestResult> {
        self.entities(EntityType::TestResult).filter_map(Entity::as_test_result)
    }

    /// Every entity/field that forward-references `(entity_type, id)`
    pub fn dependents(&self, entity_type: EntityType, id: &str) -> Vec<Dependent> {
        let mut dependents = Vec::new();
        for relation in RELATIONS.iter().filter(|r| r.target == entity_type) {
            for owner in self.entities(relation.owner) {
                if relation.owner == entity_type && owner.id() == id {
                    continue;
                }
                if owner.forward_refs(relation.field).contains(&id) {
                    dependents.push(Dependent {
                        entity_type: relation.owner,
                        id: owner.id().to_string(),
                        field: relation.field.to_string(),
                    });
                }
            }
        }
        dependents
    }

    /// Forward references of `entity` whose targets are not in the index
    pub fn missing_references(&self, entity: &Entity) -> Vec<MissingReference> {
        let mut missing = Vec::new();
        for relation in entity.entity_type().relations() {
            for target in entity.forward_refs(relation.field) {
                if !self.contains(relation.target, target) {
                    missing.push(MissingReference {
                        field: relation.field.to_string(),
                        target_type: relation.target,
                        target_id: target.to_string(),
                    });
                }
            }
        }
        missing
    }

    // ========== Mutations ==========

    /// Validate, persist and index a new entity
    pub fn create(&mut self, entity_type: EntityType, input: Value) -> Result<Entity> {
        let id_hint = id_hint(&input);
        let data = strip_managed_fields(entity_type, input);
        let mut entity = parse_entity(entity_type, data).map_err(|errors| StoreError::Validation {
            entity_type,
            id: id_hint,
            errors,
        })?;
        let id = entity.id().to_string();

        if self.contains(entity_type, &id) {
            return Err(StoreError::AlreadyExists { entity_type, id });
        }
        let missing = self.missing_references(&entity);
        if !missing.is_empty() {
            return Err(StoreError::Reference {
                entity_type,
                id,
                missing,
            });
        }

        version::stamp_created(entity.meta_mut());
        self.rebuild_back_refs(&mut entity);
        self.persist(&entity)?;
        self.insert(entity.clone());
        self.sync_back_refs(entity_type, &id, None, Some(&entity))?;

        debug!(%entity_type, %id, "created entity");
        self.get(entity_type, &id).cloned()
    }

    /// Merge `patch` onto an existing entity and persist it with a bumped version
    pub fn update(&mut self, entity_type: EntityType, id: &str, patch: Value) -> Result<Entity> {
        let current = self.get(entity_type, id)?.clone();
        ensure_editable(&current)?;
        let Value::Object(patch) = patch else {
            return Err(StoreError::Validation {
                entity_type,
                id: id.to_string(),
                errors: vec![FieldError::new("(document)", "update must be a mapping of fields")],
            });
        };
        if let Some(new_id) = patch.get("id") {
            if new_id.as_str() != Some(id) {
                return Err(StoreError::ImmutableId {
                    entity_type,
                    id: id.to_string(),
                    attempted: new_id.as_str().map(str::to_string).unwrap_or_else(|| new_id.to_string()),
                });
            }
        }

        let mut merged = match current.to_value()? {
            Value::Object(map) => map,
            _ => serde_json::Map::new(),
        };
        let back_fields = entity_type.back_fields();
        for (key, value) in patch {
            if key == "id" || VersionMeta::FIELDS.contains(&key.as_str()) || back_fields.contains(&key.as_str()) {
                continue;
            }
            if value.is_null() {
                merged.remove(&key);
            } else {
                merged.insert(key, value);
            }
        }

        let mut updated =
            parse_entity(entity_type, Value::Object(merged)).map_err(|errors| StoreError::Validation {
                entity_type,
                id: id.to_string(),
                errors,
            })?;
        let missing = self.missing_references(&updated);
        if !missing.is_empty() {
            return Err(StoreError::Reference {
                entity_type,
                id: id.to_string(),
                missing,
            });
        }

        version::stamp_updated(updated.meta_mut())?;
        self.persist(&updated)?;
        self.insert(updated.clone());
        self.sync_back_refs(entity_type, id, Some(&current), Some(&updated))?;

        debug!(%entity_type, %id, version = ?updated.meta().version, "updated entity");
        self.get(entity_type, id).cloned()
    }

    /// Remove an entity's file; refuses while dependents exist unless forced
    pub fn delete(&mut self, entity_type: EntityType, id: &str, options: DeleteOptions) -> Result<DeleteOutcome> {
        let current = self.get(entity_type, id)?.clone();
        let dependents = self.dependents(entity_type, id);
        if !dependents.is_empty() && !options.force {
            return Err(StoreError::HasDependents {
                entity_type,
                id: id.to_string(),
                dependents,
            });
        }

        let warnings: Vec<String> = dependents
            .iter()
            .map(|d| {
                format!(
                    "{} '{}' now references missing {} '{}' in {}",
                    d.entity_type.display_name(),
                    d.id,
                    entity_type,
                    id,
                    d.field
                )
            })
            .collect();

        let key = (entity_type, id.to_string());
        let path = self
            .paths
            .get(&key)
            .cloned()
            .unwrap_or_else(|| codec::document_path(&self.type_dir(entity_type), id));
        if !codec::delete_path(&path)? {
            return Err(StoreError::MissingFile {
                entity_type,
                id: id.to_string(),
                path,
            });
        }
        self.paths.remove(&key);
        if let Some(bucket) = self.index.get_mut(&entity_type) {
            bucket.remove(id);
        }
        self.sync_back_refs(entity_type, id, Some(&current), None)?;

        for warning in &warnings {
            warn!(%entity_type, %id, "forced delete: {}", warning);
        }
        debug!(%entity_type, %id, "deleted entity");
        Ok(DeleteOutcome {
            entity_type,
            id: id.to_string(),
            warnings,
        })
    }

    // ========== Internals ==========

    /// Write `entity` to `<id>.yaml`, retiring the file it was previously read from
    fn persist(&mut self, entity: &Entity) -> Result<PathBuf> {
        let entity_type = entity.entity_type();
        let key = (entity_type, entity.id().to_string());
        let canonical = codec::document_path(&self.type_dir(entity_type), entity.id());
        let previous = self.paths.get(&key).cloned();

        // Another indexed entity already lives under this name: rewrite in place
        let canonical_taken = self.paths.iter().any(|(k, p)| *p == canonical && *k != key);
        let target = match &previous {
            Some(path) if canonical_taken => path.clone(),
            None if canonical_taken => {
                return Err(StoreError::Io(std::io::Error::new(
                    std::io::ErrorKind::AlreadyExists,
                    format!("{} already holds another {}", canonical.display(), entity_type),
                )));
            }
            _ => canonical,
        };

        let written = codec::write_to(&target, entity)?;
        if let Some(old) = previous.filter(|old| *old != written) {
            codec::delete_path(&old)?;
            debug!(from = %old.display(), to = %written.display(), "renamed entity file");
        }
        self.paths.insert(key, written.clone());
        Ok(written)
    }

    fn insert(&mut self, entity: Entity) {
        self.index
            .entry(entity.entity_type())
            .or_default()
            .insert(entity.id().to_string(), entity);
    }

    /// Fill the back-reference arrays of `entity` from the forward index
    fn rebuild_back_refs(&self, entity: &mut Entity) {
        let id = entity.id().to_string();
        for relation in entity.entity_type().mirrored_relations() {
            let Some(back_field) = relation.back_field else { continue };
            let owners: Vec<String> = self
                .entities(relation.owner)
                .filter(|owner| owner.forward_refs(relation.field).contains(&id.as_str()))
                .map(|owner| owner.id().to_string())
                .collect();
            if let Some(list) = entity.back_refs_mut(back_field) {
                *list = owners;
            }
        }
    }

    /// Mirror forward-reference changes of one owner into its targets' back-references
    fn sync_back_refs(
        &mut self,
        owner_type: EntityType,
        owner_id: &str,
        before: Option<&Entity>,
        after: Option<&Entity>,
    ) -> Result<()> {
        let mut touched: BTreeSet<(EntityType, String)> = BTreeSet::new();

        for relation in owner_type.relations() {
            let Some(back_field) = relation.back_field else { continue };
            let old: BTreeSet<String> = before
                .map(|e| e.forward_refs(relation.field).into_iter().map(str::to_string).collect())
                .unwrap_or_default();
            let new: BTreeSet<String> = after
                .map(|e| e.forward_refs(relation.field).into_iter().map(str::to_string).collect())
                .unwrap_or_default();

            for target_id in old.difference(&new) {
                let Some(target) = self.find_mut(relation.target, target_id) else { continue };
                if let Some(list) = target.back_refs_mut(back_field) {
                    let len = list.len();
                    list.retain(|x| x != owner_id);
                    if list.len() != len {
                        touched.insert((relation.target, target_id.clone()));
                    }
                }
            }
            for target_id in new.difference(&old) {
                let Some(target) = self.find_mut(relation.target, target_id) else { continue };
                if let Some(list) = target.back_refs_mut(back_field) {
                    if !list.iter().any(|x| x == owner_id) {
                        list.push(owner_id.to_string());
                        touched.insert((relation.target, target_id.clone()));
                    }
                }
            }
        }

        for (entity_type, id) in touched {
            let Some(target) = self.find_mut(entity_type, &id) else { continue };
            if version::is_from_newer_release(target.meta().schema_version.as_deref()) {
                warn!(%entity_type, %id, "not rewriting entity from a newer schema; its back-references on disk are stale");
                continue;
            }
            version::stamp_touched(target.meta_mut());
            let snapshot = target.clone();
            self.persist(&snapshot)?;
            debug!(%entity_type, %id, "refreshed back-references");
        }
        Ok(())
    }

    fn find_mut(&mut self, entity_type: EntityType, id: &str) -> Option<&mut Entity> {
        self.index.get_mut(&entity_type)?.get_mut(id)
    }
}

// =============================================================================
// Helpers
// =============================================================================

fn id_hint(input: &Value) -> String {
    input
        .get("id")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

/// Refuse to rewrite an entity whose schema this release does not understand
fn ensure_editable(entity: &Entity) -> Result<()> {
    let stored = entity.meta().schema_version.as_deref();
    if version::is_from_newer_release(stored) {
        return Err(StoreError::IncompatibleSchema {
            entity_type: entity.entity_type(),
            id: entity.id().to_string(),
            stored: stored.unwrap_or_default().to_string(),
            current: version::CURRENT_SCHEMA_VERSION.to_string(),
        });
    }
    Ok(())
}

/// Drop fields the store owns: version metadata and back-references
fn strip_managed_fields(entity_type: EntityType, mut input: Value) -> Value {
    if let Value::Object(map) = &mut input {
        for field in VersionMeta::FIELDS {
            map.remove(field);
        }
        for field in entity_type.back_fields() {
            map.remove(field);
        }
    }
    input
}

/// Migrate and validate one scanned document
fn decode_document(
    migrations: &MigrationRegistry,
    entity_type: EntityType,
    doc: RawDocument,
    issues: &mut Vec<LoadIssue>,
) -> Option<Entity> {
    let RawDocument { path, stem, mut data, .. } = doc;

    if let Value::Object(map) = &mut data {
        if !map.contains_key("id") {
            map.insert("id".to_string(), Value::String(stem.clone()));
        }
    }

    let outcome = migrations.upgrade_to_current(&data, entity_type);
    let data = if outcome.success {
        outcome.data
    } else {
        let message = format!(
            "migration from {} failed after {} step(s): {}",
            outcome.from_version,
            outcome.migrations_applied,
            outcome.error.unwrap_or_default()
        );
        warn!(path = %path.display(), "{}", message);
        issues.push(LoadIssue {
            entity_type,
            path: path.clone(),
            message,
            skipped: false,
        });
        data
    };

    match parse_entity(entity_type, data) {
        Ok(entity) => {
            if entity.id() != stem {
                issues.push(LoadIssue {
                    entity_type,
                    path: path.clone(),
                    message: format!("file name does not match id '{}'", entity.id()),
                    skipped: false,
                });
            }
            Some(entity)
        }
        Err(errors) => {
            let message = errors.iter().map(|e| e.to_string()).collect::<Vec<_>>().join("; ");
            warn!(path = %path.display(), "skipping invalid entity: {}", message);
            issues.push(LoadIssue {
                entity_type,
                path,
                message,
                skipped: true,
            });
            None
        }
    }
}
