//! Consistency checks over the whole store
//!
//! Dangling forward references are errors. Orphans, back-reference drift,
//! schema-version drift and load issues are warnings; the last two carry a
//! `[Schema]` / `[Load]` prefix so callers can filter them out.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::RelationshipGraph;
use crate::entity::{Entity, EntityType};
use crate::error::{Result, StoreError};
use crate::store::EntityStore;
use crate::version::create_schema_warning;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub valid: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl ValidationReport {
    /// Warnings without the `[Schema]` and `[Load]` entries
    pub fn structural_warnings(&self) -> impl Iterator<Item = &str> {
        self.warnings
            .iter()
            .map(String::as_str)
            .filter(|w| !w.starts_with("[Schema]") && !w.starts_with("[Load]"))
    }
}

/// Full consistency pass
pub fn validate(store: &EntityStore) -> ValidationReport {
    let graph = RelationshipGraph::build(store);
    let mut errors = Vec::new();
    let mut warnings = Vec::new();

    for dangling in graph.dangling() {
        errors.push(format!(
            "{} '{}' references non-existent {} '{}' ({})",
            dangling.owner_type.display_name(),
            dangling.owner_id,
            dangling.relation.target,
            dangling.target_id,
            dangling.relation.field
        ));
    }

    for entity_type in EntityType::ORPHAN_CHECKED {
        for id in orphans_of(store, &graph, entity_type) {
            warnings.push(format!(
                "{} '{}' is not referenced by any workflow (orphan)",
                entity_type.display_name(),
                id
            ));
        }
    }

    for entity in store.all() {
        check_back_references(store, entity, &mut warnings);
    }

    for entity in store.all() {
        if let Some(warning) =
            create_schema_warning(entity.entity_type(), entity.id(), entity.meta().schema_version.as_deref())
        {
            warnings.push(warning.to_string());
        }
    }

    warnings.extend(store.load_report().issues.iter().map(|issue| issue.to_string()));

    ValidationReport {
        valid: errors.is_empty(),
        errors,
        warnings,
    }
}

/// Compare each stored back-reference array against the forward index, both ways
fn check_back_references(store: &EntityStore, entity: &Entity, warnings: &mut Vec<String>) {
    let ty = entity.entity_type();
    let id = entity.id();

    for relation in ty.mirrored_relations() {
        let Some(back_field) = relation.back_field else { continue };
        let listed = entity.back_refs(back_field).cloned().unwrap_or_default();

        for owner_id in &listed {
            match store.find(relation.owner, owner_id) {
                None => warnings.push(format!(
                    "Bidirectional inconsistency: {} '{}' lists {} '{}' in {} but it does not exist",
                    ty.display_name(),
                    id,
                    relation.owner,
                    owner_id,
                    back_field
                )),
                Some(owner) if !owner.forward_refs(relation.field).contains(&id) => warnings.push(format!(
                    "Bidirectional inconsistency: {} '{}' lists {} '{}' in {} but '{}' does not list it in {}",
                    ty.display_name(),
                    id,
                    relation.owner,
                    owner_id,
                    back_field,
                    owner_id,
                    relation.field
                )),
                Some(_) => {}
            }
        }

        for owner in store.entities(relation.owner) {
            if owner.forward_refs(relation.field).contains(&id) && !listed.iter().any(|x| x == owner.id()) {
                warnings.push(format!(
                    "Bidirectional inconsistency: {} '{}' lists {} '{}' in {} but {} is missing it",
                    relation.owner.display_name(),
                    owner.id(),
                    ty,
                    id,
                    relation.field,
                    back_field
                ));
            }
        }
    }
}

fn orphans_of(store: &EntityStore, graph: &RelationshipGraph, entity_type: EntityType) -> Vec<String> {
    store
        .entities(entity_type)
        .filter(|e| graph.referrers_of_type(entity_type, e.id(), EntityType::Workflow) == 0)
        .map(|e| e.id().to_string())
        .collect()
}

// =============================================================================
// Orphans
// =============================================================================

/// Orphaned ids per checked type
pub type OrphanReport = BTreeMap<EntityType, Vec<String>>;

/// Capabilities, personas and components with no inbound workflow reference.
///
/// `None` checks all three; any other type is rejected.
pub fn find_orphans(store: &EntityStore, entity_type: Option<EntityType>) -> Result<OrphanReport> {
    let types: Vec<EntityType> = match entity_type {
        None => EntityType::ORPHAN_CHECKED.to_vec(),
        Some(t) if EntityType::ORPHAN_CHECKED.contains(&t) => vec![t],
        Some(t) => {
            return Err(StoreError::Unsupported(format!(
                "orphan detection covers capability, persona and component, not {}",
                t
            )))
        }
    };

    let graph = RelationshipGraph::build(store);
    Ok(types
        .into_iter()
        .map(|t| (t, orphans_of(store, &graph, t)))
        .collect())
}

// =============================================================================
// Gaps
// =============================================================================

/// Types whose categories are checked for thin coverage
const CATEGORIZED: [EntityType; 3] = [EntityType::Workflow, EntityType::Capability, EntityType::Component];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryCoverage {
    pub entity_type: EntityType,
    pub category: String,
    pub count: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GapReport {
    pub workflows_without_capabilities: Vec<String>,
    pub workflows_without_personas: Vec<String>,
    pub capabilities_without_components: Vec<String>,
    /// Categories with fewer than `threshold` entities
    pub low_coverage_categories: Vec<CategoryCoverage>,
}

impl GapReport {
    pub fn is_empty(&self) -> bool {
        self.workflows_without_capabilities.is_empty()
            && self.workflows_without_personas.is_empty()
            && self.capabilities_without_components.is_empty()
            && self.low_coverage_categories.is_empty()
    }
}

pub fn find_gaps(store: &EntityStore, threshold: usize) -> GapReport {
    let graph = RelationshipGraph::build(store);
    let mut report = GapReport::default();

    for workflow in store.workflows() {
        if workflow.requires_capabilities.is_empty() {
            report.workflows_without_capabilities.push(workflow.id.clone());
        }
        if workflow.personas.is_empty() {
            report.workflows_without_personas.push(workflow.id.clone());
        }
    }

    for capability in store.capabilities() {
        if graph.referrers_of_type(EntityType::Capability, &capability.id, EntityType::Component) == 0 {
            report.capabilities_without_components.push(capability.id.clone());
        }
    }

    for entity_type in CATEGORIZED {
        let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
        for entity in store.entities(entity_type) {
            if let Some(category) = entity.category().filter(|c| !c.is_empty()) {
                *counts.entry(category).or_default() += 1;
            }
        }
        report.low_coverage_categories.extend(
            counts
                .into_iter()
                .filter(|(_, count)| *count < threshold)
                .map(|(category, count)| CategoryCoverage {
                    entity_type,
                    category: category.to_string(),
                    count,
                }),
        );
    }

    report
}
