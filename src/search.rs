//! Fuzzy lookup across entity ids and names

use fuzzy_matcher::skim::SkimMatcherV2;
use fuzzy_matcher::FuzzyMatcher;
use serde::{Deserialize, Serialize};

use crate::entity::EntityType;
use crate::store::EntityStore;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchHit {
    pub entity_type: EntityType,
    pub id: String,
    pub name: String,
    pub score: i64,
}

/// Best matches for `query`, highest score first.
///
/// Each entity is scored on its id and its name; the better of the two wins.
pub fn search(store: &EntityStore, query: &str, limit: usize) -> Vec<SearchHit> {
    let query = query.trim();
    if query.is_empty() || limit == 0 {
        return Vec::new();
    }

    let matcher = SkimMatcherV2::default();
    let mut hits: Vec<SearchHit> = store
        .all()
        .filter_map(|entity| {
            let by_id = matcher.fuzzy_match(entity.id(), query);
            let by_name = matcher.fuzzy_match(entity.name(), query);
            let score = by_id.max(by_name)?;
            Some(SearchHit {
                entity_type: entity.entity_type(),
                id: entity.id().to_string(),
                name: entity.name().to_string(),
                score,
            })
        })
        .collect();

    hits.sort_by(|a, b| {
        b.score
            .cmp(&a.score)
            .then_with(|| a.entity_type.cmp(&b.entity_type))
            .then_with(|| a.id.cmp(&b.id))
    });
    hits.truncate(limit);
    hits
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::migration::MigrationRegistry;
    use serde_json::json;
    use std::sync::Arc;
    use tempfile::TempDir;

    #[test]
    fn test_search_ids_and_names() {
        let tmp = TempDir::new().unwrap();
        let mut store = EntityStore::open(tmp.path(), Arc::new(MigrationRegistry::with_builtin())).unwrap();
        store
            .create(EntityType::Capability, json!({"id": "data-export", "name": "Export data", "category": "io"}))
            .unwrap();
        store
            .create(EntityType::Persona, json!({"id": "analyst", "name": "Data Analyst", "role": "analyst"}))
            .unwrap();
        store
            .create(EntityType::Component, json!({"id": "map-view", "name": "Map", "category": "ui"}))
            .unwrap();

        let hits = search(&store, "export", 10);
        assert_eq!(hits[0].id, "data-export");
        assert!(hits.iter().all(|h| h.id != "map-view"));

        let data = search(&store, "data", 10);
        assert_eq!(data.len(), 2);
        assert_eq!(search(&store, "data", 1).len(), 1);
        assert!(search(&store, "   ", 10).is_empty());
    }
}
