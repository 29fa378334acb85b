//! In-memory document engine.

use crate::engine::{CasOutcome, DocumentEngine, EngineError, EngineResult};
use crate::entity::{Entity, EntityId};
use labeldb_query::Query;
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};

/// An in-memory document engine.
///
/// Entities live in one `BTreeMap` per entity type, keyed by id, so scans
/// return entities in id order (creation order for ids minted by this
/// process). Suitable for:
/// - Unit and integration tests
/// - Ephemeral deployments that don't need persistence
///
/// # Thread Safety
///
/// All operations take the engine-wide lock; per-document compare-and-swap
/// is therefore trivially atomic.
#[derive(Debug, Default)]
pub struct InMemoryEngine {
    collections: RwLock<HashMap<String, BTreeMap<EntityId, Entity>>>,
}

impl InMemoryEngine {
    /// Creates a new empty engine.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of entities of a type.
    ///
    /// Useful for tests and diagnostics.
    #[must_use]
    pub fn count(&self, entity_type: &str) -> usize {
        self.collections
            .read()
            .get(entity_type)
            .map_or(0, BTreeMap::len)
    }
}

impl DocumentEngine for InMemoryEngine {
    fn insert(&self, entity_type: &str, entity: Entity) -> EngineResult<()> {
        let id = entity
            .id()
            .ok_or_else(|| EngineError::backend("insert of entity without id"))?;
        let mut collections = self.collections.write();
        let collection = collections.entry(entity_type.to_string()).or_default();
        if collection.contains_key(&id) {
            return Err(EngineError::DuplicateId { id });
        }
        collection.insert(id, entity);
        Ok(())
    }

    fn get(&self, entity_type: &str, id: &EntityId) -> EngineResult<Option<Entity>> {
        Ok(self
            .collections
            .read()
            .get(entity_type)
            .and_then(|c| c.get(id))
            .cloned())
    }

    fn scan(&self, entity_type: &str, query: &Query) -> EngineResult<Vec<Entity>> {
        let collections = self.collections.read();
        let Some(collection) = collections.get(entity_type) else {
            return Ok(Vec::new());
        };
        Ok(collection
            .values()
            .filter(|e| query.matches(e.as_map()))
            .cloned()
            .collect())
    }

    fn replace_if_rev(
        &self,
        entity_type: &str,
        id: &EntityId,
        expected_rev: u64,
        entity: Entity,
    ) -> EngineResult<CasOutcome> {
        let mut collections = self.collections.write();
        let Some(collection) = collections.get_mut(entity_type) else {
            return Ok(CasOutcome::Missing);
        };
        let Some(current) = collection.get_mut(id) else {
            return Ok(CasOutcome::Missing);
        };
        if current.rev() != Some(expected_rev) {
            return Ok(CasOutcome::RevMismatch);
        }
        *current = entity;
        Ok(CasOutcome::Applied)
    }

    fn remove(&self, entity_type: &str, id: &EntityId) -> EngineResult<Option<Entity>> {
        Ok(self
            .collections
            .write()
            .get_mut(entity_type)
            .and_then(|c| c.remove(id)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use labeldb_query::translate;
    use serde_json::json;

    fn stamped(value: serde_json::Value, entity_type: &str, rev: u64) -> Entity {
        let serde_json::Value::Object(map) = value else {
            panic!("test entity must be an object")
        };
        let mut e = Entity::from(map);
        e.set_id(EntityId::new());
        e.set_entity_type(entity_type);
        e.set_rev(rev);
        e
    }

    #[test]
    fn insert_and_get() {
        let engine = InMemoryEngine::new();
        let e = stamped(json!({"x": 2}), "nodes", 0);
        let id = e.id().unwrap();

        engine.insert("nodes", e.clone()).unwrap();
        assert_eq!(engine.get("nodes", &id).unwrap(), Some(e));
        assert_eq!(engine.count("nodes"), 1);
    }

    #[test]
    fn duplicate_insert_rejected() {
        let engine = InMemoryEngine::new();
        let e = stamped(json!({"x": 2}), "nodes", 0);

        engine.insert("nodes", e.clone()).unwrap();
        let err = engine.insert("nodes", e).unwrap_err();
        assert!(matches!(err, EngineError::DuplicateId { .. }));
    }

    #[test]
    fn scan_filters_by_query() {
        let engine = InMemoryEngine::new();
        engine
            .insert("nodes", stamped(json!({"x": 1}), "nodes", 0))
            .unwrap();
        engine
            .insert("nodes", stamped(json!({"x": 5}), "nodes", 0))
            .unwrap();

        let q = translate("x > 2").unwrap();
        let matched = engine.scan("nodes", &q).unwrap();
        assert_eq!(matched.len(), 1);
        assert_eq!(matched[0].get("x"), Some(&json!(5)));
    }

    #[test]
    fn scan_is_type_scoped() {
        let engine = InMemoryEngine::new();
        engine
            .insert("nodes", stamped(json!({"a": 1}), "nodes", 0))
            .unwrap();
        engine
            .insert("hosts", stamped(json!({"a": 1}), "hosts", 0))
            .unwrap();

        let q = translate("a").unwrap();
        assert_eq!(engine.scan("nodes", &q).unwrap().len(), 1);
        assert_eq!(engine.scan("hosts", &q).unwrap().len(), 1);
        assert_eq!(engine.scan("unknown", &q).unwrap().len(), 0);
    }

    #[test]
    fn cas_applies_on_matching_rev() {
        let engine = InMemoryEngine::new();
        let e = stamped(json!({"x": 1}), "nodes", 0);
        let id = e.id().unwrap();
        engine.insert("nodes", e.clone()).unwrap();

        let mut next = e.clone();
        next.insert("x", json!(2));
        next.set_rev(1);

        let outcome = engine.replace_if_rev("nodes", &id, 0, next).unwrap();
        assert_eq!(outcome, CasOutcome::Applied);
        assert_eq!(engine.get("nodes", &id).unwrap().unwrap().rev(), Some(1));
    }

    #[test]
    fn cas_detects_mismatch_and_missing() {
        let engine = InMemoryEngine::new();
        let e = stamped(json!({"x": 1}), "nodes", 3);
        let id = e.id().unwrap();
        engine.insert("nodes", e.clone()).unwrap();

        let outcome = engine.replace_if_rev("nodes", &id, 0, e.clone()).unwrap();
        assert_eq!(outcome, CasOutcome::RevMismatch);

        let other = EntityId::new();
        let outcome = engine.replace_if_rev("nodes", &other, 0, e).unwrap();
        assert_eq!(outcome, CasOutcome::Missing);
    }

    #[test]
    fn remove_returns_pre_image() {
        let engine = InMemoryEngine::new();
        let e = stamped(json!({"x": 1}), "nodes", 0);
        let id = e.id().unwrap();
        engine.insert("nodes", e.clone()).unwrap();

        assert_eq!(engine.remove("nodes", &id).unwrap(), Some(e));
        assert_eq!(engine.remove("nodes", &id).unwrap(), None);
        assert_eq!(engine.count("nodes"), 0);
    }
}
