//! Schema-less entities.
//!
//! An entity is a mapping from label names to JSON values plus three
//! reserved meta labels managed exclusively by the store: `_id`, `_type`,
//! and `_rev`.

mod id;

pub use id::EntityId;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Reserved label carrying the entity id.
pub const ID_LABEL: &str = "_id";
/// Reserved label carrying the entity type.
pub const TYPE_LABEL: &str = "_type";
/// Reserved label carrying the revision counter.
pub const REV_LABEL: &str = "_rev";

/// The reserved meta labels, managed exclusively by the store.
pub const META_LABELS: [&str; 3] = [ID_LABEL, TYPE_LABEL, REV_LABEL];

/// Returns true if `label` is one of the reserved meta labels.
#[must_use]
pub fn is_meta_label(label: &str) -> bool {
    META_LABELS.contains(&label)
}

/// A schema-less entity: labels mapped to JSON values.
///
/// The wrapper is serde-transparent, so an entity serializes exactly as its
/// underlying JSON object.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Entity(Map<String, Value>);

impl Entity {
    /// Creates an empty entity.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the underlying label map.
    #[must_use]
    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    /// Consumes the entity, returning the underlying map.
    #[must_use]
    pub fn into_inner(self) -> Map<String, Value> {
        self.0
    }

    /// Returns the value of a label.
    #[must_use]
    pub fn get(&self, label: &str) -> Option<&Value> {
        self.0.get(label)
    }

    /// Sets a label.
    pub fn insert(&mut self, label: impl Into<String>, value: Value) -> Option<Value> {
        self.0.insert(label.into(), value)
    }

    /// Removes a label, returning its previous value.
    pub fn remove(&mut self, label: &str) -> Option<Value> {
        self.0.remove(label)
    }

    /// Returns true if the label is present.
    #[must_use]
    pub fn contains(&self, label: &str) -> bool {
        self.0.contains_key(label)
    }

    /// Returns the number of labels, meta labels included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true if the entity carries no labels at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns the entity id, if stamped.
    #[must_use]
    pub fn id(&self) -> Option<EntityId> {
        self.0
            .get(ID_LABEL)
            .and_then(Value::as_str)
            .and_then(EntityId::from_hex)
    }

    /// Stamps the entity id.
    pub fn set_id(&mut self, id: EntityId) {
        self.0
            .insert(ID_LABEL.to_string(), Value::String(id.to_hex()));
    }

    /// Returns the entity type, if stamped.
    #[must_use]
    pub fn entity_type(&self) -> Option<&str> {
        self.0.get(TYPE_LABEL).and_then(Value::as_str)
    }

    /// Stamps the entity type.
    pub fn set_entity_type(&mut self, entity_type: impl Into<String>) {
        self.0
            .insert(TYPE_LABEL.to_string(), Value::String(entity_type.into()));
    }

    /// Returns the revision counter, if stamped.
    #[must_use]
    pub fn rev(&self) -> Option<u64> {
        self.0.get(REV_LABEL).and_then(Value::as_u64)
    }

    /// Stamps the revision counter.
    pub fn set_rev(&mut self, rev: u64) {
        self.0.insert(REV_LABEL.to_string(), Value::from(rev));
    }

    /// Returns the non-reserved label names, sorted.
    #[must_use]
    pub fn label_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .0
            .keys()
            .filter(|k| !is_meta_label(k))
            .cloned()
            .collect();
        names.sort();
        names
    }

    /// Projects the entity down to the given labels.
    ///
    /// `_id` is always kept. An empty label list keeps everything.
    #[must_use]
    pub fn project(&self, return_labels: &[String]) -> Entity {
        if return_labels.is_empty() {
            return self.clone();
        }
        let mut map = Map::new();
        if let Some(id) = self.0.get(ID_LABEL) {
            map.insert(ID_LABEL.to_string(), id.clone());
        }
        for label in return_labels {
            if let Some(value) = self.0.get(label) {
                map.insert(label.clone(), value.clone());
            }
        }
        Entity(map)
    }
}

impl From<Map<String, Value>> for Entity {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

impl FromIterator<(String, Value)> for Entity {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn entity(value: Value) -> Entity {
        let Value::Object(map) = value else {
            panic!("test entity must be an object")
        };
        Entity::from(map)
    }

    #[test]
    fn meta_label_detection() {
        assert!(is_meta_label("_id"));
        assert!(is_meta_label("_type"));
        assert!(is_meta_label("_rev"));
        assert!(!is_meta_label("_other"));
        assert!(!is_meta_label("id"));
    }

    #[test]
    fn meta_accessors_roundtrip() {
        let mut e = Entity::new();
        let id = EntityId::new();
        e.set_id(id);
        e.set_entity_type("nodes");
        e.set_rev(3);

        assert_eq!(e.id(), Some(id));
        assert_eq!(e.entity_type(), Some("nodes"));
        assert_eq!(e.rev(), Some(3));
    }

    #[test]
    fn label_names_excludes_meta_and_sorts() {
        let mut e = entity(json!({"z": 1, "a": 2, "m": 3}));
        e.set_id(EntityId::new());
        e.set_entity_type("nodes");
        e.set_rev(0);

        assert_eq!(e.label_names(), ["a", "m", "z"]);
    }

    #[test]
    fn project_keeps_id() {
        let mut e = entity(json!({"x": 2, "y": "hello", "z": ["foo"]}));
        e.set_id(EntityId::from_bytes([7; 12]));

        let p = e.project(&["x".to_string()]);
        assert_eq!(p.get("x"), Some(&json!(2)));
        assert!(p.id().is_some());
        assert!(p.get("y").is_none());
        assert!(p.get("z").is_none());
    }

    #[test]
    fn project_empty_list_keeps_everything() {
        let e = entity(json!({"x": 2, "y": "hello"}));
        assert_eq!(e.project(&[]), e);
    }

    #[test]
    fn project_skips_absent_labels() {
        let mut e = entity(json!({"x": 2}));
        e.set_id(EntityId::new());
        let p = e.project(&["nope".to_string()]);
        assert_eq!(p.len(), 1); // only _id
    }

    #[test]
    fn serde_is_transparent() {
        let e = entity(json!({"x": 2, "y": "hello"}));
        let text = serde_json::to_string(&e).unwrap();
        let back: Entity = serde_json::from_str(&text).unwrap();
        assert_eq!(back, e);
        assert!(text.starts_with('{'));
    }
}
