//! Change-data-capture types.
//!
//! Every successful mutation of the entity store produces exactly one
//! [`ChangeEvent`]. Events carry the write-op envelope of the request that
//! caused them and are totally ordered by `(ts, id)`.

mod log;

pub use log::CdcLog;

use crate::entity::{Entity, EntityId};
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

/// Identifier of a change event. Same 12-byte layout as entity ids.
pub type EventId = EntityId;

/// The envelope carried by every write.
///
/// The envelope is atomic with the write: it is persisted in the emitted
/// change event and never stored in the entity itself. The optional
/// `set_*` triple describes a caller-defined logical batch.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct WriteOp {
    /// Caller identity, for audit.
    #[serde(default)]
    pub user: String,
    /// The entity type being written.
    pub entity_type: String,
    /// Target entity id, for single-entity routes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity_id: Option<EntityId>,
    /// Caller-defined batch operation name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub set_op: Option<String>,
    /// Caller-defined batch id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub set_id: Option<String>,
    /// Caller-defined batch size.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub set_size: Option<u32>,
}

impl WriteOp {
    /// Creates a write op for the given caller and entity type.
    pub fn new(user: impl Into<String>, entity_type: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            entity_type: entity_type.into(),
            ..Self::default()
        }
    }

    /// Targets a single entity.
    #[must_use]
    pub fn with_entity_id(mut self, id: EntityId) -> Self {
        self.entity_id = Some(id);
        self
    }

    /// Attaches the caller-defined set context.
    #[must_use]
    pub fn with_set(
        mut self,
        set_op: Option<String>,
        set_id: Option<String>,
        set_size: Option<u32>,
    ) -> Self {
        self.set_op = set_op;
        self.set_id = set_id;
        self.set_size = set_size;
        self
    }
}

/// The kind of mutation a change event describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    /// A new entity was created.
    Insert,
    /// Labels of an existing entity changed.
    Update,
    /// An entity was removed.
    Delete,
}

/// One record in the change log, describing exactly one mutation.
///
/// `rev` is the revision the entity has *after* the operation; for deletes
/// it is the last revision before removal. `old` and `new` are partial or
/// full entity snapshots depending on the kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeEvent {
    /// Event id, unique across the log.
    pub id: EventId,
    /// Entity type of the mutated entity.
    pub entity_type: String,
    /// Id of the mutated entity.
    pub entity_id: EntityId,
    /// Revision after the operation.
    pub rev: u64,
    /// Wall-clock milliseconds. Assigned by the log on append.
    pub ts: i64,
    /// Mutation kind.
    pub op: ChangeKind,
    /// Pre-image (null for inserts).
    pub old: Option<Entity>,
    /// Post-image (null for deletes).
    pub new: Option<Entity>,
    /// The write-op envelope of the causing request.
    pub write_op: WriteOp,
}

impl ChangeEvent {
    /// Creates an insert event.
    ///
    /// The event id and timestamp are provisional until the event is
    /// appended to a [`CdcLog`].
    pub fn insert(write_op: WriteOp, entity_id: EntityId, new: Entity) -> Self {
        Self {
            id: EventId::new(),
            entity_type: write_op.entity_type.clone(),
            entity_id,
            rev: 0,
            ts: now_ms(),
            op: ChangeKind::Insert,
            old: None,
            new: Some(new),
            write_op,
        }
    }

    /// Creates an update event.
    pub fn update(
        write_op: WriteOp,
        entity_id: EntityId,
        rev: u64,
        old: Entity,
        new: Entity,
    ) -> Self {
        Self {
            id: EventId::new(),
            entity_type: write_op.entity_type.clone(),
            entity_id,
            rev,
            ts: now_ms(),
            op: ChangeKind::Update,
            old: Some(old),
            new: Some(new),
            write_op,
        }
    }

    /// Creates a delete event.
    pub fn delete(write_op: WriteOp, entity_id: EntityId, rev: u64, old: Entity) -> Self {
        Self {
            id: EventId::new(),
            entity_type: write_op.entity_type.clone(),
            entity_id,
            rev,
            ts: now_ms(),
            op: ChangeKind::Delete,
            old: Some(old),
            new: None,
            write_op,
        }
    }

    /// Returns the event's total-order key.
    #[must_use]
    pub fn order_key(&self) -> (i64, EventId) {
        (self.ts, self.id)
    }
}

/// Current wall-clock time in milliseconds since the unix epoch.
#[must_use]
pub fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn write_op_serde_skips_empty_set_context() {
        let wo = WriteOp::new("alice", "nodes");
        let text = serde_json::to_string(&wo).unwrap();
        assert!(!text.contains("set_op"));
        assert!(!text.contains("entity_id"));

        let wo = wo.with_set(Some("import".into()), Some("batch-1".into()), Some(3));
        let text = serde_json::to_string(&wo).unwrap();
        assert!(text.contains("\"set_op\":\"import\""));
        assert!(text.contains("\"set_size\":3"));
    }

    #[test]
    fn change_kind_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&ChangeKind::Insert).unwrap(), "\"insert\"");
        assert_eq!(serde_json::to_string(&ChangeKind::Update).unwrap(), "\"update\"");
        assert_eq!(serde_json::to_string(&ChangeKind::Delete).unwrap(), "\"delete\"");
    }

    #[test]
    fn insert_event_shape() {
        let id = EntityId::new();
        let mut entity = Entity::new();
        entity.set_id(id);
        entity.insert("x", json!(2));

        let event = ChangeEvent::insert(WriteOp::new("", "nodes"), id, entity.clone());
        assert_eq!(event.op, ChangeKind::Insert);
        assert_eq!(event.rev, 0);
        assert!(event.old.is_none());
        assert_eq!(event.new, Some(entity));
        assert_eq!(event.entity_type, "nodes");
    }

    #[test]
    fn event_roundtrips_through_json() {
        let id = EntityId::new();
        let event = ChangeEvent::delete(WriteOp::new("bob", "nodes"), id, 4, Entity::new());
        let text = serde_json::to_string(&event).unwrap();
        let back: ChangeEvent = serde_json::from_str(&text).unwrap();
        assert_eq!(back, event);
        // Event frames have no "control" discriminator.
        assert!(!text.contains("\"control\""));
    }
}
