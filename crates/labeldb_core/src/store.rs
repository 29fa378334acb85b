//! Versioned entity store.
//!
//! The store provides type-scoped CRUD over a [`DocumentEngine`] with
//! revision stamping, pre-image diff capture, and change-data-capture
//! emission. Updates are atomic per entity: a bounded retry loop over
//! read → patch → compare-and-swap on `_rev`.

use crate::cdc::{CdcLog, ChangeEvent, WriteOp};
use crate::engine::{CasOutcome, DocumentEngine};
use crate::entity::{Entity, EntityId, ID_LABEL};
use crate::error::{StoreError, StoreResult};
use crate::stats::StoreStats;
use crate::validate::Validator;
use labeldb_query::Query;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, warn};

/// Attempts before a persistent revision conflict becomes a database error.
pub const MAX_CAS_RETRIES: u32 = 5;

/// Read-side options.
#[derive(Debug, Clone, Default)]
pub struct QueryFilter {
    /// Labels to project the result down to. Empty keeps all labels;
    /// `_id` is always included.
    pub return_labels: Vec<String>,
}

/// Outcome of a bulk write.
///
/// Bulk writes can be partially applied, so the successful items and the
/// terminating error are returned together rather than as a `Result`.
#[derive(Debug)]
pub struct BulkWrite<T> {
    /// Items written before the batch finished or stopped.
    pub writes: Vec<T>,
    /// The error that stopped or degraded the batch, if any.
    pub error: Option<StoreError>,
}

impl<T> BulkWrite<T> {
    /// A fully successful batch.
    #[must_use]
    pub fn ok(writes: Vec<T>) -> Self {
        Self {
            writes,
            error: None,
        }
    }

    /// A failed or partially applied batch.
    #[must_use]
    pub fn failed(writes: Vec<T>, error: StoreError) -> Self {
        Self {
            writes,
            error: Some(error),
        }
    }

    /// A batch that failed before writing anything.
    #[must_use]
    pub fn from_error(error: StoreError) -> Self {
        Self::failed(Vec::new(), error)
    }

    /// Returns true if the batch carries an error.
    #[must_use]
    pub fn is_err(&self) -> bool {
        self.error.is_some()
    }
}

/// Durable, versioned, type-scoped storage of entities.
///
/// Every successful mutation appends exactly one change event to the CDC
/// log, after the engine write.
pub struct EntityStore {
    engine: Arc<dyn DocumentEngine>,
    validator: Validator,
    cdc: Arc<CdcLog>,
    stats: Arc<StoreStats>,
}

impl EntityStore {
    /// Creates a store over the given engine and CDC log.
    pub fn new(engine: Arc<dyn DocumentEngine>, validator: Validator, cdc: Arc<CdcLog>) -> Self {
        Self {
            engine,
            validator,
            cdc,
            stats: Arc::new(StoreStats::new()),
        }
    }

    /// Returns the entity types this store serves.
    #[must_use]
    pub fn entity_types(&self) -> &[String] {
        self.validator.entity_types()
    }

    /// Returns the CDC log fed by this store.
    #[must_use]
    pub fn cdc(&self) -> &Arc<CdcLog> {
        &self.cdc
    }

    /// Returns the store's counters.
    #[must_use]
    pub fn stats(&self) -> &Arc<StoreStats> {
        &self.stats
    }

    /// Creates entities in caller order.
    ///
    /// Each entity is stamped with `_id`, `_type`, and `_rev = 0` before
    /// insertion. If an insertion fails the batch stops: already-inserted
    /// ids are returned together with a *create-partial* error recording
    /// how far the batch got.
    pub fn create_entities(&self, write_op: &WriteOp, entities: Vec<Entity>) -> BulkWrite<EntityId> {
        if let Err(err) = self.validator.entity_type(&write_op.entity_type) {
            self.stats.record_error();
            return BulkWrite::from_error(err);
        }
        if let Err(err) = self.validator.entities(&entities) {
            self.stats.record_error();
            return BulkWrite::from_error(err);
        }

        let attempted = entities.len();
        let mut ids = Vec::with_capacity(attempted);
        for mut entity in entities {
            let id = EntityId::new();
            entity.set_id(id);
            entity.set_entity_type(&write_op.entity_type);
            entity.set_rev(0);

            match self.engine.insert(&write_op.entity_type, entity.clone()) {
                Ok(()) => {
                    self.emit(ChangeEvent::insert(write_op.clone(), id, entity));
                    self.stats.record_create();
                    ids.push(id);
                }
                Err(err) => {
                    self.stats.record_error();
                    let err = StoreError::create_partial(ids.len(), attempted, err.into());
                    warn!(entity_type = %write_op.entity_type, error = %err, "bulk create stopped");
                    return BulkWrite::failed(ids, err);
                }
            }
        }
        BulkWrite::ok(ids)
    }

    /// Reads entities matching the query.
    ///
    /// Returns an empty list on no match. `filter.return_labels` projects
    /// each entity down to that set plus `_id`.
    pub fn read_entities(
        &self,
        entity_type: &str,
        query: &Query,
        filter: &QueryFilter,
    ) -> StoreResult<Vec<Entity>> {
        self.validator.entity_type(entity_type)?;
        let entities = self.engine.scan(entity_type, query).map_err(|err| {
            self.stats.record_error();
            StoreError::from(err)
        })?;
        self.stats.record_read();
        if filter.return_labels.is_empty() {
            Ok(entities)
        } else {
            Ok(entities
                .iter()
                .map(|e| e.project(&filter.return_labels))
                .collect())
        }
    }

    /// Patches every entity matching the query.
    ///
    /// Each entity is updated atomically via compare-and-swap on `_rev`,
    /// retried up to [`MAX_CAS_RETRIES`] times. Entities whose labels
    /// already equal the patch still increment `_rev`. The returned diffs
    /// carry the pre-image of the changed labels plus `_id`, in processing
    /// order. A persistent conflict degrades that entity to a *db-error*
    /// without aborting the batch.
    pub fn update_entities(
        &self,
        write_op: &WriteOp,
        query: &Query,
        patch: &Entity,
    ) -> BulkWrite<Entity> {
        if let Err(err) = self.validator.entity_type(&write_op.entity_type) {
            self.stats.record_error();
            return BulkWrite::from_error(err);
        }
        if let Err(err) = self.validator.entities(std::slice::from_ref(patch)) {
            self.stats.record_error();
            return BulkWrite::from_error(err);
        }

        let matched = match self.engine.scan(&write_op.entity_type, query) {
            Ok(matched) => matched,
            Err(err) => {
                self.stats.record_error();
                return BulkWrite::from_error(err.into());
            }
        };

        let mut diffs = Vec::new();
        let mut error: Option<StoreError> = None;
        for entity in matched {
            match self.update_one(write_op, entity, patch) {
                Ok(Some(diff)) => diffs.push(diff),
                // The entity vanished mid-flight; it no longer matches.
                Ok(None) => {}
                Err(err) => {
                    self.stats.record_error();
                    error.get_or_insert(err);
                }
            }
        }
        BulkWrite {
            writes: diffs,
            error,
        }
    }

    /// Updates one entity with the CAS retry loop.
    ///
    /// Returns `Ok(None)` when the entity disappeared before the swap.
    fn update_one(
        &self,
        write_op: &WriteOp,
        mut current: Entity,
        patch: &Entity,
    ) -> StoreResult<Option<Entity>> {
        let id = current
            .id()
            .ok_or_else(|| StoreError::db("stored entity missing _id"))?;

        for attempt in 1..=MAX_CAS_RETRIES {
            let current_rev = current.rev().unwrap_or(0);
            let (diff, updated, new_partial) = apply_patch(&current, patch);

            match self
                .engine
                .replace_if_rev(&write_op.entity_type, &id, current_rev, updated)?
            {
                CasOutcome::Applied => {
                    self.emit(ChangeEvent::update(
                        write_op.clone(),
                        id,
                        current_rev + 1,
                        diff.clone(),
                        new_partial,
                    ));
                    self.stats.record_update();
                    return Ok(Some(diff));
                }
                CasOutcome::Missing => return Ok(None),
                CasOutcome::RevMismatch => {
                    debug!(entity_id = %id, attempt, "revision conflict, retrying");
                    match self.engine.get(&write_op.entity_type, &id)? {
                        Some(fresh) => current = fresh,
                        None => return Ok(None),
                    }
                }
            }
        }
        Err(StoreError::db(format!(
            "update of entity {id} exceeded {MAX_CAS_RETRIES} attempts"
        )))
    }

    /// Removes every entity matching the query.
    ///
    /// Returns the full pre-delete entities, including the meta labels.
    pub fn delete_entities(&self, write_op: &WriteOp, query: &Query) -> BulkWrite<Entity> {
        if let Err(err) = self.validator.entity_type(&write_op.entity_type) {
            self.stats.record_error();
            return BulkWrite::from_error(err);
        }
        let matched = match self.engine.scan(&write_op.entity_type, query) {
            Ok(matched) => matched,
            Err(err) => {
                self.stats.record_error();
                return BulkWrite::from_error(err.into());
            }
        };

        let mut removed = Vec::new();
        let mut error: Option<StoreError> = None;
        for entity in matched {
            let Some(id) = entity.id() else { continue };
            match self.engine.remove(&write_op.entity_type, &id) {
                Ok(Some(pre)) => {
                    let rev = pre.rev().unwrap_or(0);
                    self.emit(ChangeEvent::delete(write_op.clone(), id, rev, pre.clone()));
                    self.stats.record_delete();
                    removed.push(pre);
                }
                // Already gone; nothing to report.
                Ok(None) => {}
                Err(err) => {
                    self.stats.record_error();
                    error.get_or_insert(err.into());
                }
            }
        }
        BulkWrite {
            writes: removed,
            error,
        }
    }

    /// Removes one label from the entity named by `write_op.entity_id`.
    ///
    /// The update is unconditional: `_rev` increments even when the label
    /// is absent. Returns `_id` plus the removed label's prior value (only
    /// `_id` when the label was absent).
    pub fn delete_label(&self, write_op: &WriteOp, label: &str) -> StoreResult<Entity> {
        self.validator.entity_type(&write_op.entity_type)?;
        self.validator.delete_label(label)?;
        let id = write_op
            .entity_id
            .ok_or_else(|| StoreError::validation("write op missing entity id"))?;

        let mut current = self
            .engine
            .get(&write_op.entity_type, &id)?
            .ok_or(StoreError::NotFound)?;

        for _attempt in 1..=MAX_CAS_RETRIES {
            let current_rev = current.rev().unwrap_or(0);
            let mut updated = current.clone();
            let old_value = updated.remove(label);
            updated.set_rev(current_rev + 1);

            let mut diff = Entity::new();
            let mut new_partial = Entity::new();
            if let Some(id_value) = current.get(ID_LABEL) {
                diff.insert(ID_LABEL, id_value.clone());
                new_partial.insert(ID_LABEL, id_value.clone());
            }
            if let Some(old) = old_value {
                diff.insert(label, old);
            }

            match self
                .engine
                .replace_if_rev(&write_op.entity_type, &id, current_rev, updated)?
            {
                CasOutcome::Applied => {
                    self.emit(ChangeEvent::update(
                        write_op.clone(),
                        id,
                        current_rev + 1,
                        diff.clone(),
                        new_partial,
                    ));
                    self.stats.record_label_delete();
                    return Ok(diff);
                }
                CasOutcome::Missing => return Err(StoreError::NotFound),
                CasOutcome::RevMismatch => {
                    current = self
                        .engine
                        .get(&write_op.entity_type, &id)?
                        .ok_or(StoreError::NotFound)?;
                }
            }
        }
        Err(StoreError::db(format!(
            "label delete on entity {id} exceeded {MAX_CAS_RETRIES} attempts"
        )))
    }

    /// Appends a change event. Called after the engine write succeeded.
    fn emit(&self, event: ChangeEvent) {
        self.cdc.append(event);
        self.stats.record_event();
    }
}

impl std::fmt::Debug for EntityStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntityStore")
            .field("entity_types", &self.entity_types())
            .finish_non_exhaustive()
    }
}

/// Applies a patch to an entity.
///
/// Returns `(diff, updated, new_partial)`:
/// - `diff` — `_id` plus the pre-image of every patch label whose value
///   actually changes (`null` for labels the entity never had)
/// - `updated` — the full post-image with `_rev` incremented
/// - `new_partial` — `_id` plus every patch label with its new value
fn apply_patch(current: &Entity, patch: &Entity) -> (Entity, Entity, Entity) {
    let mut updated = current.clone();
    let mut diff = Entity::new();
    let mut new_partial = Entity::new();

    if let Some(id_value) = current.get(ID_LABEL) {
        diff.insert(ID_LABEL, id_value.clone());
        new_partial.insert(ID_LABEL, id_value.clone());
    }
    for (label, value) in patch.as_map() {
        if current.get(label) != Some(value) {
            diff.insert(
                label.clone(),
                current.get(label).cloned().unwrap_or(Value::Null),
            );
        }
        new_partial.insert(label.clone(), value.clone());
        updated.insert(label.clone(), value.clone());
    }
    updated.set_rev(current.rev().unwrap_or(0) + 1);
    (diff, updated, new_partial)
}
