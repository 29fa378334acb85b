//! Store statistics.
//!
//! Counters are atomic and can be read while operations are in progress.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Operation counters for one entity store.
#[derive(Debug, Default)]
pub struct StoreStats {
    /// Entities created.
    creates: AtomicU64,
    /// Read queries executed.
    reads: AtomicU64,
    /// Entities updated.
    updates: AtomicU64,
    /// Entities deleted.
    deletes: AtomicU64,
    /// Labels removed via label delete.
    label_deletes: AtomicU64,
    /// Change events appended.
    events: AtomicU64,
    /// Store-level errors.
    errors: AtomicU64,
}

impl StoreStats {
    /// Creates a zeroed stats instance.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_create(&self) {
        self.creates.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_read(&self) {
        self.reads.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_update(&self) {
        self.updates.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_delete(&self) {
        self.deletes.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_label_delete(&self) {
        self.label_deletes.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_event(&self) {
        self.events.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_error(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Takes a point-in-time snapshot of all counters.
    #[must_use]
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            creates: self.creates.load(Ordering::Relaxed),
            reads: self.reads.load(Ordering::Relaxed),
            updates: self.updates.load(Ordering::Relaxed),
            deletes: self.deletes.load(Ordering::Relaxed),
            label_deletes: self.label_deletes.load(Ordering::Relaxed),
            events: self.events.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
        }
    }
}

/// A point-in-time copy of [`StoreStats`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    /// Entities created.
    pub creates: u64,
    /// Read queries executed.
    pub reads: u64,
    /// Entities updated.
    pub updates: u64,
    /// Entities deleted.
    pub deletes: u64,
    /// Labels removed via label delete.
    pub label_deletes: u64,
    /// Change events appended.
    pub events: u64,
    /// Store-level errors.
    pub errors: u64,
}
