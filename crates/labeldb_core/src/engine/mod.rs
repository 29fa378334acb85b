//! Document engine abstraction.
//!
//! The entity store sits on top of a [`DocumentEngine`]: a type-scoped
//! document database offering per-document compare-and-swap on the revision
//! counter. The trait is the store's only contract with the backing
//! database; tests and the default binary use the in-memory implementation.

mod memory;

pub use memory::InMemoryEngine;

use crate::entity::{Entity, EntityId};
use labeldb_query::Query;
use thiserror::Error;

/// Result type for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

/// Errors surfaced by a document engine.
#[derive(Debug, Clone, Error)]
pub enum EngineError {
    /// An insert collided with an existing entity id.
    #[error("duplicate entity id {id}")]
    DuplicateId {
        /// The conflicting id.
        id: EntityId,
    },

    /// The backing database failed.
    #[error("engine failure: {message}")]
    Backend {
        /// Failure description.
        message: String,
    },
}

impl EngineError {
    /// Creates a backend failure.
    pub fn backend(message: impl Into<String>) -> Self {
        Self::Backend {
            message: message.into(),
        }
    }
}

/// Outcome of a per-document compare-and-swap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CasOutcome {
    /// The document matched the expected revision and was replaced.
    Applied,
    /// The document exists but its revision moved on.
    RevMismatch,
    /// The document no longer exists.
    Missing,
}

/// A type-scoped document database.
///
/// # Invariants
///
/// - One logical collection per entity type; collections never leak
///   entities across types.
/// - `replace_if_rev` is atomic with respect to concurrent calls for the
///   same document.
/// - `scan` evaluates the predicate tree under the semantics of the query
///   crate; result order is unspecified (implementations may return
///   insertion order).
pub trait DocumentEngine: Send + Sync {
    /// Inserts a fully-stamped entity.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::DuplicateId`] if the id already exists.
    fn insert(&self, entity_type: &str, entity: Entity) -> EngineResult<()>;

    /// Reads one entity by id.
    fn get(&self, entity_type: &str, id: &EntityId) -> EngineResult<Option<Entity>>;

    /// Returns all entities of the type matching the query.
    fn scan(&self, entity_type: &str, query: &Query) -> EngineResult<Vec<Entity>>;

    /// Replaces the document if its current `_rev` equals `expected_rev`.
    fn replace_if_rev(
        &self,
        entity_type: &str,
        id: &EntityId,
        expected_rev: u64,
        entity: Entity,
    ) -> EngineResult<CasOutcome>;

    /// Removes one entity by id, returning the pre-image.
    fn remove(&self, entity_type: &str, id: &EntityId) -> EngineResult<Option<Entity>>;
}
