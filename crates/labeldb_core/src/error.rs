//! Error types for the entity store.

use crate::engine::EngineError;
use crate::entity::EntityId;
use thiserror::Error;

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors that can occur in entity store operations.
///
/// Every variant maps to a stable wire error kind via [`StoreError::kind`];
/// the HTTP layer derives status codes from that kind.
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    /// The entity type is reserved, unknown, or malformed.
    #[error("{message}")]
    InvalidEntityType {
        /// Description of the problem.
        message: String,
    },

    /// A label is reserved or fails the label-name rules.
    #[error("invalid label: {message}")]
    InvalidLabel {
        /// Description of the problem.
        message: String,
    },

    /// The write payload failed entity validation.
    #[error("validation error: {message}")]
    Validation {
        /// Description of the problem.
        message: String,
    },

    /// A unique constraint was violated on insert.
    #[error("duplicate entity {entity_id}")]
    DuplicateEntity {
        /// The conflicting entity id.
        entity_id: EntityId,
    },

    /// The underlying document engine failed.
    #[error("database error: {message}")]
    Db {
        /// Engine failure description.
        message: String,
    },

    /// A single-entity operation targeted a missing id.
    #[error("entity not found")]
    NotFound,

    /// A bulk create stopped partway through.
    ///
    /// The successfully inserted ids are returned alongside this error by
    /// [`crate::BulkWrite`]; the error records how far the batch got.
    #[error("created {inserted} of {attempted} entities: {source}")]
    CreatePartial {
        /// Number of entities inserted before the failure.
        inserted: usize,
        /// Number of entities in the batch.
        attempted: usize,
        /// The insertion failure that stopped the batch.
        #[source]
        source: Box<StoreError>,
    },
}

impl StoreError {
    /// Creates an invalid-entity-type error for an unknown or reserved type.
    pub fn invalid_entity_type(entity_type: impl AsRef<str>) -> Self {
        Self::InvalidEntityType {
            message: format!("Invalid entityType name: {}", entity_type.as_ref()),
        }
    }

    /// Creates an invalid-entity-type error for a reserved word used at
    /// store construction.
    pub fn reserved_entity_type(entity_type: impl AsRef<str>) -> Self {
        Self::InvalidEntityType {
            message: format!(
                "Entity type ({}) cannot be a reserved word",
                entity_type.as_ref()
            ),
        }
    }

    /// Creates an invalid-label error.
    pub fn invalid_label(message: impl Into<String>) -> Self {
        Self::InvalidLabel {
            message: message.into(),
        }
    }

    /// Creates a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Creates a database error.
    pub fn db(message: impl Into<String>) -> Self {
        Self::Db {
            message: message.into(),
        }
    }

    /// Creates a create-partial error wrapping the terminating failure.
    pub fn create_partial(inserted: usize, attempted: usize, source: StoreError) -> Self {
        Self::CreatePartial {
            inserted,
            attempted,
            source: Box::new(source),
        }
    }

    /// Returns the stable wire kind for this error.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidEntityType { .. } => "invalid-entity-type",
            Self::InvalidLabel { .. } => "invalid-label",
            Self::Validation { .. } => "validation-error",
            Self::DuplicateEntity { .. } => "duplicate-entity",
            Self::Db { .. } => "db-error",
            Self::NotFound => "not-found",
            Self::CreatePartial { .. } => "create-partial",
        }
    }

    /// Returns the entity id this error is about, if any.
    pub fn entity_id(&self) -> Option<EntityId> {
        match self {
            Self::DuplicateEntity { entity_id } => Some(*entity_id),
            Self::CreatePartial { source, .. } => source.entity_id(),
            _ => None,
        }
    }
}

impl From<EngineError> for StoreError {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::DuplicateId { id } => Self::DuplicateEntity { entity_id: id },
            EngineError::Backend { message } => Self::Db { message },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_are_stable() {
        assert_eq!(
            StoreError::invalid_entity_type("entities").kind(),
            "invalid-entity-type"
        );
        assert_eq!(StoreError::invalid_label("x").kind(), "invalid-label");
        assert_eq!(StoreError::validation("x").kind(), "validation-error");
        assert_eq!(StoreError::db("x").kind(), "db-error");
        assert_eq!(StoreError::NotFound.kind(), "not-found");
        assert_eq!(
            StoreError::create_partial(1, 3, StoreError::db("boom")).kind(),
            "create-partial"
        );
    }

    #[test]
    fn invalid_entity_type_message() {
        let err = StoreError::invalid_entity_type("entities");
        assert!(err.to_string().contains("Invalid entityType name"));

        let err = StoreError::reserved_entity_type("entities");
        assert!(err.to_string().contains("cannot be a reserved word"));
    }

    #[test]
    fn create_partial_reports_progress() {
        let err = StoreError::create_partial(2, 5, StoreError::db("disk on fire"));
        let text = err.to_string();
        assert!(text.contains("2 of 5"), "got: {text}");
    }

    #[test]
    fn engine_errors_convert() {
        let id = EntityId::new();
        let err: StoreError = EngineError::DuplicateId { id }.into();
        assert_eq!(err.kind(), "duplicate-entity");
        assert_eq!(err.entity_id(), Some(id));

        let err: StoreError = EngineError::backend("io").into();
        assert_eq!(err.kind(), "db-error");
    }
}
