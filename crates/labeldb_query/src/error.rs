//! Error types for query parsing.

use thiserror::Error;

/// Result type for query operations.
pub type QueryResult<T> = Result<T, QueryError>;

/// Errors that can occur while translating a label selector.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueryError {
    /// The selector string could not be parsed.
    #[error("invalid query: {message}")]
    Parse {
        /// Description of the parse failure.
        message: String,
    },
}

impl QueryError {
    /// Creates a parse error.
    pub fn parse(message: impl Into<String>) -> Self {
        Self::Parse {
            message: message.into(),
        }
    }
}
