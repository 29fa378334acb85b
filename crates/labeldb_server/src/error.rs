//! API error mapping.

use crate::response::{ErrorBody, WriteResult};
use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use labeldb_core::StoreError;
use labeldb_query::QueryError;
use thiserror::Error;

/// Errors surfaced by the HTTP layer.
///
/// Each error carries a stable wire `Type` string and an HTTP status.
/// Write routes embed the error in their `WriteResult`; read routes and
/// extractors render the error body directly.
#[derive(Debug, Clone, Error)]
pub enum ApiError {
    /// A store operation failed.
    #[error("{0}")]
    Store(#[from] StoreError),

    /// The label selector failed to parse or was missing.
    #[error("invalid query: {message}")]
    InvalidQuery {
        /// Description of the problem.
        message: String,
    },

    /// A required path or query parameter is missing.
    #[error("{message}")]
    MissingParam {
        /// Description of the problem.
        message: String,
    },

    /// A path or query parameter is malformed.
    #[error("{message}")]
    InvalidParam {
        /// Description of the problem.
        message: String,
    },

    /// The change-feed endpoint was hit while CDC is not configured.
    #[error("CDC feed not enabled")]
    CdcDisabled,
}

impl ApiError {
    /// Creates an invalid-query error.
    pub fn invalid_query(message: impl Into<String>) -> Self {
        Self::InvalidQuery {
            message: message.into(),
        }
    }

    /// Creates a missing-param error.
    pub fn missing_param(message: impl Into<String>) -> Self {
        Self::MissingParam {
            message: message.into(),
        }
    }

    /// Creates an invalid-param error.
    pub fn invalid_param(message: impl Into<String>) -> Self {
        Self::InvalidParam {
            message: message.into(),
        }
    }

    /// Returns the stable wire kind.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Store(err) => err.kind(),
            Self::InvalidQuery { .. } => "invalid-query",
            Self::MissingParam { .. } => "missing-param",
            Self::InvalidParam { .. } => "invalid-param",
            Self::CdcDisabled => "cdc-disabled",
        }
    }

    /// Returns the HTTP status for this error's kind.
    #[must_use]
    pub fn http_status(&self) -> StatusCode {
        status_for_kind(self.kind())
    }

    /// Renders the wire error body.
    #[must_use]
    pub fn body(&self) -> ErrorBody {
        ErrorBody {
            message: self.to_string(),
            kind: self.kind().to_string(),
            http_status: self.http_status().as_u16(),
            entity_id: match self {
                Self::Store(err) => err.entity_id().map(|id| id.to_hex()),
                _ => None,
            },
        }
    }
}

impl From<QueryError> for ApiError {
    fn from(err: QueryError) -> Self {
        Self::InvalidQuery {
            message: err.to_string(),
        }
    }
}

/// Maps a wire error kind to its HTTP status.
pub(crate) fn status_for_kind(kind: &str) -> StatusCode {
    match kind {
        "invalid-query" | "invalid-param" | "missing-param" | "invalid-entity-type"
        | "invalid-label" | "validation-error" => StatusCode::BAD_REQUEST,
        "duplicate-entity" => StatusCode::CONFLICT,
        "not-found" => StatusCode::NOT_FOUND,
        "cdc-disabled" => StatusCode::NOT_IMPLEMENTED,
        // Bulk creates report partial success with 200 and an error body.
        "create-partial" => StatusCode::OK,
        "db-error" => StatusCode::INTERNAL_SERVER_ERROR,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        self.http_status()
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(self.body())
    }
}

/// Renders a write-route error as a `WriteResult` envelope.
#[must_use]
pub(crate) fn write_result_error(err: &ApiError) -> WriteResult {
    WriteResult {
        writes: Vec::new(),
        error: Some(err.body()),
    }
}
