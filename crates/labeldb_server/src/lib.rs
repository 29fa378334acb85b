//! # LabelDB Server
//!
//! The HTTP/JSON surface of LabelDB: REST routes over the entity store and
//! the websocket change-data-capture endpoint.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod context;
mod error;
mod handlers;
mod metrics;
mod response;
mod routes;

pub use config::ServerConfig;
pub use context::AppContext;
pub use error::ApiError;
pub use metrics::{ApiMetrics, MetricsReport};
pub use response::{ErrorBody, Write, WriteResult};
pub use routes::configure;

/// Root path of the versioned API.
pub const API_ROOT: &str = "/api/v1";

/// Server version, also reported by `GET /status`.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Request header selecting the response-shape compatibility version.
pub const VERSION_HEADER: &str = "X-Labeldb-Version";

/// Request header naming the caller, recorded in write ops.
pub const USER_HEADER: &str = "X-Labeldb-User";
