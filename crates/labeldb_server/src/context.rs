//! Shared application state.

use crate::config::ServerConfig;
use crate::error::ApiError;
use crate::metrics::ApiMetrics;
use labeldb_core::{CdcLog, EntityStore, InMemoryEngine, Validator};
use std::sync::Arc;

/// Everything the handlers need, shared across workers.
#[derive(Clone)]
pub struct AppContext {
    /// The entity store.
    pub store: Arc<EntityStore>,
    /// Server configuration.
    pub config: ServerConfig,
    /// API request counters.
    pub metrics: Arc<ApiMetrics>,
}

impl AppContext {
    /// Builds a context over an in-memory engine from the configuration.
    ///
    /// # Errors
    ///
    /// Fails if a configured entity type is reserved or malformed.
    pub fn from_config(config: ServerConfig) -> Result<Self, ApiError> {
        let validator = Validator::new(config.entity_types.iter().cloned())?;
        let cdc = Arc::new(CdcLog::with_buffer(config.feed_buffer));
        let store = Arc::new(EntityStore::new(
            Arc::new(InMemoryEngine::new()),
            validator,
            cdc,
        ));
        Ok(Self {
            store,
            config,
            metrics: Arc::new(ApiMetrics::new()),
        })
    }

    /// Builds a context around an existing store.
    #[must_use]
    pub fn with_store(store: Arc<EntityStore>, config: ServerConfig) -> Self {
        Self {
            store,
            config,
            metrics: Arc::new(ApiMetrics::new()),
        }
    }
}
