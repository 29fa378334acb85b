//! API request counters.

use serde::Serialize;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};

/// Request-level counters, served by `GET /metrics` alongside the store's.
#[derive(Debug, Default)]
pub struct ApiMetrics {
    /// All queries against entity routes.
    queries: AtomicU64,
    /// Read requests.
    reads: AtomicU64,
    /// Write requests.
    writes: AtomicU64,
    /// Requests rejected for client errors.
    client_errors: AtomicU64,
    /// Requests failed on the server side.
    server_errors: AtomicU64,
    /// Currently connected change-feed clients.
    cdc_clients: AtomicI64,
}

impl ApiMetrics {
    /// Creates zeroed metrics.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a read request.
    pub fn record_read(&self) {
        self.queries.fetch_add(1, Ordering::Relaxed);
        self.reads.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a write request.
    pub fn record_write(&self) {
        self.queries.fetch_add(1, Ordering::Relaxed);
        self.writes.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a client-side failure (4xx).
    pub fn record_client_error(&self) {
        self.client_errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a server-side failure (5xx).
    pub fn record_server_error(&self) {
        self.server_errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Tracks a change-feed client connecting.
    pub fn cdc_client_connected(&self) {
        self.cdc_clients.fetch_add(1, Ordering::Relaxed);
    }

    /// Tracks a change-feed client disconnecting.
    pub fn cdc_client_disconnected(&self) {
        self.cdc_clients.fetch_sub(1, Ordering::Relaxed);
    }

    /// Takes a point-in-time snapshot.
    #[must_use]
    pub fn report(&self) -> MetricsReport {
        MetricsReport {
            queries: self.queries.load(Ordering::Relaxed),
            reads: self.reads.load(Ordering::Relaxed),
            writes: self.writes.load(Ordering::Relaxed),
            client_errors: self.client_errors.load(Ordering::Relaxed),
            server_errors: self.server_errors.load(Ordering::Relaxed),
            cdc_clients: self.cdc_clients.load(Ordering::Relaxed),
        }
    }
}

/// A point-in-time copy of [`ApiMetrics`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MetricsReport {
    /// All queries against entity routes.
    pub queries: u64,
    /// Read requests.
    pub reads: u64,
    /// Write requests.
    pub writes: u64,
    /// Requests rejected for client errors.
    pub client_errors: u64,
    /// Requests failed on the server side.
    pub server_errors: u64,
    /// Currently connected change-feed clients.
    pub cdc_clients: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_accumulate() {
        let metrics = ApiMetrics::new();
        metrics.record_read();
        metrics.record_write();
        metrics.record_write();
        metrics.cdc_client_connected();

        let report = metrics.report();
        assert_eq!(report.queries, 3);
        assert_eq!(report.reads, 1);
        assert_eq!(report.writes, 2);
        assert_eq!(report.cdc_clients, 1);

        metrics.cdc_client_disconnected();
        assert_eq!(metrics.report().cdc_clients, 0);
    }
}
