//! Server configuration.

use std::net::SocketAddr;
use std::time::Duration;

/// Configuration for the API server.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind to.
    pub bind_addr: SocketAddr,
    /// Advertised base URL used in write-result URIs.
    pub addr: String,
    /// Entity types the store serves.
    pub entity_types: Vec<String>,
    /// Whether the change-feed endpoint is enabled.
    pub cdc_enabled: bool,
    /// Per-subscriber buffer of the CDC feed.
    pub feed_buffer: usize,
    /// Per-client delivery buffer of the change streamer.
    pub client_buffer: usize,
    /// Deadline for a single websocket write.
    pub write_timeout: Duration,
    /// Compatibility version assumed when the version header is absent.
    pub default_client_version: Option<String>,
}

impl ServerConfig {
    /// Creates a configuration binding to the given address.
    #[must_use]
    pub fn new(bind_addr: SocketAddr) -> Self {
        Self {
            bind_addr,
            addr: format!("http://{bind_addr}"),
            entity_types: Vec::new(),
            cdc_enabled: true,
            feed_buffer: 1024,
            client_buffer: 256,
            write_timeout: Duration::from_secs(5),
            default_client_version: None,
        }
    }

    /// Sets the advertised base URL.
    #[must_use]
    pub fn with_addr(mut self, addr: impl Into<String>) -> Self {
        self.addr = addr.into();
        self
    }

    /// Sets the entity types the store serves.
    #[must_use]
    pub fn with_entity_types<I, S>(mut self, entity_types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.entity_types = entity_types.into_iter().map(Into::into).collect();
        self
    }

    /// Enables or disables the change-feed endpoint.
    #[must_use]
    pub fn with_cdc(mut self, enabled: bool) -> Self {
        self.cdc_enabled = enabled;
        self
    }

    /// Sets the CDC feed's per-subscriber buffer.
    #[must_use]
    pub fn with_feed_buffer(mut self, buffer: usize) -> Self {
        self.feed_buffer = buffer;
        self
    }

    /// Sets the websocket write deadline.
    #[must_use]
    pub fn with_write_timeout(mut self, timeout: Duration) -> Self {
        self.write_timeout = timeout;
        self
    }

    /// Sets the default client compatibility version.
    #[must_use]
    pub fn with_default_client_version(mut self, version: impl Into<String>) -> Self {
        self.default_client_version = Some(version.into());
        self
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::new(SocketAddr::from(([127, 0, 0, 1], 8080)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = ServerConfig::default();
        assert_eq!(config.bind_addr.port(), 8080);
        assert!(config.cdc_enabled);
        assert_eq!(config.addr, "http://127.0.0.1:8080");
        assert!(config.entity_types.is_empty());
    }

    #[test]
    fn config_builder() {
        let config = ServerConfig::new("0.0.0.0:9000".parse().unwrap())
            .with_addr("https://labeldb.internal")
            .with_entity_types(["nodes", "hosts"])
            .with_cdc(false)
            .with_feed_buffer(64)
            .with_write_timeout(Duration::from_secs(2))
            .with_default_client_version("0.8");

        assert_eq!(config.addr, "https://labeldb.internal");
        assert_eq!(config.entity_types, ["nodes", "hosts"]);
        assert!(!config.cdc_enabled);
        assert_eq!(config.feed_buffer, 64);
        assert_eq!(config.write_timeout, Duration::from_secs(2));
        assert_eq!(config.default_client_version.as_deref(), Some("0.8"));
    }
}
