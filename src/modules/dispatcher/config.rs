//! Proxy server configuration.

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::time::Duration;

/// Listener and per-request settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatcherConfig {
    /// Address the proxy listens on.
    pub listen: SocketAddr,

    /// Request header carrying the client identity.
    pub client_header: String,

    /// Maximum wait for a backend's response headers.
    #[serde(with = "humantime_serde")]
    pub upstream_timeout: Duration,

    /// Maximum wait for in-flight requests on shutdown.
    #[serde(with = "humantime_serde")]
    pub shutdown_timeout: Duration,

    /// Path answered locally for liveness checks of the proxy itself.
    pub heartbeat_path: String,

    /// Header used to correlate requests.
    pub request_id_header: String,

    /// Log one line per completed request.
    pub access_log: bool,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            listen: SocketAddr::from(([0, 0, 0, 0], 8080)),
            client_header: "Rate-Limit-Key".to_string(),
            upstream_timeout: Duration::from_secs(30),
            shutdown_timeout: Duration::from_secs(10),
            heartbeat_path: "/health".to_string(),
            request_id_header: "x-request-id".to_string(),
            access_log: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = DispatcherConfig::default();
        assert_eq!(config.listen.port(), 8080);
        assert_eq!(config.client_header, "Rate-Limit-Key");
        assert_eq!(config.upstream_timeout, Duration::from_secs(30));
        assert_eq!(config.heartbeat_path, "/health");
        assert!(config.access_log);
    }

    #[test]
    fn test_partial_toml() {
        let config: DispatcherConfig = toml::from_str(
            r#"
            listen = "127.0.0.1:9000"
            upstream_timeout = "500ms"
            "#,
        )
        .unwrap();
        assert_eq!(config.listen, "127.0.0.1:9000".parse().unwrap());
        assert_eq!(config.upstream_timeout, Duration::from_millis(500));
        assert_eq!(config.shutdown_timeout, Duration::from_secs(10));
        assert_eq!(config.client_header, "Rate-Limit-Key");
    }
}
