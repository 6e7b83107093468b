//! Active health checks for backend servers.

use super::backend::Backend;
use super::config::HealthCheckConfig;
use crate::shutdown::Shutdown;
use bytes::Bytes;
use http::{Request, Uri};
use http_body_util::Empty;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tokio::time::{timeout, MissedTickBehavior};
use tracing::{debug, info, warn};

/// Health status of a backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthStatus {
    /// Backend is healthy.
    Healthy,
    /// Backend is unhealthy.
    Unhealthy,
}

/// Result of a health check.
#[derive(Debug)]
pub struct HealthCheckResult {
    /// Backend address.
    pub address: String,
    /// Health status.
    pub status: HealthStatus,
    /// Response time.
    pub response_time: Duration,
    /// Error message if unhealthy.
    pub error: Option<String>,
}

/// Health check executor.
#[derive(Debug, Clone)]
pub struct HealthCheck {
    /// Health check configuration.
    config: HealthCheckConfig,
    /// Client used for probes.
    client: Client<HttpConnector, Empty<Bytes>>,
}

impl HealthCheck {
    /// Create a new health checker.
    #[must_use]
    pub fn new(config: HealthCheckConfig) -> Self {
        let mut connector = HttpConnector::new();
        connector.set_connect_timeout(Some(config.timeout));

        Self {
            config,
            client: Client::builder(TokioExecutor::new()).build(connector),
        }
    }

    /// Get the check interval.
    #[must_use]
    pub fn interval(&self) -> Duration {
        self.config.interval
    }

    /// Get the check timeout.
    #[must_use]
    pub fn check_timeout(&self) -> Duration {
        self.config.timeout
    }

    /// URI probed for `backend`.
    ///
    /// # Errors
    ///
    /// Returns an error if the configured path does not form a valid URI.
    pub fn probe_uri(&self, backend: &Backend) -> Result<Uri, http::Error> {
        Uri::builder()
            .scheme(backend.scheme().clone())
            .authority(backend.authority().clone())
            .path_and_query(format!("{}{}", backend.base_path(), self.config.path))
            .build()
    }

    /// Perform a health check on a backend.
    pub async fn check(&self, backend: &Backend) -> HealthCheckResult {
        let address = backend.to_string();
        let start = Instant::now();
        let result = self.probe(backend).await;
        let response_time = start.elapsed();

        match result {
            Ok(()) => {
                debug!(
                    backend = %address,
                    response_time_ms = response_time.as_millis(),
                    "Health check passed"
                );
                HealthCheckResult {
                    address,
                    status: HealthStatus::Healthy,
                    response_time,
                    error: None,
                }
            },
            Err(e) => {
                debug!(
                    backend = %address,
                    error = %e,
                    "Health check failed"
                );
                HealthCheckResult {
                    address,
                    status: HealthStatus::Unhealthy,
                    response_time,
                    error: Some(e),
                }
            },
        }
    }

    /// Check a backend and store the outcome in its health flag.
    pub async fn check_and_update(&self, backend: &Backend) -> HealthCheckResult {
        let result = self.check(backend).await;
        let healthy = result.status == HealthStatus::Healthy;
        let was_healthy = backend.set_healthy(healthy);

        match (was_healthy, healthy) {
            (true, false) => warn!(
                backend = %result.address,
                error = result.error.as_deref().unwrap_or_default(),
                "Backend marked unhealthy"
            ),
            (false, true) => info!(backend = %result.address, "Backend recovered"),
            _ => {},
        }

        result
    }

    /// HTTP GET against the health path; any 2xx counts as healthy.
    async fn probe(&self, backend: &Backend) -> Result<(), String> {
        let uri = self
            .probe_uri(backend)
            .map_err(|e| format!("invalid health check uri: {e}"))?;
        let request = Request::get(uri)
            .header(http::header::USER_AGENT, concat!("throttled-lb/", env!("CARGO_PKG_VERSION")))
            .body(Empty::new())
            .map_err(|e| format!("failed to build request: {e}"))?;

        match timeout(self.config.timeout, self.client.request(request)).await {
            Ok(Ok(response)) if response.status().is_success() => Ok(()),
            Ok(Ok(response)) => Err(format!("unexpected status code: {}", response.status())),
            Ok(Err(e)) => Err(format!("request failed: {e}")),
            Err(_) => Err("health check timeout".to_string()),
        }
    }
}

/// Runs one independent probe loop per backend.
#[derive(Debug, Clone)]
pub struct HealthMonitor {
    /// Shared health checker.
    check: Arc<HealthCheck>,
}

impl HealthMonitor {
    /// Create a monitor from configuration.
    #[must_use]
    pub fn new(config: HealthCheckConfig) -> Self {
        Self {
            check: Arc::new(HealthCheck::new(config)),
        }
    }

    /// Spawn a probe loop for every backend. Each loop ends on `shutdown`.
    pub fn spawn(&self, backends: &[Arc<Backend>], shutdown: &Shutdown) -> Vec<JoinHandle<()>> {
        debug!(
            backends = backends.len(),
            interval_ms = self.check.interval().as_millis(),
            "Starting health monitor"
        );

        backends
            .iter()
            .map(|backend| {
                tokio::spawn(Self::run(
                    Arc::clone(&self.check),
                    Arc::clone(backend),
                    shutdown.clone(),
                ))
            })
            .collect()
    }

    async fn run(check: Arc<HealthCheck>, backend: Arc<Backend>, mut shutdown: Shutdown) {
        let mut ticker = tokio::time::interval(check.interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick fires immediately; backends start healthy.
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = shutdown.wait() => {
                    debug!(backend = %backend, "Health check loop shutting down");
                    break;
                }
                _ = ticker.tick() => {
                    check.check_and_update(&backend).await;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::spawn_status_upstream;
    use std::sync::atomic::{AtomicU16, Ordering};

    fn test_config() -> HealthCheckConfig {
        HealthCheckConfig {
            interval: Duration::from_millis(20),
            timeout: Duration::from_millis(500),
            path: "/health".to_string(),
        }
    }

    async fn wait_until(deadline: Duration, mut condition: impl FnMut() -> bool) -> bool {
        let start = Instant::now();
        while start.elapsed() < deadline {
            if condition() {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        condition()
    }

    #[test]
    fn test_health_check_creation() {
        let check = HealthCheck::new(test_config());
        assert_eq!(check.interval(), Duration::from_millis(20));
        assert_eq!(check.check_timeout(), Duration::from_millis(500));
    }

    #[test]
    fn test_probe_uri_includes_base_path() {
        let check = HealthCheck::new(test_config());
        let backend = Backend::parse("http://10.0.0.1:8080/api/").unwrap();
        assert_eq!(
            check.probe_uri(&backend).unwrap().to_string(),
            "http://10.0.0.1:8080/api/health"
        );
    }

    #[tokio::test]
    async fn test_check_healthy_backend() {
        let addr = spawn_status_upstream(Arc::new(AtomicU16::new(200))).await;
        let backend = Backend::parse(&format!("http://{addr}")).unwrap();
        let check = HealthCheck::new(test_config());

        let result = check.check(&backend).await;
        assert_eq!(result.status, HealthStatus::Healthy);
        assert!(result.error.is_none());
    }

    #[tokio::test]
    async fn test_check_error_status() {
        let addr = spawn_status_upstream(Arc::new(AtomicU16::new(503))).await;
        let backend = Backend::parse(&format!("http://{addr}")).unwrap();
        let check = HealthCheck::new(test_config());

        let result = check.check_and_update(&backend).await;
        assert_eq!(result.status, HealthStatus::Unhealthy);
        assert!(result.error.unwrap().contains("503"));
        assert!(!backend.is_healthy());
    }

    #[tokio::test]
    async fn test_check_unreachable() {
        // Nothing listens on the discard port on loopback.
        let backend = Backend::parse("http://127.0.0.1:9").unwrap();
        let check = HealthCheck::new(test_config());

        let result = check.check_and_update(&backend).await;
        assert_eq!(result.status, HealthStatus::Unhealthy);
        assert!(result.error.is_some());
        assert!(!backend.is_healthy());
    }

    #[tokio::test]
    async fn test_monitor_tracks_transitions() {
        let status = Arc::new(AtomicU16::new(500));
        let addr = spawn_status_upstream(Arc::clone(&status)).await;
        let backend = Arc::new(Backend::parse(&format!("http://{addr}")).unwrap());

        let (trigger, shutdown) = crate::shutdown::channel();
        let monitor = HealthMonitor::new(test_config());
        let handles = monitor.spawn(std::slice::from_ref(&backend), &shutdown);

        assert!(wait_until(Duration::from_secs(2), || !backend.is_healthy()).await);

        status.store(200, Ordering::SeqCst);
        assert!(wait_until(Duration::from_secs(2), || backend.is_healthy()).await);

        trigger.trigger();
        for handle in handles {
            tokio::time::timeout(Duration::from_secs(2), handle)
                .await
                .unwrap()
                .unwrap();
        }
    }
}
