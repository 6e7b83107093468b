//! Upstream backends and their in-flight accounting.

use super::error::{LoadBalancerError, LoadBalancerResult};
use http::uri::{Authority, Scheme};
use http::Uri;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;

/// Statistics for a single backend.
#[derive(Debug, Default)]
pub struct BackendStats {
    /// Requests currently being forwarded to this backend.
    pub active_connections: AtomicI64,
    /// Requests ever forwarded.
    pub total_requests: AtomicU64,
    /// Forwarding attempts that failed at the transport level.
    pub failed_requests: AtomicU64,
}

impl BackendStats {
    /// Create new stats.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a forwarding failure.
    pub fn record_failure(&self) {
        self.failed_requests.fetch_add(1, Ordering::Relaxed);
    }

    /// Get current active connection count.
    #[must_use]
    pub fn active_connection_count(&self) -> i64 {
        self.active_connections.load(Ordering::Acquire)
    }

    /// Get total request count.
    #[must_use]
    pub fn total_request_count(&self) -> u64 {
        self.total_requests.load(Ordering::Relaxed)
    }

    /// Get failed request count.
    #[must_use]
    pub fn failed_request_count(&self) -> u64 {
        self.failed_requests.load(Ordering::Relaxed)
    }
}

/// A single upstream server.
///
/// The health flag is written only by the health monitor and read by the
/// strategies. The connection counter moves only through [`ConnectionGuard`].
#[derive(Debug)]
pub struct Backend {
    /// Upstream base URI (scheme, authority, optional base path).
    uri: Uri,
    /// Scheme of `uri`.
    scheme: Scheme,
    /// Authority of `uri`.
    authority: Authority,
    /// Current eligibility for selection.
    healthy: AtomicBool,
    /// Statistics.
    stats: BackendStats,
}

impl Backend {
    /// Create a backend from an already validated URI.
    ///
    /// # Errors
    ///
    /// Returns [`LoadBalancerError::InvalidAddress`] if the URI is not an
    /// absolute `http` URI.
    pub fn new(uri: Uri) -> LoadBalancerResult<Self> {
        let address = uri.to_string();
        Self::from_uri(uri, &address)
    }

    /// Validate `uri`, reporting failures against `address` as configured.
    fn from_uri(uri: Uri, address: &str) -> LoadBalancerResult<Self> {
        let invalid = |reason: &str| LoadBalancerError::InvalidAddress {
            address: address.to_string(),
            reason: reason.to_string(),
        };

        let scheme = uri.scheme().cloned().ok_or_else(|| invalid("missing scheme"))?;
        if scheme != Scheme::HTTP {
            return Err(invalid("only http upstreams are supported"));
        }
        let authority = uri.authority().cloned().ok_or_else(|| invalid("missing host"))?;
        if uri.query().is_some() {
            return Err(invalid("query strings are not allowed"));
        }

        Ok(Self {
            scheme,
            authority,
            uri,
            healthy: AtomicBool::new(true),
            stats: BackendStats::new(),
        })
    }

    /// Parse a backend from its configured address.
    ///
    /// # Errors
    ///
    /// Returns [`LoadBalancerError::InvalidAddress`] if the address does not
    /// parse or is not an absolute `http` URI.
    pub fn parse(address: &str) -> LoadBalancerResult<Self> {
        let uri = address
            .parse::<Uri>()
            .map_err(|e| LoadBalancerError::InvalidAddress {
                address: address.to_string(),
                reason: e.to_string(),
            })?;
        Self::from_uri(uri, address)
    }

    /// Get the backend base URI.
    #[must_use]
    pub fn uri(&self) -> &Uri {
        &self.uri
    }

    /// Get the backend scheme.
    #[must_use]
    pub fn scheme(&self) -> &Scheme {
        &self.scheme
    }

    /// Get the backend authority (`host[:port]`).
    #[must_use]
    pub fn authority(&self) -> &Authority {
        &self.authority
    }

    /// Base path prefix, without a trailing slash. Empty for root backends.
    #[must_use]
    pub fn base_path(&self) -> &str {
        self.uri.path().trim_end_matches('/')
    }

    /// Check whether the backend may receive traffic.
    #[must_use]
    pub fn is_healthy(&self) -> bool {
        self.healthy.load(Ordering::Acquire)
    }

    /// Set the health flag, returning the previous value.
    pub fn set_healthy(&self, healthy: bool) -> bool {
        self.healthy.swap(healthy, Ordering::AcqRel)
    }

    /// Number of requests currently in flight to this backend.
    #[must_use]
    pub fn connection_count(&self) -> i64 {
        self.stats.active_connection_count()
    }

    /// Get backend statistics.
    #[must_use]
    pub fn stats(&self) -> &BackendStats {
        &self.stats
    }

    /// Mark the start of a forwarded request.
    ///
    /// The returned guard decrements the in-flight count when dropped, so the
    /// count is released on success, error, and cancellation alike.
    #[must_use]
    pub fn acquire(self: &Arc<Self>) -> ConnectionGuard {
        self.stats.active_connections.fetch_add(1, Ordering::AcqRel);
        self.stats.total_requests.fetch_add(1, Ordering::Relaxed);
        ConnectionGuard {
            backend: Arc::clone(self),
        }
    }
}

impl std::fmt::Display for Backend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}://{}{}", self.scheme, self.authority, self.base_path())
    }
}

/// Scoped in-flight marker returned by [`Backend::acquire`].
#[derive(Debug)]
pub struct ConnectionGuard {
    backend: Arc<Backend>,
}

impl ConnectionGuard {
    /// Backend this guard is holding a connection slot on.
    #[must_use]
    pub fn backend(&self) -> &Arc<Backend> {
        &self.backend
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.backend
            .stats
            .active_connections
            .fetch_sub(1, Ordering::AcqRel);
    }
}
