//! Best-effort client record sink.

use super::error::RateLimitResult;
use std::future::Future;
use std::pin::Pin;
use tracing::trace;

/// A client seen by a limiter for the first time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientInfo {
    /// Client identifier (header value or remote address).
    pub identifier: String,
    /// Declared capacity override, if any.
    pub capacity: Option<u64>,
}

impl ClientInfo {
    /// Create a record without a capacity override.
    pub fn new(identifier: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
            capacity: None,
        }
    }

    /// Attach a capacity.
    #[must_use]
    pub fn with_capacity(mut self, capacity: u64) -> Self {
        self.capacity = Some(capacity);
        self
    }
}

/// Storage for client records.
///
/// Limiters never wait on this; failures are logged and dropped.
pub trait ClientRepository: Send + Sync + std::fmt::Debug {
    /// Store a client record.
    fn save_client<'a>(
        &'a self,
        client: &'a ClientInfo,
    ) -> Pin<Box<dyn Future<Output = RateLimitResult<()>> + Send + 'a>>;
}

/// Repository that stores nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopRepository;

impl ClientRepository for NoopRepository {
    fn save_client<'a>(
        &'a self,
        client: &'a ClientInfo,
    ) -> Pin<Box<dyn Future<Output = RateLimitResult<()>> + Send + 'a>> {
        Box::pin(async move {
            trace!(client = %client.identifier, "Client record discarded");
            Ok(())
        })
    }
}
