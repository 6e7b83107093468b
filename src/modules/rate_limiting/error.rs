//! Error types for rate limiting.

use thiserror::Error;

/// Result type for rate limiting operations.
pub type RateLimitResult<T> = Result<T, RateLimitError>;

/// Limiter errors.
///
/// An admission decision itself never fails; these cover setup and the
/// best-effort client repository.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RateLimitError {
    /// Capacity, rate or refill interval is unusable.
    #[error("invalid rate limit configuration: {0}")]
    InvalidConfig(String),

    /// The client repository failed to store a record.
    #[error("client repository error: {0}")]
    Persistence(String),
}

impl RateLimitError {
    /// Check if the error indicates a configuration problem.
    #[must_use]
    pub fn is_config_error(&self) -> bool {
        matches!(self, Self::InvalidConfig(_))
    }
}
