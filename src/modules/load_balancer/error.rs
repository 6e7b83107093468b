//! Load balancer error types.

use thiserror::Error;

/// Errors that can occur in the load balancer module.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LoadBalancerError {
    /// The backend set is empty.
    #[error("no backends available")]
    NoBackends,

    /// Every backend in the set is currently unhealthy.
    #[error("no healthy backends available")]
    NoHealthyBackends,

    /// A configured backend address could not be used.
    #[error("invalid backend address '{address}': {reason}")]
    InvalidAddress {
        /// The address as configured.
        address: String,
        /// Why it was rejected.
        reason: String,
    },
}

/// Result type for load balancer operations.
pub type LoadBalancerResult<T> = Result<T, LoadBalancerError>;
