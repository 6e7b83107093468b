//! Dispatch error types and their HTTP mapping.

use crate::modules::load_balancer::LoadBalancerError;
use http::StatusCode;
use thiserror::Error;

/// Errors produced while handling one proxied request.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// Neither the client header nor a remote address was available.
    #[error("unable to identify client")]
    ClientUnidentified,

    /// The client exhausted its request budget.
    #[error("rate limit exceeded for client '{client}'")]
    RateLimited {
        /// Client identifier that was rejected.
        client: String,
    },

    /// No backend could be selected.
    #[error("backend selection failed: {0}")]
    Selection(#[from] LoadBalancerError),

    /// The backend could not be reached or broke the exchange.
    #[error("upstream {backend} unavailable: {reason}")]
    UpstreamUnavailable {
        /// Backend address.
        backend: String,
        /// Transport error.
        reason: String,
    },

    /// The backend did not answer in time.
    #[error("upstream {backend} timed out")]
    UpstreamTimeout {
        /// Backend address.
        backend: String,
    },

    /// The inbound request could not be rewritten for the backend.
    #[error("invalid upstream request: {0}")]
    InvalidUpstreamRequest(String),

    /// The configured client header name is not a valid header name.
    #[error("invalid client header name '{0}'")]
    InvalidHeaderName(String),

    /// Listener IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl DispatchError {
    /// HTTP status returned to the caller.
    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self {
            Self::ClientUnidentified | Self::InvalidHeaderName(_) | Self::Io(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            },
            Self::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            Self::Selection(_) | Self::UpstreamTimeout { .. } => StatusCode::SERVICE_UNAVAILABLE,
            Self::UpstreamUnavailable { .. } | Self::InvalidUpstreamRequest(_) => {
                StatusCode::BAD_GATEWAY
            },
        }
    }

    /// Short problem title.
    #[must_use]
    pub fn title(&self) -> &'static str {
        match self {
            Self::RateLimited { .. } => "Rate limit exceeded",
            Self::UpstreamUnavailable { .. } | Self::InvalidUpstreamRequest(_) => "Bad gateway",
            _ => "Server error",
        }
    }

    /// Problem detail shown to the client. Never includes internal addresses.
    #[must_use]
    pub fn detail(&self) -> &'static str {
        match self {
            Self::ClientUnidentified => "Unable to identify client",
            Self::RateLimited { .. } => "Rate limit exceeded for this client, try again later",
            Self::Selection(_) => "Unable to find available backend",
            Self::UpstreamUnavailable { .. } => "Unable to reach backend",
            Self::UpstreamTimeout { .. } => "Backend did not respond in time",
            Self::InvalidUpstreamRequest(_) => "Unable to forward request to backend",
            Self::InvalidHeaderName(_) | Self::Io(_) => "Internal server error",
        }
    }
}

/// Result type for dispatch operations.
pub type DispatchResult<T> = Result<T, DispatchError>;
