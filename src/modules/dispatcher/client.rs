//! Client identification.

use super::error::{DispatchError, DispatchResult};
use http::header::{HeaderMap, HeaderName};
use std::net::SocketAddr;

/// Derives the rate-limit key for a request.
///
/// A non-empty value of the configured header wins; otherwise the remote IP
/// address is used. Ports are ignored so that one host maps to one key.
#[derive(Debug, Clone)]
pub struct ClientExtractor {
    header: HeaderName,
}

impl ClientExtractor {
    /// Create an extractor reading `header`.
    #[must_use]
    pub fn new(header: HeaderName) -> Self {
        Self { header }
    }

    /// Create an extractor from a configured header name.
    ///
    /// # Errors
    ///
    /// Returns an error if `name` is not a valid header name.
    pub fn from_name(name: &str) -> DispatchResult<Self> {
        HeaderName::from_bytes(name.as_bytes())
            .map(Self::new)
            .map_err(|_| DispatchError::InvalidHeaderName(name.to_string()))
    }

    /// Header consulted first.
    #[must_use]
    pub fn header(&self) -> &HeaderName {
        &self.header
    }

    /// Extract the client identifier, if one is available.
    #[must_use]
    pub fn extract(&self, headers: &HeaderMap, remote: Option<SocketAddr>) -> Option<String> {
        let from_header = headers
            .get(&self.header)
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|value| !value.is_empty());

        match from_header {
            Some(value) => Some(value.to_string()),
            None => remote.map(|addr| addr.ip().to_string()),
        }
    }
}
