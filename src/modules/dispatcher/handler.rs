//! Per-request pipeline: identify, limit, select, forward.

use super::client::ClientExtractor;
use super::config::DispatcherConfig;
use super::error::{DispatchError, DispatchResult};
use super::forward::Forwarder;
use super::response::{ProblemDocument, ProxyBody};
use crate::modules::load_balancer::LoadBalancer;
use crate::modules::rate_limiting::RateLimiter;
use http::{Request, Response};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{debug, warn};

/// Routes admitted requests to a backend.
///
/// Each request is identified, checked against the client's budget, assigned
/// a backend and forwarded, in that order. The first failing stage decides
/// the error response.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    extractor: ClientExtractor,
    limiter: Arc<dyn RateLimiter>,
    balancer: Arc<LoadBalancer>,
    forwarder: Forwarder,
}

impl Dispatcher {
    /// Create a dispatcher.
    ///
    /// # Errors
    ///
    /// Returns an error if the configured client header is not a valid name.
    pub fn new(
        config: &DispatcherConfig,
        limiter: Arc<dyn RateLimiter>,
        balancer: Arc<LoadBalancer>,
    ) -> DispatchResult<Self> {
        Ok(Self {
            extractor: ClientExtractor::from_name(&config.client_header)?,
            limiter,
            balancer,
            forwarder: Forwarder::new(config.upstream_timeout),
        })
    }

    /// Get the rate limiter.
    #[must_use]
    pub fn limiter(&self) -> &Arc<dyn RateLimiter> {
        &self.limiter
    }

    /// Get the load balancer.
    #[must_use]
    pub fn balancer(&self) -> &Arc<LoadBalancer> {
        &self.balancer
    }

    /// Handle one request, rendering failures as problem responses.
    pub async fn dispatch(
        &self,
        request: Request<ProxyBody>,
        remote: Option<SocketAddr>,
    ) -> Response<ProxyBody> {
        match self.try_dispatch(request, remote).await {
            Ok(response) => response,
            Err(e) => {
                match &e {
                    DispatchError::RateLimited { client } => {
                        debug!(client = %client, "Request rate limited");
                    },
                    DispatchError::ClientUnidentified => {
                        warn!(remote = ?remote, "Unable to identify client");
                    },
                    _ => warn!(error = %e, "Request failed"),
                }
                ProblemDocument::from(&e).into_response()
            },
        }
    }

    /// Handle one request.
    ///
    /// # Errors
    ///
    /// Returns the first stage failure. Nothing is forwarded on error, and a
    /// rejected request never touches the balancer.
    pub async fn try_dispatch(
        &self,
        request: Request<ProxyBody>,
        remote: Option<SocketAddr>,
    ) -> DispatchResult<Response<ProxyBody>> {
        let client = self
            .extractor
            .extract(request.headers(), remote)
            .ok_or(DispatchError::ClientUnidentified)?;

        if !self.limiter.client_allowed(&client) {
            return Err(DispatchError::RateLimited { client });
        }

        let backend = self.balancer.next()?;
        debug!(client = %client, backend = %backend, "Backend selected");

        self.forwarder
            .forward(request, backend, remote.map(|addr| addr.ip()))
            .await
    }
}
