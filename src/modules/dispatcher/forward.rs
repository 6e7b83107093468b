//! Upstream request forwarding.

use super::error::{DispatchError, DispatchResult};
use super::response::ProxyBody;
use crate::modules::load_balancer::Backend;
use http::header::{HeaderMap, HeaderName, HeaderValue, CONNECTION, HOST};
use http::{Request, Response, Uri, Version};
use http_body_util::BodyExt;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Forwarded-for header name.
pub const X_FORWARDED_FOR: HeaderName = HeaderName::from_static("x-forwarded-for");

/// Headers that apply to a single connection and are never forwarded.
const HOP_BY_HOP: [HeaderName; 8] = [
    CONNECTION,
    HeaderName::from_static("keep-alive"),
    HeaderName::from_static("proxy-connection"),
    http::header::PROXY_AUTHENTICATE,
    http::header::PROXY_AUTHORIZATION,
    http::header::TE,
    http::header::TRAILER,
    http::header::TRANSFER_ENCODING,
];

/// Remove hop-by-hop headers, including any named by `Connection`.
pub fn strip_hop_by_hop(headers: &mut HeaderMap) {
    let named: Vec<HeaderName> = headers
        .get_all(CONNECTION)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .filter_map(|name| HeaderName::from_bytes(name.trim().as_bytes()).ok())
        .collect();

    for name in named {
        headers.remove(name);
    }
    for name in &HOP_BY_HOP {
        headers.remove(name);
    }
    headers.remove(http::header::UPGRADE);
}

/// Append `client` to `X-Forwarded-For`, keeping any earlier hops.
pub fn append_forwarded_for(headers: &mut HeaderMap, client: IpAddr) {
    let value = {
        let prior: Vec<&str> = headers
            .get_all(&X_FORWARDED_FOR)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .collect();

        if prior.is_empty() {
            client.to_string()
        } else {
            format!("{}, {client}", prior.join(", "))
        }
    };

    if let Ok(value) = HeaderValue::from_str(&value) {
        headers.insert(X_FORWARDED_FOR, value);
    }
}

/// Relays requests to backends over a pooled HTTP/1.1 client.
#[derive(Debug, Clone)]
pub struct Forwarder {
    client: Client<HttpConnector, ProxyBody>,
    timeout: Duration,
}

impl Forwarder {
    /// Create a forwarder whose response wait is bounded by `timeout`.
    #[must_use]
    pub fn new(timeout: Duration) -> Self {
        let mut connector = HttpConnector::new();
        connector.set_connect_timeout(Some(timeout));
        connector.set_nodelay(true);

        let client = Client::builder(TokioExecutor::new()).build(connector);

        Self { client, timeout }
    }

    /// Response timeout.
    #[must_use]
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Rewrite `request` to target `backend`.
    ///
    /// # Errors
    ///
    /// Returns an error if the rewritten URI or Host header is invalid.
    pub fn rewrite(
        &self,
        mut request: Request<ProxyBody>,
        backend: &Backend,
        client_ip: Option<IpAddr>,
    ) -> DispatchResult<Request<ProxyBody>> {
        let path_and_query = request
            .uri()
            .path_and_query()
            .map_or("/", |pq| pq.as_str());
        let target = format!("{}{}", backend.base_path(), path_and_query);

        let uri = Uri::builder()
            .scheme(backend.scheme().clone())
            .authority(backend.authority().clone())
            .path_and_query(target)
            .build()
            .map_err(|e| DispatchError::InvalidUpstreamRequest(e.to_string()))?;
        let host = HeaderValue::from_str(backend.authority().as_str())
            .map_err(|e| DispatchError::InvalidUpstreamRequest(e.to_string()))?;

        *request.uri_mut() = uri;
        *request.version_mut() = Version::HTTP_11;

        let headers = request.headers_mut();
        strip_hop_by_hop(headers);
        headers.insert(HOST, host);
        if let Some(ip) = client_ip {
            append_forwarded_for(headers, ip);
        }

        Ok(request)
    }

    /// Forward `request` to `backend` and relay its response.
    ///
    /// The backend's in-flight count is held until the returned response
    /// body is dropped.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend is unreachable or too slow.
    pub async fn forward(
        &self,
        request: Request<ProxyBody>,
        backend: Arc<Backend>,
        client_ip: Option<IpAddr>,
    ) -> DispatchResult<Response<ProxyBody>> {
        let request = self.rewrite(request, &backend, client_ip)?;
        let guard = backend.acquire();

        debug!(backend = %backend, uri = %request.uri(), "Forwarding request");

        let result = tokio::time::timeout(self.timeout, self.client.request(request)).await;
        let response = match result {
            Ok(Ok(response)) => response,
            Ok(Err(e)) => {
                backend.stats().record_failure();
                return Err(DispatchError::UpstreamUnavailable {
                    backend: backend.to_string(),
                    reason: e.to_string(),
                });
            },
            Err(_) => {
                backend.stats().record_failure();
                return Err(DispatchError::UpstreamTimeout {
                    backend: backend.to_string(),
                });
            },
        };

        let (mut parts, body) = response.into_parts();
        strip_hop_by_hop(&mut parts.headers);

        let body = body
            .map_frame(move |frame| {
                let _held = &guard;
                frame
            })
            .boxed_unsync();

        Ok(Response::from_parts(parts, body))
    }
}
