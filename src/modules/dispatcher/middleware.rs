//! HTTP middleware pipeline around the dispatcher.

use super::response::{text_response, ProxyBody};
use http::header::{HeaderName, HeaderValue};
use http::{Method, Request, Response, StatusCode, Uri};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

/// Action to take after middleware processing.
#[derive(Debug)]
pub enum MiddlewareAction {
    /// Continue to next middleware/handler.
    Continue,
    /// Short-circuit with a response.
    Respond(Response<ProxyBody>),
}

/// Correlation id attached to a request as an extension.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestId(pub HeaderValue);

/// Request details kept for the response phase, after the request itself
/// has been handed to the dispatcher.
#[derive(Debug, Clone)]
pub struct RequestInfo {
    /// Request method.
    pub method: Method,
    /// Request URI as received.
    pub uri: Uri,
    /// Peer address.
    pub remote: Option<SocketAddr>,
    /// Correlation id, if one was assigned.
    pub request_id: Option<RequestId>,
    /// When the request was accepted.
    pub started: Instant,
}

impl RequestInfo {
    /// Capture `request` after the request phase.
    #[must_use]
    pub fn capture<B>(request: &Request<B>, remote: Option<SocketAddr>, started: Instant) -> Self {
        Self {
            method: request.method().clone(),
            uri: request.uri().clone(),
            remote,
            request_id: request.extensions().get::<RequestId>().cloned(),
            started,
        }
    }
}

/// Trait for HTTP middleware.
pub trait Middleware: Send + Sync {
    /// Middleware name.
    fn name(&self) -> &str;

    /// Process request before dispatch.
    fn before(&self, _request: &mut Request<ProxyBody>) -> MiddlewareAction {
        MiddlewareAction::Continue
    }

    /// Process response after dispatch.
    fn after(&self, _request: &RequestInfo, _response: &mut Response<ProxyBody>) {}

    /// Priority (higher = runs first in before, last in after).
    fn priority(&self) -> i32 {
        0
    }
}

/// How far a request got through the chain.
///
/// Only middleware whose `before` ran see the response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Entered(usize);

/// A chain of middleware.
#[derive(Default)]
pub struct MiddlewareChain {
    /// Middleware instances.
    middleware: Vec<Arc<dyn Middleware>>,
}

impl std::fmt::Debug for MiddlewareChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<&str> = self.middleware.iter().map(|m| m.name()).collect();
        f.debug_struct("MiddlewareChain")
            .field("middleware", &names)
            .finish()
    }
}

impl MiddlewareChain {
    /// Create a new empty middleware chain.
    #[must_use]
    pub fn new() -> Self {
        Self {
            middleware: Vec::new(),
        }
    }

    /// Add middleware to the chain.
    pub fn add(&mut self, middleware: Arc<dyn Middleware>) {
        self.middleware.push(middleware);
        self.middleware
            .sort_by_key(|m| std::cmp::Reverse(m.priority()));
    }

    /// Builder form of [`add`](Self::add).
    #[must_use]
    pub fn with(mut self, middleware: Arc<dyn Middleware>) -> Self {
        self.add(middleware);
        self
    }

    /// Process request through the middleware chain.
    pub fn process_request(&self, request: &mut Request<ProxyBody>) -> (MiddlewareAction, Entered) {
        for (index, mw) in self.middleware.iter().enumerate() {
            if let action @ MiddlewareAction::Respond(_) = mw.before(request) {
                debug!(middleware = mw.name(), "Request answered by middleware");
                return (action, Entered(index + 1));
            }
        }
        (MiddlewareAction::Continue, Entered(self.middleware.len()))
    }

    /// Process response through the middleware chain (reverse order).
    pub fn process_response(
        &self,
        entered: Entered,
        request: &RequestInfo,
        response: &mut Response<ProxyBody>,
    ) {
        let depth = entered.0.min(self.middleware.len());
        for mw in self.middleware[..depth].iter().rev() {
            mw.after(request, response);
        }
    }

    /// Get the number of middleware in the chain.
    #[must_use]
    pub fn len(&self) -> usize {
        self.middleware.len()
    }

    /// Check if the chain is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.middleware.is_empty()
    }
}

// ============================================================================
// Built-in Middleware Implementations
// ============================================================================

/// Heartbeat middleware - answers liveness probes of the proxy itself.
#[derive(Debug)]
pub struct HeartbeatMiddleware {
    path: String,
}

impl HeartbeatMiddleware {
    /// Answer `GET`/`HEAD` requests for `path`, compared ignoring ASCII case.
    pub fn new(path: impl Into<String>) -> Self {
        Self { path: path.into() }
    }
}

impl Middleware for HeartbeatMiddleware {
    fn name(&self) -> &str {
        "heartbeat"
    }

    fn before(&self, request: &mut Request<ProxyBody>) -> MiddlewareAction {
        let probe = matches!(*request.method(), Method::GET | Method::HEAD);
        if probe && request.uri().path().eq_ignore_ascii_case(&self.path) {
            MiddlewareAction::Respond(text_response(StatusCode::OK, "."))
        } else {
            MiddlewareAction::Continue
        }
    }

    fn priority(&self) -> i32 {
        200
    }
}

/// Request ID middleware - adds X-Request-ID header.
#[derive(Debug)]
pub struct RequestIdMiddleware {
    /// Header name to use.
    header_name: HeaderName,
}

impl RequestIdMiddleware {
    /// Create a new request ID middleware.
    #[must_use]
    pub fn new() -> Self {
        Self {
            header_name: HeaderName::from_static("x-request-id"),
        }
    }

    /// Create with a custom header name.
    #[must_use]
    pub fn with_header_name(name: HeaderName) -> Self {
        Self { header_name: name }
    }

    /// Generate a unique request ID.
    fn generate_id() -> String {
        use std::time::{SystemTime, UNIX_EPOCH};
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_nanos();
        let random: u32 = rand::random();
        format!("{timestamp:x}-{random:08x}")
    }
}

impl Default for RequestIdMiddleware {
    fn default() -> Self {
        Self::new()
    }
}

impl Middleware for RequestIdMiddleware {
    fn name(&self) -> &str {
        "request-id"
    }

    fn before(&self, request: &mut Request<ProxyBody>) -> MiddlewareAction {
        let id = match request.headers().get(&self.header_name) {
            Some(existing) => existing.clone(),
            None => match HeaderValue::from_str(&Self::generate_id()) {
                Ok(id) => {
                    request
                        .headers_mut()
                        .insert(self.header_name.clone(), id.clone());
                    id
                },
                Err(_) => return MiddlewareAction::Continue,
            },
        };
        request.extensions_mut().insert(RequestId(id));
        MiddlewareAction::Continue
    }

    fn after(&self, request: &RequestInfo, response: &mut Response<ProxyBody>) {
        // Echo request ID in response
        if let Some(RequestId(id)) = &request.request_id {
            response
                .headers_mut()
                .insert(self.header_name.clone(), id.clone());
        }
    }

    fn priority(&self) -> i32 {
        100
    }
}

/// Access log middleware - one line per completed request.
#[derive(Debug, Default)]
pub struct AccessLogMiddleware;

impl AccessLogMiddleware {
    /// Create a new access log middleware.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Middleware for AccessLogMiddleware {
    fn name(&self) -> &str {
        "access-log"
    }

    fn after(&self, request: &RequestInfo, response: &mut Response<ProxyBody>) {
        let request_id = request
            .request_id
            .as_ref()
            .and_then(|RequestId(id)| id.to_str().ok())
            .unwrap_or("-");
        info!(
            method = %request.method,
            path = %request.uri.path(),
            status = response.status().as_u16(),
            latency_ms = request.started.elapsed().as_millis() as u64,
            remote = ?request.remote,
            request_id,
            "Request"
        );
    }

    fn priority(&self) -> i32 {
        98
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modules::dispatcher::response::empty;
    use std::sync::Mutex;

    fn request(method: Method, uri: &str) -> Request<ProxyBody> {
        Request::builder()
            .method(method)
            .uri(uri)
            .body(empty())
            .unwrap()
    }

    fn ok() -> Response<ProxyBody> {
        Response::new(empty())
    }

    /// Records the order hooks ran in.
    struct Probe {
        name: &'static str,
        priority: i32,
        respond: bool,
        log: Arc<Mutex<Vec<String>>>,
    }

    impl Middleware for Probe {
        fn name(&self) -> &str {
            self.name
        }

        fn before(&self, _request: &mut Request<ProxyBody>) -> MiddlewareAction {
            self.log.lock().unwrap().push(format!("before:{}", self.name));
            if self.respond {
                MiddlewareAction::Respond(ok())
            } else {
                MiddlewareAction::Continue
            }
        }

        fn after(&self, _request: &RequestInfo, _response: &mut Response<ProxyBody>) {
            self.log.lock().unwrap().push(format!("after:{}", self.name));
        }

        fn priority(&self) -> i32 {
            self.priority
        }
    }

    fn probe(
        name: &'static str,
        priority: i32,
        respond: bool,
        log: &Arc<Mutex<Vec<String>>>,
    ) -> Arc<dyn Middleware> {
        Arc::new(Probe {
            name,
            priority,
            respond,
            log: Arc::clone(log),
        })
    }

    fn run(chain: &MiddlewareChain, mut req: Request<ProxyBody>) -> Response<ProxyBody> {
        let (action, entered) = chain.process_request(&mut req);
        let info = RequestInfo::capture(&req, None, Instant::now());
        let mut response = match action {
            MiddlewareAction::Respond(response) => response,
            MiddlewareAction::Continue => ok(),
        };
        chain.process_response(entered, &info, &mut response);
        response
    }

    #[test]
    fn test_priority_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let chain = MiddlewareChain::new()
            .with(probe("low", 1, false, &log))
            .with(probe("high", 10, false, &log));

        run(&chain, request(Method::GET, "/"));

        assert_eq!(
            *log.lock().unwrap(),
            vec!["before:high", "before:low", "after:low", "after:high"]
        );
    }

    #[test]
    fn test_short_circuit_skips_inner() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let chain = MiddlewareChain::new()
            .with(probe("outer", 10, false, &log))
            .with(probe("stop", 5, true, &log))
            .with(probe("inner", 1, false, &log));

        run(&chain, request(Method::GET, "/"));

        assert_eq!(
            *log.lock().unwrap(),
            vec!["before:outer", "before:stop", "after:stop", "after:outer"]
        );
    }

    #[test]
    fn test_heartbeat() {
        let chain = MiddlewareChain::new().with(Arc::new(HeartbeatMiddleware::new("/health")));

        let mut req = request(Method::GET, "/health");
        assert!(matches!(
            chain.process_request(&mut req).0,
            MiddlewareAction::Respond(ref r) if r.status() == StatusCode::OK
        ));

        let mut req = request(Method::HEAD, "/health");
        assert!(matches!(
            chain.process_request(&mut req).0,
            MiddlewareAction::Respond(_)
        ));

        let mut req = request(Method::POST, "/health");
        assert!(matches!(
            chain.process_request(&mut req).0,
            MiddlewareAction::Continue
        ));

        let mut req = request(Method::GET, "/health/deep");
        assert!(matches!(
            chain.process_request(&mut req).0,
            MiddlewareAction::Continue
        ));
    }

    #[test]
    fn test_heartbeat_ignores_case() {
        let chain = MiddlewareChain::new().with(Arc::new(HeartbeatMiddleware::new("/health")));

        for path in ["/HEALTH", "/Health", "/hEaLtH"] {
            let mut req = request(Method::GET, path);
            assert!(
                matches!(chain.process_request(&mut req).0, MiddlewareAction::Respond(_)),
                "{path} should be answered locally"
            );
        }

        let mut req = request(Method::GET, "/HEALTHZ");
        assert!(matches!(
            chain.process_request(&mut req).0,
            MiddlewareAction::Continue
        ));
    }

    #[test]
    fn test_request_id_generated_and_echoed() {
        let chain = MiddlewareChain::new().with(Arc::new(RequestIdMiddleware::new()));

        let mut req = request(Method::GET, "/");
        chain.process_request(&mut req);
        let generated = req.headers()["x-request-id"].clone();
        assert!(!generated.is_empty());
        assert_eq!(
            req.extensions().get::<RequestId>(),
            Some(&RequestId(generated.clone()))
        );

        let response = run(&chain, request(Method::GET, "/"));
        assert!(response.headers().contains_key("x-request-id"));
    }

    #[test]
    fn test_request_id_preserved() {
        let chain = MiddlewareChain::new().with(Arc::new(RequestIdMiddleware::new()));

        let mut req = request(Method::GET, "/");
        req.headers_mut()
            .insert("x-request-id", HeaderValue::from_static("abc-123"));

        let response = run(&chain, req);
        assert_eq!(response.headers()["x-request-id"], "abc-123");
    }

    #[test]
    fn test_request_ids_unique() {
        let a = RequestIdMiddleware::generate_id();
        let b = RequestIdMiddleware::generate_id();
        assert_ne!(a, b);
    }

    #[test]
    fn test_heartbeat_has_no_request_id() {
        let chain = MiddlewareChain::new()
            .with(Arc::new(RequestIdMiddleware::new()))
            .with(Arc::new(HeartbeatMiddleware::new("/health")))
            .with(Arc::new(AccessLogMiddleware::new()));

        let response = run(&chain, request(Method::GET, "/health"));
        assert_eq!(response.status(), StatusCode::OK);
        assert!(!response.headers().contains_key("x-request-id"));
    }

    #[test]
    fn test_chain_debug_lists_names() {
        let chain = MiddlewareChain::new()
            .with(Arc::new(AccessLogMiddleware::new()))
            .with(Arc::new(HeartbeatMiddleware::new("/health")));
        assert_eq!(chain.len(), 2);
        let debug = format!("{chain:?}");
        assert!(debug.contains("heartbeat"));
        assert!(debug.contains("access-log"));
    }
}
