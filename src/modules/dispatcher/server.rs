//! HTTP listener for the proxy.

use super::config::DispatcherConfig;
use super::error::{DispatchError, DispatchResult};
use super::handler::Dispatcher;
use super::middleware::{
    AccessLogMiddleware, HeartbeatMiddleware, MiddlewareAction, MiddlewareChain, RequestIdMiddleware,
    RequestInfo,
};
use super::response::{ProblemDocument, ProxyBody};
use crate::shutdown::Shutdown;
use futures_util::FutureExt;
use http::header::HeaderName;
use http::{Request, Response, StatusCode};
use http_body_util::BodyExt;
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use hyper_util::server::graceful::GracefulShutdown;
use std::any::Any;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::TcpListener;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

/// Middleware chain plus dispatcher: the full handling of one request.
#[derive(Debug)]
pub struct ProxyService {
    chain: MiddlewareChain,
    dispatcher: Dispatcher,
}

impl ProxyService {
    /// Combine a middleware chain with a dispatcher.
    #[must_use]
    pub fn new(chain: MiddlewareChain, dispatcher: Dispatcher) -> Self {
        Self { chain, dispatcher }
    }

    /// Build the standard chain (heartbeat, request id, access log) from config.
    ///
    /// # Errors
    ///
    /// Returns an error if a configured header name is invalid.
    pub fn from_config(config: &DispatcherConfig, dispatcher: Dispatcher) -> DispatchResult<Self> {
        let request_id = HeaderName::from_bytes(config.request_id_header.as_bytes())
            .map_err(|_| DispatchError::InvalidHeaderName(config.request_id_header.clone()))?;

        let mut chain = MiddlewareChain::new()
            .with(Arc::new(HeartbeatMiddleware::new(config.heartbeat_path.clone())))
            .with(Arc::new(RequestIdMiddleware::with_header_name(request_id)));
        if config.access_log {
            chain.add(Arc::new(AccessLogMiddleware::new()));
        }

        Ok(Self::new(chain, dispatcher))
    }

    /// Get the dispatcher.
    #[must_use]
    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// Handle one request end to end.
    ///
    /// A panic anywhere in the chain or dispatcher becomes a 500 problem
    /// response; the connection stays usable.
    pub async fn handle(
        &self,
        request: Request<ProxyBody>,
        remote: Option<SocketAddr>,
    ) -> Response<ProxyBody> {
        let method = request.method().clone();
        let path = request.uri().path().to_owned();

        match AssertUnwindSafe(self.run_chain(request, remote))
            .catch_unwind()
            .await
        {
            Ok(response) => response,
            Err(panic) => {
                error!(
                    method = %method,
                    path = %path,
                    panic = panic_message(panic.as_ref()),
                    "Request handler panicked"
                );
                ProblemDocument::new(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Server error",
                    "Internal server error",
                )
                .into_response()
            },
        }
    }

    async fn run_chain(
        &self,
        mut request: Request<ProxyBody>,
        remote: Option<SocketAddr>,
    ) -> Response<ProxyBody> {
        let started = Instant::now();
        let (action, entered) = self.chain.process_request(&mut request);
        let info = RequestInfo::capture(&request, remote, started);

        let mut response = match action {
            MiddlewareAction::Respond(response) => response,
            MiddlewareAction::Continue => self.dispatcher.dispatch(request, remote).await,
        };

        self.chain.process_response(entered, &info, &mut response);
        response
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(message) = panic.downcast_ref::<&'static str>() {
        *message
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.as_str()
    } else {
        "non-string panic payload"
    }
}

/// Bound proxy listener.
#[derive(Debug)]
pub struct ProxyServer {
    listener: TcpListener,
    service: Arc<ProxyService>,
    shutdown_timeout: Duration,
}

impl ProxyServer {
    /// Bind the configured listen address.
    ///
    /// # Errors
    ///
    /// Returns an error if the address cannot be bound.
    pub async fn bind(config: &DispatcherConfig, service: ProxyService) -> DispatchResult<Self> {
        let listener = TcpListener::bind(config.listen).await?;
        info!(addr = %listener.local_addr()?, "Proxy listening");

        Ok(Self {
            listener,
            service: Arc::new(service),
            shutdown_timeout: config.shutdown_timeout,
        })
    }

    /// Address actually bound.
    ///
    /// # Errors
    ///
    /// Returns an error if the socket is gone.
    pub fn local_addr(&self) -> DispatchResult<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Serve connections until `shutdown` fires, then drain.
    ///
    /// In-flight requests get up to the configured shutdown timeout to
    /// complete; connections still open after that are aborted, which
    /// cancels their forwards and releases backend connection counts.
    pub async fn serve(self, mut shutdown: Shutdown) {
        let graceful = GracefulShutdown::new();
        let mut connections = JoinSet::new();

        loop {
            tokio::select! {
                Some(_) = connections.join_next(), if !connections.is_empty() => {},
                accepted = self.listener.accept() => {
                    let (stream, remote) = match accepted {
                        Ok(conn) => conn,
                        Err(e) => {
                            error!(error = %e, "Failed to accept connection");
                            continue;
                        },
                    };

                    let service = Arc::clone(&self.service);
                    let svc = service_fn(move |req: Request<Incoming>| {
                        let service = Arc::clone(&service);
                        async move {
                            let req = req.map(|body| body.boxed_unsync());
                            Ok::<_, Infallible>(service.handle(req, Some(remote)).await)
                        }
                    });

                    let conn = http1::Builder::new()
                        .keep_alive(true)
                        .serve_connection(TokioIo::new(stream), svc);
                    let conn = graceful.watch(conn);

                    connections.spawn(async move {
                        if let Err(e) = conn.await {
                            debug!(remote = %remote, error = %e, "Connection closed with error");
                        }
                    });
                },
                () = shutdown.wait() => {
                    info!("Proxy shutting down, draining connections");
                    break;
                },
            }
        }

        drop(self.listener);

        tokio::select! {
            () = graceful.shutdown() => info!("All connections drained"),
            () = tokio::time::sleep(self.shutdown_timeout) => {
                warn!(
                    timeout = ?self.shutdown_timeout,
                    remaining = connections.len(),
                    "Shutdown timeout elapsed, aborting remaining connections"
                );
            },
        }

        connections.abort_all();
        while connections.join_next().await.is_some() {}
    }
}
