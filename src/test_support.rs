//! In-process upstream servers for unit tests.

use bytes::Bytes;
use http_body_util::Full;
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU16, Ordering};
use std::sync::Arc;
use tokio::net::TcpListener;

pub(crate) type Handler = Arc<dyn Fn(Request<Incoming>) -> Response<Full<Bytes>> + Send + Sync>;

/// Serve `handler` on an ephemeral loopback port.
pub(crate) async fn spawn_upstream(handler: Handler) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            let handler = Arc::clone(&handler);
            tokio::spawn(async move {
                let service = service_fn(move |req| {
                    let response = handler(req);
                    async move { Ok::<_, Infallible>(response) }
                });
                let _ = http1::Builder::new()
                    .serve_connection(TokioIo::new(stream), service)
                    .await;
            });
        }
    });

    addr
}

/// Upstream answering every request with the status currently in `status`.
pub(crate) async fn spawn_status_upstream(status: Arc<AtomicU16>) -> SocketAddr {
    spawn_upstream(Arc::new(move |_req| {
        let code = StatusCode::from_u16(status.load(Ordering::SeqCst))
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let mut response = Response::new(Full::new(Bytes::from_static(b"status")));
        *response.status_mut() = code;
        response
    }))
    .await
}

/// Upstream echoing the request line and selected headers in its body.
pub(crate) async fn spawn_echo_upstream(name: &'static str) -> SocketAddr {
    spawn_upstream(Arc::new(move |req| {
        let header = |key: &str| {
            req.headers()
                .get(key)
                .and_then(|v| v.to_str().ok())
                .unwrap_or("-")
                .to_string()
        };
        let body = format!(
            "{name} {} {} host={} xff={} conn={}",
            req.method(),
            req.uri(),
            header("host"),
            header("x-forwarded-for"),
            header("x-hop"),
        );
        Response::builder()
            .status(StatusCode::OK)
            .header("x-upstream", name)
            .body(Full::new(Bytes::from(body)))
            .unwrap()
    }))
    .await
}
