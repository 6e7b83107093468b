//! Minimal upstream for trying the balancer locally.
//!
//! ```text
//! cargo run --example dummy_backend -- --port 9001
//! cargo run --example dummy_backend -- --port 9002 --slow
//! ```

use anyhow::{Context, Result};
use bytes::Bytes;
use clap::Parser;
use http_body_util::Full;
use hyper::body::Incoming;
use hyper::header::{HeaderValue, CONTENT_TYPE};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing::{debug, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "dummy-backend", about = "Test upstream for throttled-lb")]
struct Cli {
    /// Port to listen on
    #[arg(long, short)]
    port: u16,

    /// Delay every response by 500ms
    #[arg(long)]
    slow: bool,
}

async fn handle(req: Request<Incoming>, port: u16, slow: bool) -> Response<Full<Bytes>> {
    debug!(method = %req.method(), path = %req.uri().path(), "Request");

    match (req.method(), req.uri().path()) {
        (&Method::GET | &Method::HEAD, "/health") => Response::new(Full::new(Bytes::from_static(b"."))),
        (&Method::GET, "/") => {
            if slow {
                tokio::time::sleep(Duration::from_millis(500)).await;
            }
            let body = serde_json::json!({
                "result": "handled request successfully",
                "port": port,
            });
            let mut response = Response::new(Full::new(Bytes::from(body.to_string())));
            response
                .headers_mut()
                .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
            response
        },
        _ => {
            let mut response = Response::new(Full::new(Bytes::from_static(b"not found")));
            *response.status_mut() = StatusCode::NOT_FOUND;
            response
        },
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let addr = SocketAddr::from(([127, 0, 0, 1], cli.port));
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {addr}"))?;
    info!(%addr, slow = cli.slow, "Dummy backend listening");

    let (port, slow) = (cli.port, cli.slow);
    loop {
        let (stream, _) = listener.accept().await?;
        tokio::spawn(async move {
            let service = service_fn(move |req| async move {
                Ok::<_, Infallible>(handle(req, port, slow).await)
            });
            if let Err(e) = http1::Builder::new()
                .serve_connection(TokioIo::new(stream), service)
                .await
            {
                debug!(error = %e, "Connection error");
            }
        });
    }
}
