#![allow(dead_code)]
//! Shared integration-test support: in-process upstreams and a proxy client.

use bytes::Bytes;
use http_body_util::{BodyExt, Empty, Full};
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode};
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::{TokioExecutor, TokioIo};
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU16, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use throttled_lb::app::{App, RunningApp};
use throttled_lb::config::BalancerConfig;
use tokio::net::TcpListener;

/// An upstream that names itself in every response and counts hits.
pub struct Upstream {
    pub addr: SocketAddr,
    pub name: &'static str,
    pub hits: Arc<AtomicUsize>,
    pub health: Arc<AtomicU16>,
    pub hang: Arc<AtomicBool>,
}

impl Upstream {
    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }

    pub fn set_health(&self, status: u16) {
        self.health.store(status, Ordering::SeqCst);
    }

    /// Make non-health requests wait forever (health probes still answer).
    pub fn set_hanging(&self, hang: bool) {
        self.hang.store(hang, Ordering::SeqCst);
    }
}

/// Start an upstream answering `/health` with its health status and every
/// other path with `200 <name>`, or never when hanging.
pub async fn spawn_upstream(name: &'static str) -> Upstream {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let hits = Arc::new(AtomicUsize::new(0));
    let health = Arc::new(AtomicU16::new(200));
    let hang = Arc::new(AtomicBool::new(false));

    let (task_hits, task_health, task_hang) =
        (Arc::clone(&hits), Arc::clone(&health), Arc::clone(&hang));
    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            let (hits, health, hang) = (
                Arc::clone(&task_hits),
                Arc::clone(&task_health),
                Arc::clone(&task_hang),
            );
            tokio::spawn(async move {
                let service = service_fn(move |req: Request<Incoming>| {
                    let (hits, health, hang) =
                        (Arc::clone(&hits), Arc::clone(&health), Arc::clone(&hang));
                    async move {
                        let response = if req.uri().path() == "/health" {
                            let status = StatusCode::from_u16(health.load(Ordering::SeqCst))
                                .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
                            Response::builder()
                                .status(status)
                                .body(Full::new(Bytes::from_static(b"health")))
                                .unwrap()
                        } else {
                            hits.fetch_add(1, Ordering::SeqCst);
                            if hang.load(Ordering::SeqCst) {
                                std::future::pending::<()>().await;
                            }
                            Response::builder()
                                .header("x-upstream", name)
                                .body(Full::new(Bytes::from(name)))
                                .unwrap()
                        };
                        Ok::<_, Infallible>(response)
                    }
                });
                let _ = http1::Builder::new()
                    .serve_connection(TokioIo::new(stream), service)
                    .await;
            });
        }
    });

    Upstream {
        addr,
        name,
        hits,
        health,
        hang,
    }
}

/// Config listening on an ephemeral loopback port with fast health checks.
pub fn test_config(backends: &[&Upstream]) -> BalancerConfig {
    let mut config = BalancerConfig::default();
    config.server.listen = "127.0.0.1:0".parse().unwrap();
    config.server.upstream_timeout = Duration::from_secs(2);
    config.server.shutdown_timeout = Duration::from_secs(2);
    config.server.access_log = false;
    config.load_balancer.backends = backends.iter().map(|u| u.url()).collect();
    config.load_balancer.health_check.interval = Duration::from_millis(50);
    config.load_balancer.health_check.timeout = Duration::from_millis(500);
    config
}

pub async fn start(config: BalancerConfig) -> RunningApp {
    App::new(config).start().await.unwrap()
}

/// Minimal client for talking to the proxy.
#[derive(Clone)]
pub struct ProxyClient {
    client: Client<HttpConnector, Empty<Bytes>>,
    base: String,
}

pub struct Reply {
    pub status: StatusCode,
    pub headers: http::HeaderMap,
    pub body: String,
}

impl Reply {
    pub fn json(&self) -> serde_json::Value {
        serde_json::from_str(&self.body).unwrap()
    }

    pub fn upstream(&self) -> Option<&str> {
        self.headers.get("x-upstream").and_then(|v| v.to_str().ok())
    }
}

impl ProxyClient {
    pub fn new(addr: SocketAddr) -> Self {
        Self {
            client: Client::builder(TokioExecutor::new()).build(HttpConnector::new()),
            base: format!("http://{addr}"),
        }
    }

    pub async fn get(&self, path: &str, client_key: Option<&str>) -> Reply {
        let mut builder = Request::builder().uri(format!("{}{path}", self.base));
        if let Some(key) = client_key {
            builder = builder.header("Rate-Limit-Key", key);
        }
        let response = self
            .client
            .request(builder.body(Empty::new()).unwrap())
            .await
            .unwrap();

        let status = response.status();
        let headers = response.headers().clone();
        let body = response.into_body().collect().await.unwrap().to_bytes();
        Reply {
            status,
            headers,
            body: String::from_utf8(body.to_vec()).unwrap(),
        }
    }
}

/// Poll `condition` until it holds or `deadline` passes.
pub async fn wait_until(deadline: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let start = Instant::now();
    while start.elapsed() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}
