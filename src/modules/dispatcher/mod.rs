//! # Dispatcher Module
//!
//! The HTTP face of the proxy: accepts requests, applies the middleware
//! chain, runs each request through identify → limit → select → forward,
//! and relays the backend response.
//!
//! ## Error Responses
//!
//! | Failure                    | Status |
//! |----------------------------|--------|
//! | client unidentified        | 500    |
//! | rate limited               | 429    |
//! | no (healthy) backend       | 503    |
//! | backend unreachable        | 502    |
//! | backend timed out          | 503    |
//!
//! Bodies are `application/problem+json` documents with `title`, `status`
//! and `detail` fields.

mod client;
mod config;
mod error;
mod forward;
mod handler;
mod middleware;
mod response;
mod server;

pub use client::ClientExtractor;
pub use config::DispatcherConfig;
pub use error::{DispatchError, DispatchResult};
pub use forward::{append_forwarded_for, strip_hop_by_hop, Forwarder, X_FORWARDED_FOR};
pub use handler::Dispatcher;
pub use middleware::{
    AccessLogMiddleware, Entered, HeartbeatMiddleware, Middleware, MiddlewareAction,
    MiddlewareChain, RequestId, RequestIdMiddleware, RequestInfo,
};
pub use response::{empty, full, text_response, ProblemDocument, ProxyBody, PROBLEM_JSON};
pub use server::{ProxyServer, ProxyService};
