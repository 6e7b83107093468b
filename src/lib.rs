//! # throttled-lb
//!
//! A reverse-proxy load balancer that spreads HTTP requests across a pool of
//! backends and throttles each client with a token or leaky bucket.
//!
//! ## Features
//!
//! - Round-robin, least-connections and random backend selection
//! - Periodic health checks; unhealthy backends are skipped
//! - Per-client rate limiting keyed by header or remote address
//! - JSON problem documents for every rejected request
//! - Graceful drain on shutdown
//!
//! ## Architecture
//!
//! ```text
//! request ─▶ middleware ─▶ identify ─▶ limit ─▶ select ─▶ forward ─▶ backend
//!            (heartbeat,              (rate_   (load_
//!             request id,              limiting) balancer)
//!             access log)
//! ```
//!
//! [`app::App`] wires the pieces together from a
//! [`config::BalancerConfig`].

pub mod app;
pub mod config;
pub mod logging;
pub mod modules;
pub mod shutdown;

#[cfg(test)]
pub(crate) mod test_support;
