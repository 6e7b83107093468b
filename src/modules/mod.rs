//! Balancer modules.
//!
//! - [`load_balancer`]: backend registry, selection strategies, health checks
//! - [`rate_limiting`]: per-client token and leaky buckets
//! - [`dispatcher`]: HTTP server and the per-request pipeline

pub mod dispatcher;
pub mod load_balancer;
pub mod rate_limiting;
