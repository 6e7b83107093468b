//! # Rate Limiting Module
//!
//! Per-client admission control for the proxy.
//!
//! ## Features
//!
//! - **Token Bucket**: Burst up to capacity, refilled by a background tick
//! - **Leaky Bucket**: Continuous drain computed on access
//! - **Lazy buckets**: Created exactly once on a client's first request
//! - **Client records**: New clients are reported to a best-effort repository
//!
//! ## Usage
//!
//! ```ignore
//! use throttled_lb::modules::rate_limiting::{start_limiter, NoopRepository, RateLimitConfig};
//!
//! let handle = start_limiter(&RateLimitConfig::default(), Arc::new(NoopRepository), &shutdown)?;
//!
//! if handle.limiter.client_allowed("client-key") {
//!     // Forward request
//! } else {
//!     // Return 429 Too Many Requests
//! }
//! ```

mod bucket;
mod config;
mod error;
mod limiter;
mod persistence;

pub use bucket::{LeakyBucket, TokenBucket};
pub use config::{LimiterType, RateLimitConfig};
pub use error::{RateLimitError, RateLimitResult};
pub use limiter::{
    start_limiter, LeakyBucketLimiter, LimiterHandle, LimiterStats, RateLimiter,
    TokenBucketLimiter,
};
pub use persistence::{ClientInfo, ClientRepository, NoopRepository};
