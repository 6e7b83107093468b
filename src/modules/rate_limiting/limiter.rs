//! Per-client rate limiters.

use super::bucket::{LeakyBucket, TokenBucket};
use super::config::{LimiterType, RateLimitConfig};
use super::error::RateLimitResult;
use super::persistence::{ClientInfo, ClientRepository};
use crate::shutdown::Shutdown;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, trace, warn};

/// Admission control keyed by client identifier.
pub trait RateLimiter: Send + Sync + std::fmt::Debug {
    /// Decide whether `client_id` may send one more request.
    ///
    /// `true` consumes one unit of the client's budget. Safe under arbitrary
    /// concurrent calls for the same and different clients.
    fn client_allowed(&self, client_id: &str) -> bool;

    /// Get the limiter name.
    fn name(&self) -> &'static str;

    /// Number of distinct clients with a bucket.
    fn client_count(&self) -> usize;

    /// Get limiter statistics.
    fn stats(&self) -> &LimiterStats;
}

/// Admission counters.
#[derive(Debug, Default)]
pub struct LimiterStats {
    /// Stats: total checks.
    pub total_checks: AtomicU64,

    /// Stats: total allowed.
    pub total_allowed: AtomicU64,

    /// Stats: total denied.
    pub total_denied: AtomicU64,
}

impl LimiterStats {
    /// Record one decision.
    pub fn record(&self, allowed: bool) {
        self.total_checks.fetch_add(1, Ordering::Relaxed);
        if allowed {
            self.total_allowed.fetch_add(1, Ordering::Relaxed);
        } else {
            self.total_denied.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Total decisions.
    #[must_use]
    pub fn checks(&self) -> u64 {
        self.total_checks.load(Ordering::Relaxed)
    }

    /// Admitted requests.
    #[must_use]
    pub fn allowed(&self) -> u64 {
        self.total_allowed.load(Ordering::Relaxed)
    }

    /// Rejected requests.
    #[must_use]
    pub fn denied(&self) -> u64 {
        self.total_denied.load(Ordering::Relaxed)
    }
}

/// Lazily populated map from client identifier to bucket.
struct BucketRegistry<B> {
    buckets: RwLock<HashMap<String, Arc<B>>>,
    repository: Arc<dyn ClientRepository>,
    capacity: u64,
}

impl<B> BucketRegistry<B> {
    fn new(capacity: u64, repository: Arc<dyn ClientRepository>) -> Self {
        Self {
            buckets: RwLock::new(HashMap::new()),
            repository,
            capacity,
        }
    }

    /// Get the bucket for `key`, creating it exactly once.
    fn get_or_create(&self, key: &str, create: impl FnOnce() -> B) -> Arc<B> {
        // Try read lock first
        {
            let buckets = self.buckets.read().unwrap_or_else(PoisonError::into_inner);
            if let Some(bucket) = buckets.get(key) {
                return Arc::clone(bucket);
            }
        }

        // Need to create - get write lock
        let mut buckets = self.buckets.write().unwrap_or_else(PoisonError::into_inner);

        // Double-check after acquiring write lock
        if let Some(bucket) = buckets.get(key) {
            return Arc::clone(bucket);
        }

        let bucket = Arc::new(create());
        buckets.insert(key.to_string(), Arc::clone(&bucket));
        drop(buckets);

        debug!(client = %key, "Created rate limit bucket");
        self.report_new_client(key);
        bucket
    }

    fn get(&self, key: &str) -> Option<Arc<B>> {
        self.buckets
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    /// Copy of every bucket handle, taken under the read lock.
    fn snapshot(&self) -> Vec<Arc<B>> {
        self.buckets
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect()
    }

    fn len(&self) -> usize {
        self.buckets
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    fn report_new_client(&self, key: &str) {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            trace!(client = %key, "No runtime, skipping client record");
            return;
        };

        let repository = Arc::clone(&self.repository);
        let client = ClientInfo::new(key).with_capacity(self.capacity);
        runtime.spawn(async move {
            if let Err(e) = repository.save_client(&client).await {
                warn!(client = %client.identifier, error = %e, "Failed to save client");
            }
        });
    }
}

/// Token bucket limiter.
///
/// Buckets start full and are replenished by the task started with
/// [`TokenBucketLimiter::spawn_refill`].
pub struct TokenBucketLimiter {
    capacity: u64,
    rate: f64,
    refill_interval: Duration,
    registry: BucketRegistry<TokenBucket>,
    stats: LimiterStats,
}

impl std::fmt::Debug for TokenBucketLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenBucketLimiter")
            .field("capacity", &self.capacity)
            .field("rate", &self.rate)
            .field("refill_interval", &self.refill_interval)
            .field("clients", &self.registry.len())
            .field("stats", &self.stats)
            .finish()
    }
}

impl TokenBucketLimiter {
    /// Create a token bucket limiter.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn new(
        config: &RateLimitConfig,
        repository: Arc<dyn ClientRepository>,
    ) -> RateLimitResult<Self> {
        config.validate()?;
        Ok(Self {
            capacity: config.capacity,
            rate: config.rate,
            refill_interval: config.refill_interval,
            registry: BucketRegistry::new(config.capacity, repository),
            stats: LimiterStats::default(),
        })
    }

    /// Run one refill pass over every bucket. Returns the tokens added.
    ///
    /// Full buckets gain nothing but still have their window restarted.
    pub fn refill_all(&self) -> u64 {
        self.registry
            .snapshot()
            .iter()
            .map(|bucket| bucket.refill())
            .sum()
    }

    /// Tokens left for `client_id`, if it has a bucket.
    #[must_use]
    pub fn available_tokens(&self, client_id: &str) -> Option<u64> {
        self.registry.get(client_id).map(|b| b.available_tokens())
    }

    /// Start the periodic refill task. It ends on `shutdown`.
    pub fn spawn_refill(self: &Arc<Self>, shutdown: &Shutdown) -> JoinHandle<()> {
        let limiter = Arc::clone(self);
        let mut shutdown = shutdown.clone();

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(limiter.refill_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticker.tick().await;

            debug!(
                interval_ms = limiter.refill_interval.as_millis(),
                "Token refill task started"
            );

            loop {
                tokio::select! {
                    _ = shutdown.wait() => {
                        debug!("Token refill task shutting down");
                        break;
                    }
                    _ = ticker.tick() => {
                        let added = limiter.refill_all();
                        if added > 0 {
                            trace!(added, "Refilled token buckets");
                        }
                    }
                }
            }
        })
    }
}

impl RateLimiter for TokenBucketLimiter {
    fn client_allowed(&self, client_id: &str) -> bool {
        let bucket = self
            .registry
            .get_or_create(client_id, || TokenBucket::new(self.capacity, self.rate));
        let allowed = bucket.try_consume();
        self.stats.record(allowed);
        allowed
    }

    fn name(&self) -> &'static str {
        "token-bucket"
    }

    fn client_count(&self) -> usize {
        self.registry.len()
    }

    fn stats(&self) -> &LimiterStats {
        &self.stats
    }
}

/// Leaky bucket limiter. All state is updated on access.
pub struct LeakyBucketLimiter {
    capacity: u64,
    rate: f64,
    registry: BucketRegistry<LeakyBucket>,
    stats: LimiterStats,
}

impl std::fmt::Debug for LeakyBucketLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LeakyBucketLimiter")
            .field("capacity", &self.capacity)
            .field("rate", &self.rate)
            .field("clients", &self.registry.len())
            .field("stats", &self.stats)
            .finish()
    }
}

impl LeakyBucketLimiter {
    /// Create a leaky bucket limiter.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn new(
        config: &RateLimitConfig,
        repository: Arc<dyn ClientRepository>,
    ) -> RateLimitResult<Self> {
        config.validate()?;
        Ok(Self {
            capacity: config.capacity,
            rate: config.rate,
            registry: BucketRegistry::new(config.capacity, repository),
            stats: LimiterStats::default(),
        })
    }

    /// Outstanding load for `client_id`, if it has a bucket.
    #[must_use]
    pub fn level(&self, client_id: &str) -> Option<u64> {
        self.registry.get(client_id).map(|b| b.level())
    }
}

impl RateLimiter for LeakyBucketLimiter {
    fn client_allowed(&self, client_id: &str) -> bool {
        let bucket = self
            .registry
            .get_or_create(client_id, || LeakyBucket::new(self.capacity, self.rate));
        let allowed = bucket.try_admit();
        self.stats.record(allowed);
        allowed
    }

    fn name(&self) -> &'static str {
        "leaky-bucket"
    }

    fn client_count(&self) -> usize {
        self.registry.len()
    }

    fn stats(&self) -> &LimiterStats {
        &self.stats
    }
}

/// A configured limiter plus its background task, if it has one.
#[derive(Debug)]
pub struct LimiterHandle {
    /// The limiter consulted per request.
    pub limiter: Arc<dyn RateLimiter>,
    /// Refill task for token buckets.
    pub task: Option<JoinHandle<()>>,
}

/// Build the configured limiter and start its background work.
///
/// Must be called from within a Tokio runtime.
///
/// # Errors
///
/// Returns an error if the configuration is invalid.
pub fn start_limiter(
    config: &RateLimitConfig,
    repository: Arc<dyn ClientRepository>,
    shutdown: &Shutdown,
) -> RateLimitResult<LimiterHandle> {
    let handle = match config.strategy {
        LimiterType::TokenBucket => {
            let limiter = Arc::new(TokenBucketLimiter::new(config, repository)?);
            let task = limiter.spawn_refill(shutdown);
            LimiterHandle {
                limiter,
                task: Some(task),
            }
        },
        LimiterType::LeakyBucket => LimiterHandle {
            limiter: Arc::new(LeakyBucketLimiter::new(config, repository)?),
            task: None,
        },
    };

    info!(
        limiter = handle.limiter.name(),
        capacity = config.capacity,
        rate = config.rate,
        "Rate limiter started"
    );

    Ok(handle)
}
