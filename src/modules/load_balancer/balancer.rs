//! Strategy-driven selection over a copy-on-write backend snapshot.

use super::backend::Backend;
use super::config::StrategyType;
use super::error::{LoadBalancerError, LoadBalancerResult};
use super::strategy::{LeastConnectionsStrategy, RandomStrategy, RoundRobinStrategy, Strategy};
use arc_swap::ArcSwap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

/// Load balancer statistics.
#[derive(Debug, Default)]
pub struct LoadBalancerStats {
    /// Total selections made.
    pub total_selections: AtomicU64,
    /// Successful selections.
    pub successful_selections: AtomicU64,
    /// Failed selections (no healthy backend).
    pub failed_selections: AtomicU64,
}

impl LoadBalancerStats {
    /// Record a selection attempt.
    pub fn record_selection(&self, success: bool) {
        self.total_selections.fetch_add(1, Ordering::Relaxed);
        if success {
            self.successful_selections.fetch_add(1, Ordering::Relaxed);
        } else {
            self.failed_selections.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Total selections made so far.
    #[must_use]
    pub fn total(&self) -> u64 {
        self.total_selections.load(Ordering::Relaxed)
    }

    /// Failed selections so far.
    #[must_use]
    pub fn failed(&self) -> u64 {
        self.failed_selections.load(Ordering::Relaxed)
    }
}

/// Strategy container for different load balancing algorithms.
#[derive(Debug)]
pub enum StrategyContainer {
    /// Round-robin distribution.
    RoundRobin(RoundRobinStrategy),
    /// Least connections.
    LeastConnections(LeastConnectionsStrategy),
    /// Random selection.
    Random(RandomStrategy),
}

impl StrategyContainer {
    /// Build the strategy for a configured type.
    #[must_use]
    pub fn from_type(strategy_type: StrategyType) -> Self {
        match strategy_type {
            StrategyType::RoundRobin => Self::RoundRobin(RoundRobinStrategy::new()),
            StrategyType::LeastConnections => {
                Self::LeastConnections(LeastConnectionsStrategy::new())
            },
            StrategyType::Random => Self::Random(RandomStrategy::new()),
        }
    }

    /// Get the strategy as a trait object.
    pub fn as_strategy(&self) -> &dyn Strategy {
        match self {
            Self::RoundRobin(s) => s,
            Self::LeastConnections(s) => s,
            Self::Random(s) => s,
        }
    }

    /// Get strategy name.
    pub fn name(&self) -> &'static str {
        self.as_strategy().name()
    }
}

/// Backend selector.
///
/// `next` reads exactly one snapshot of the backend set; `update_backends`
/// swaps in a fresh vector, so readers never observe a partial update.
pub struct LoadBalancer {
    /// Current backend snapshot.
    backends: ArcSwap<Vec<Arc<Backend>>>,
    /// Selection strategy.
    strategy: StrategyContainer,
    /// Statistics.
    stats: LoadBalancerStats,
}

impl std::fmt::Debug for LoadBalancer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoadBalancer")
            .field("strategy", &self.strategy.name())
            .field("backends", &self.backends.load().len())
            .field("stats", &self.stats)
            .finish()
    }
}

impl LoadBalancer {
    /// Create a load balancer over the given backends.
    pub fn new(backends: impl IntoIterator<Item = Arc<Backend>>, strategy: StrategyType) -> Self {
        let backends: Vec<Arc<Backend>> = backends.into_iter().collect();
        let strategy = StrategyContainer::from_type(strategy);

        info!(
            strategy = strategy.name(),
            backends = backends.len(),
            "Load balancer created"
        );

        Self {
            backends: ArcSwap::from_pointee(backends),
            strategy,
            stats: LoadBalancerStats::default(),
        }
    }

    /// Select the next backend.
    ///
    /// # Errors
    ///
    /// [`LoadBalancerError::NoBackends`] if the set is empty,
    /// [`LoadBalancerError::NoHealthyBackends`] if no member is healthy.
    pub fn next(&self) -> LoadBalancerResult<Arc<Backend>> {
        let snapshot = self.backends.load();
        let result = self
            .strategy
            .as_strategy()
            .select(&snapshot)
            .map(Arc::clone);

        self.stats.record_selection(result.is_ok());
        if let Err(ref e) = result {
            debug!(strategy = self.strategy.name(), error = %e, "Backend selection failed");
        }

        result
    }

    /// Replace the whole backend set.
    pub fn update_backends(&self, backends: impl IntoIterator<Item = Arc<Backend>>) {
        let fresh: Vec<Arc<Backend>> = backends.into_iter().collect();
        debug!(backends = fresh.len(), "Backend set replaced");
        self.backends.store(Arc::new(fresh));
    }

    /// Current backend snapshot.
    #[must_use]
    pub fn backends(&self) -> Arc<Vec<Arc<Backend>>> {
        self.backends.load_full()
    }

    /// Number of healthy backends in the current snapshot.
    #[must_use]
    pub fn healthy_count(&self) -> usize {
        self.backends.load().iter().filter(|b| b.is_healthy()).count()
    }

    /// Name of the active strategy.
    #[must_use]
    pub fn strategy_name(&self) -> &'static str {
        self.strategy.name()
    }

    /// Get load balancer statistics.
    #[must_use]
    pub fn stats(&self) -> &LoadBalancerStats {
        &self.stats
    }
}

/// Parse configured addresses into backends.
///
/// # Errors
///
/// Returns the first [`LoadBalancerError::InvalidAddress`] encountered.
pub fn parse_backends<S: AsRef<str>>(addresses: &[S]) -> LoadBalancerResult<Vec<Arc<Backend>>> {
    addresses
        .iter()
        .map(|address| Backend::parse(address.as_ref()).map(Arc::new))
        .collect()
}
