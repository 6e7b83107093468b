//! Load balancing strategies.

use super::backend::Backend;
use super::error::{LoadBalancerError, LoadBalancerResult};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Retry budget per backend for [`RandomStrategy`].
const RANDOM_ATTEMPTS_PER_BACKEND: usize = 5;

/// Trait for load balancing strategies.
///
/// Selection is in-memory and never blocks on I/O.
pub trait Strategy: Send + Sync {
    /// Select a healthy backend from the given snapshot.
    ///
    /// # Errors
    ///
    /// [`LoadBalancerError::NoBackends`] for an empty snapshot,
    /// [`LoadBalancerError::NoHealthyBackends`] when no healthy member is found.
    fn select<'a>(&self, backends: &'a [Arc<Backend>]) -> LoadBalancerResult<&'a Arc<Backend>>;

    /// Get the strategy name.
    fn name(&self) -> &'static str;
}

/// Round-robin load balancing strategy.
#[derive(Debug)]
pub struct RoundRobinStrategy {
    /// Current index.
    current: AtomicUsize,
}

impl RoundRobinStrategy {
    /// Create a new round-robin strategy.
    #[must_use]
    pub fn new() -> Self {
        Self {
            current: AtomicUsize::new(0),
        }
    }
}

impl Default for RoundRobinStrategy {
    fn default() -> Self {
        Self::new()
    }
}

impl Strategy for RoundRobinStrategy {
    fn select<'a>(&self, backends: &'a [Arc<Backend>]) -> LoadBalancerResult<&'a Arc<Backend>> {
        if backends.is_empty() {
            return Err(LoadBalancerError::NoBackends);
        }

        // One counter step per scanned position, at most one full cycle.
        for _ in 0..backends.len() {
            let idx = self.current.fetch_add(1, Ordering::Relaxed) % backends.len();
            let backend = &backends[idx];
            if backend.is_healthy() {
                return Ok(backend);
            }
        }

        Err(LoadBalancerError::NoHealthyBackends)
    }

    fn name(&self) -> &'static str {
        "round-robin"
    }
}

/// Least connections load balancing strategy.
#[derive(Debug, Default)]
pub struct LeastConnectionsStrategy;

impl LeastConnectionsStrategy {
    /// Create a new least connections strategy.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Strategy for LeastConnectionsStrategy {
    fn select<'a>(&self, backends: &'a [Arc<Backend>]) -> LoadBalancerResult<&'a Arc<Backend>> {
        if backends.is_empty() {
            return Err(LoadBalancerError::NoBackends);
        }

        let mut best: Option<&Arc<Backend>> = None;
        let mut min_connections = i64::MAX;

        for backend in backends {
            if !backend.is_healthy() {
                continue;
            }

            let connections = backend.connection_count();
            if connections <= 0 {
                return Ok(backend);
            }

            // Strict comparison keeps the earliest backend on ties.
            if connections < min_connections {
                min_connections = connections;
                best = Some(backend);
            }
        }

        best.ok_or(LoadBalancerError::NoHealthyBackends)
    }

    fn name(&self) -> &'static str {
        "least-connections"
    }
}

/// Random load balancing strategy.
///
/// Draws uniformly over the whole snapshot and resamples on unhealthy picks,
/// giving up after `5 × len` draws. The index comes from the thread-local
/// generator, a CSPRNG seeded from the operating system.
#[derive(Debug, Default)]
pub struct RandomStrategy;

impl RandomStrategy {
    /// Create a new random strategy.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Strategy for RandomStrategy {
    fn select<'a>(&self, backends: &'a [Arc<Backend>]) -> LoadBalancerResult<&'a Arc<Backend>> {
        if backends.is_empty() {
            return Err(LoadBalancerError::NoBackends);
        }

        let mut rng = rand::rng();
        for _ in 0..backends.len() * RANDOM_ATTEMPTS_PER_BACKEND {
            let idx = rand::RngExt::random_range(&mut rng, 0..backends.len());
            let backend = &backends[idx];
            if backend.is_healthy() {
                return Ok(backend);
            }
        }

        Err(LoadBalancerError::NoHealthyBackends)
    }

    fn name(&self) -> &'static str {
        "random"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_backends(count: usize) -> Vec<Arc<Backend>> {
        (0..count)
            .map(|i| Arc::new(Backend::parse(&format!("http://10.0.0.{}:8080", i + 1)).unwrap()))
            .collect()
    }

    fn index_of(backends: &[Arc<Backend>], selected: &Arc<Backend>) -> usize {
        backends
            .iter()
            .position(|b| Arc::ptr_eq(b, selected))
            .unwrap()
    }

    #[test]
    fn test_round_robin_cycles_in_order() {
        let strategy = RoundRobinStrategy::new();
        let backends = make_backends(3);

        let order: Vec<usize> = (0..6)
            .map(|_| index_of(&backends, strategy.select(&backends).unwrap()))
            .collect();
        assert_eq!(order, vec![0, 1, 2, 0, 1, 2]);
    }

    #[test]
    fn test_round_robin_skips_unhealthy() {
        let strategy = RoundRobinStrategy::new();
        let backends = make_backends(3);
        backends[1].set_healthy(false);

        let order: Vec<usize> = (0..6)
            .map(|_| index_of(&backends, strategy.select(&backends).unwrap()))
            .collect();
        assert_eq!(order, vec![0, 2, 0, 2, 0, 2]);
    }

    #[test]
    fn test_round_robin_visits_every_healthy_before_repeat() {
        let strategy = RoundRobinStrategy::new();
        let backends = make_backends(5);
        backends[3].set_healthy(false);

        let mut seen = std::collections::HashSet::new();
        for _ in 0..4 {
            let idx = index_of(&backends, strategy.select(&backends).unwrap());
            assert!(seen.insert(idx), "repeated {idx} before full cycle");
        }
        assert!(!seen.contains(&3));
    }

    #[test]
    fn test_round_robin_no_backends() {
        let strategy = RoundRobinStrategy::new();
        let backends: Vec<Arc<Backend>> = vec![];
        assert_eq!(
            strategy.select(&backends).unwrap_err(),
            LoadBalancerError::NoBackends
        );
    }

    #[test]
    fn test_round_robin_all_unhealthy() {
        let strategy = RoundRobinStrategy::new();
        let backends = make_backends(3);
        for backend in &backends {
            backend.set_healthy(false);
        }
        assert_eq!(
            strategy.select(&backends).unwrap_err(),
            LoadBalancerError::NoHealthyBackends
        );
    }

    #[test]
    fn test_least_connections() {
        let strategy = LeastConnectionsStrategy::new();
        let backends = make_backends(3);

        let _a = [backends[0].acquire(), backends[0].acquire()];
        let _b = backends[1].acquire();
        let _c = backends[2].acquire();
        let _d = backends[2].acquire();
        let _e = backends[2].acquire();

        let selected = strategy.select(&backends).unwrap();
        assert_eq!(index_of(&backends, selected), 1);
    }

    #[test]
    fn test_least_connections_zero_short_circuit() {
        let strategy = LeastConnectionsStrategy::new();
        let backends = make_backends(3);
        let _held = backends[0].acquire();

        let selected = strategy.select(&backends).unwrap();
        assert_eq!(index_of(&backends, selected), 1);
    }

    #[test]
    fn test_least_connections_tie_prefers_earliest() {
        let strategy = LeastConnectionsStrategy::new();
        let backends = make_backends(3);
        let _g: Vec<_> = backends.iter().map(|b| b.acquire()).collect();

        let selected = strategy.select(&backends).unwrap();
        assert_eq!(index_of(&backends, selected), 0);
    }

    #[test]
    fn test_least_connections_ignores_unhealthy_minimum() {
        let strategy = LeastConnectionsStrategy::new();
        let backends = make_backends(2);
        backends[0].set_healthy(false);
        let _held = backends[1].acquire();

        let selected = strategy.select(&backends).unwrap();
        assert_eq!(index_of(&backends, selected), 1);

        backends[1].set_healthy(false);
        assert_eq!(
            strategy.select(&backends).unwrap_err(),
            LoadBalancerError::NoHealthyBackends
        );
    }

    #[test]
    fn test_random_never_returns_unhealthy() {
        let strategy = RandomStrategy::new();
        let backends = make_backends(4);
        backends[0].set_healthy(false);
        backends[2].set_healthy(false);

        for _ in 0..200 {
            // A single healthy pair out of four fails all 20 draws with
            // probability 2^-20.
            if let Ok(selected) = strategy.select(&backends) {
                assert!(selected.is_healthy());
            }
        }
    }

    #[test]
    fn test_random_all_unhealthy() {
        let strategy = RandomStrategy::new();
        let backends = make_backends(3);
        for backend in &backends {
            backend.set_healthy(false);
        }
        assert_eq!(
            strategy.select(&backends).unwrap_err(),
            LoadBalancerError::NoHealthyBackends
        );
    }

    #[test]
    fn test_random_no_backends() {
        let strategy = RandomStrategy::new();
        assert_eq!(
            strategy.select(&[]).unwrap_err(),
            LoadBalancerError::NoBackends
        );
    }

    #[test]
    fn test_random_covers_all_backends() {
        let strategy = RandomStrategy::new();
        let backends = make_backends(3);

        let mut counts = [0u32; 3];
        for _ in 0..300 {
            counts[index_of(&backends, strategy.select(&backends).unwrap())] += 1;
        }
        assert!(counts.iter().all(|&c| c > 0), "counts: {counts:?}");
    }

    #[test]
    fn test_strategy_names() {
        assert_eq!(RoundRobinStrategy::new().name(), "round-robin");
        assert_eq!(LeastConnectionsStrategy::new().name(), "least-connections");
        assert_eq!(RandomStrategy::new().name(), "random");
    }
}
