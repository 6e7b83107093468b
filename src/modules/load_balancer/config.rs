//! Load balancer configuration types.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for the load balancer module.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LoadBalancerConfig {
    /// Upstream addresses, e.g. `http://10.0.0.1:8080`.
    pub backends: Vec<String>,

    /// Selection strategy.
    pub strategy: StrategyType,

    /// Active health check settings.
    pub health_check: HealthCheckConfig,
}

/// Load balancing strategy types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StrategyType {
    /// Round-robin distribution.
    RoundRobin,
    /// Fewest in-flight requests.
    #[default]
    LeastConnections,
    /// Uniform random selection.
    Random,
}

impl std::fmt::Display for StrategyType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::RoundRobin => write!(f, "round-robin"),
            Self::LeastConnections => write!(f, "least-connections"),
            Self::Random => write!(f, "random"),
        }
    }
}

/// Health check configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthCheckConfig {
    /// Delay between probes of the same backend.
    #[serde(with = "humantime_serde")]
    pub interval: Duration,

    /// Upper bound on a single probe.
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,

    /// Path requested on each backend.
    pub path: String,
}

impl Default for HealthCheckConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(5),
            timeout: Duration::from_secs(2),
            path: "/health".to_string(),
        }
    }
}
