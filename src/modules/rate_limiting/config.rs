//! Rate limiting configuration.

use super::error::{RateLimitError, RateLimitResult};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Rate limiting algorithm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LimiterType {
    /// Burst up to capacity, replenished by a background refill task.
    #[default]
    TokenBucket,
    /// Outstanding load drains continuously; computed on access.
    LeakyBucket,
}

impl std::fmt::Display for LimiterType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::TokenBucket => write!(f, "token-bucket"),
            Self::LeakyBucket => write!(f, "leaky-bucket"),
        }
    }
}

/// Per-client rate limiting configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Algorithm used for every client.
    pub strategy: LimiterType,

    /// Bucket size: the burst a fresh client may send.
    pub capacity: u64,

    /// Units per second restored (token bucket) or drained (leaky bucket).
    pub rate: f64,

    /// Tick of the token bucket refill task.
    #[serde(with = "humantime_serde")]
    pub refill_interval: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            strategy: LimiterType::TokenBucket,
            capacity: 100,
            rate: 10.0,
            refill_interval: Duration::from_secs(1),
        }
    }
}

impl RateLimitConfig {
    /// Create a configuration for the given algorithm.
    #[must_use]
    pub fn new(strategy: LimiterType, capacity: u64, rate: f64) -> Self {
        Self {
            strategy,
            capacity,
            rate,
            ..Self::default()
        }
    }

    /// Set the refill tick.
    #[must_use]
    pub fn with_refill_interval(mut self, interval: Duration) -> Self {
        self.refill_interval = interval;
        self
    }

    /// Check the values the limiters depend on.
    ///
    /// # Errors
    ///
    /// Returns [`RateLimitError::InvalidConfig`] for a zero capacity, a
    /// negative or non-finite rate, or a zero refill interval.
    pub fn validate(&self) -> RateLimitResult<()> {
        if self.capacity == 0 {
            return Err(RateLimitError::InvalidConfig(
                "capacity must be greater than 0".to_string(),
            ));
        }
        if !self.rate.is_finite() || self.rate < 0.0 {
            return Err(RateLimitError::InvalidConfig(format!(
                "rate must be a non-negative number, got {}",
                self.rate
            )));
        }
        if self.strategy == LimiterType::TokenBucket && self.refill_interval.is_zero() {
            return Err(RateLimitError::InvalidConfig(
                "refill_interval must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = RateLimitConfig::default();
        assert_eq!(config.strategy, LimiterType::TokenBucket);
        assert_eq!(config.capacity, 100);
        assert_eq!(config.refill_interval, Duration::from_secs(1));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_config() {
        let config: RateLimitConfig = toml::from_str(
            r#"
            strategy = "leaky-bucket"
            capacity = 5
            rate = 0.5
            refill_interval = "250ms"
            "#,
        )
        .unwrap();

        assert_eq!(config.strategy, LimiterType::LeakyBucket);
        assert_eq!(config.capacity, 5);
        assert!((config.rate - 0.5).abs() < f64::EPSILON);
        assert_eq!(config.refill_interval, Duration::from_millis(250));
    }

    #[test]
    fn test_unknown_strategy_rejected() {
        let result: Result<RateLimitConfig, _> = toml::from_str(r#"strategy = "fixed-window""#);
        assert!(result.is_err());
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let zero_capacity = RateLimitConfig::new(LimiterType::TokenBucket, 0, 1.0);
        assert!(zero_capacity.validate().unwrap_err().is_config_error());

        let negative_rate = RateLimitConfig::new(LimiterType::LeakyBucket, 10, -1.0);
        assert!(negative_rate.validate().is_err());

        let nan_rate = RateLimitConfig::new(LimiterType::LeakyBucket, 10, f64::NAN);
        assert!(nan_rate.validate().is_err());

        let zero_tick = RateLimitConfig::new(LimiterType::TokenBucket, 10, 1.0)
            .with_refill_interval(Duration::ZERO);
        assert!(zero_tick.validate().is_err());
    }

    #[test]
    fn test_zero_tick_ignored_for_leaky_bucket() {
        let config = RateLimitConfig::new(LimiterType::LeakyBucket, 10, 1.0)
            .with_refill_interval(Duration::ZERO);
        assert!(config.validate().is_ok());
    }
}
