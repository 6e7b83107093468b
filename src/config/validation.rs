//! Configuration validation system.

use super::types::BalancerConfig;
use crate::modules::load_balancer::Backend;
use crate::modules::rate_limiting::LimiterType;
use http::header::HeaderName;
use std::time::Duration;

/// A single validation error.
#[derive(Debug, Clone)]
pub struct ValidationError {
    /// The field path that failed validation.
    pub field: String,
    /// Error message.
    pub message: String,
    /// Severity level.
    pub severity: ValidationSeverity,
}

impl ValidationError {
    /// Create a new error.
    pub fn error(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
            severity: ValidationSeverity::Error,
        }
    }

    /// Create a new warning.
    pub fn warning(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
            severity: ValidationSeverity::Warning,
        }
    }
}

/// Severity of validation issues.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationSeverity {
    /// Error - configuration is invalid.
    Error,
    /// Warning - configuration may have issues.
    Warning,
}

/// Result of configuration validation.
#[derive(Debug, Default)]
pub struct ValidationResult {
    errors: Vec<ValidationError>,
}

impl ValidationResult {
    /// Create a new empty (valid) result.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an error to the result.
    pub fn add_error(&mut self, error: ValidationError) {
        self.errors.push(error);
    }

    /// Check if the validation passed (no errors).
    #[must_use]
    pub fn is_valid(&self) -> bool {
        !self
            .errors
            .iter()
            .any(|e| e.severity == ValidationSeverity::Error)
    }

    /// Get all validation errors.
    #[must_use]
    pub fn errors(&self) -> &[ValidationError] {
        &self.errors
    }

    /// Get only errors (not warnings).
    #[must_use]
    pub fn errors_only(&self) -> Vec<&ValidationError> {
        self.errors
            .iter()
            .filter(|e| e.severity == ValidationSeverity::Error)
            .collect()
    }

    /// Get only warnings.
    #[must_use]
    pub fn warnings(&self) -> Vec<&ValidationError> {
        self.errors
            .iter()
            .filter(|e| e.severity == ValidationSeverity::Warning)
            .collect()
    }

    /// Merge another validation result into this one.
    pub fn merge(&mut self, other: ValidationResult) {
        self.errors.extend(other.errors);
    }

    fn require_nonzero(&mut self, field: &str, value: Duration) {
        if value.is_zero() {
            self.add_error(ValidationError::error(field, "Duration must be greater than 0"));
        }
    }

    fn require_header_name(&mut self, field: &str, value: &str) {
        if HeaderName::from_bytes(value.as_bytes()).is_err() {
            self.add_error(ValidationError::error(
                field,
                format!("'{value}' is not a valid header name"),
            ));
        }
    }
}

/// Trait for configuration validators.
pub trait Validator: std::fmt::Debug + Send + Sync {
    /// Validate a configuration and return any errors.
    fn validate(&self, config: &BalancerConfig) -> ValidationResult;
}

/// Built-in validator for basic configuration checks.
#[derive(Debug, Default)]
pub struct BasicValidator;

impl BasicValidator {
    /// Create a new basic validator.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Validator for BasicValidator {
    fn validate(&self, config: &BalancerConfig) -> ValidationResult {
        let mut result = ValidationResult::new();

        // [server]
        let server = &config.server;
        result.require_header_name("server.client_header", &server.client_header);
        result.require_header_name("server.request_id_header", &server.request_id_header);
        result.require_nonzero("server.upstream_timeout", server.upstream_timeout);
        if !server.heartbeat_path.starts_with('/') {
            result.add_error(ValidationError::error(
                "server.heartbeat_path",
                "Path must start with '/'",
            ));
        }

        // [load_balancer]
        let lb = &config.load_balancer;
        if lb.backends.is_empty() {
            result.add_error(ValidationError::warning(
                "load_balancer.backends",
                "No backends configured, every request will fail with 503",
            ));
        }
        let mut seen = std::collections::HashSet::new();
        for (index, address) in lb.backends.iter().enumerate() {
            let field = format!("load_balancer.backends[{index}]");
            if let Err(e) = Backend::parse(address) {
                result.add_error(ValidationError::error(field, e.to_string()));
            } else if !seen.insert(address.trim_end_matches('/')) {
                result.add_error(ValidationError::warning(
                    field,
                    format!("Duplicate backend '{address}'"),
                ));
            }
        }

        let health = &lb.health_check;
        result.require_nonzero("load_balancer.health_check.interval", health.interval);
        result.require_nonzero("load_balancer.health_check.timeout", health.timeout);
        if !health.path.starts_with('/') {
            result.add_error(ValidationError::error(
                "load_balancer.health_check.path",
                "Path must start with '/'",
            ));
        }

        // [rate_limit]
        let rl = &config.rate_limit;
        if rl.capacity == 0 {
            result.add_error(ValidationError::error(
                "rate_limit.capacity",
                "Capacity must be greater than 0",
            ));
        }
        if !rl.rate.is_finite() || rl.rate < 0.0 {
            result.add_error(ValidationError::error(
                "rate_limit.rate",
                "Rate must be a finite, non-negative number",
            ));
        } else if rl.rate == 0.0 {
            result.add_error(ValidationError::warning(
                "rate_limit.rate",
                "Rate is 0, clients will never regain budget",
            ));
        }
        if rl.strategy == LimiterType::TokenBucket {
            result.require_nonzero("rate_limit.refill_interval", rl.refill_interval);
        }

        result
    }
}
