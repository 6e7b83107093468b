//! # Configuration System
//!
//! TOML-based configuration for the balancer: parsing, defaults and
//! validation.
//!
//! ## Example Configuration
//!
//! ```toml
//! [server]
//! listen = "0.0.0.0:8080"
//! client_header = "Rate-Limit-Key"
//!
//! [logging]
//! level = "info"
//! format = "json"
//!
//! [load_balancer]
//! strategy = "round-robin"
//! backends = ["http://10.0.0.1:9000", "http://10.0.0.2:9000"]
//!
//! [load_balancer.health_check]
//! interval = "5s"
//!
//! [rate_limit]
//! strategy = "token-bucket"
//! capacity = 100
//! rate = 10
//! ```

mod error;
mod loader;
mod types;
mod validation;

pub use error::{ConfigError, ConfigResult};
pub use loader::{ConfigLoader, ConfigSource};
pub use types::{BalancerConfig, LogFormat, LogLevel, LogOutput, LoggingConfig};
pub use validation::{
    BasicValidator, ValidationError, ValidationResult, ValidationSeverity, Validator,
};
