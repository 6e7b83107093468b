//! # Load Balancer Module
//!
//! Backend registry, health monitoring, and selection strategies.
//!
//! ## Features
//!
//! - **Strategies**: Round-robin, least-connections, and random
//! - **Health Checks**: One periodic HTTP probe loop per backend
//! - **Lock-free reads**: Selection reads a copy-on-write backend snapshot
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────┐
//! │  Load Balancer  │
//! │                 │
//! │  ┌───────────┐  │      ┌──────────┐
//! │  │ Strategy  │──┼────▶│ Backend1 │
//! │  │ Selector  │  │      └──────────┘
//! │  └───────────┘  │      ┌──────────┐
//! │        │        │────▶│ Backend2 │
//! │  ┌───────────┐  │      └──────────┘
//! │  │  Health   │  │      ┌──────────┐
//! │  │  Monitor  │──┼────▶│ Backend3 │
//! │  └───────────┘  │      └──────────┘
//! └─────────────────┘
//! ```

pub mod backend;
pub mod balancer;
pub mod config;
pub mod error;
pub mod health;
pub mod strategy;

pub use backend::{Backend, BackendStats, ConnectionGuard};
pub use balancer::{parse_backends, LoadBalancer, LoadBalancerStats, StrategyContainer};
pub use config::{HealthCheckConfig, LoadBalancerConfig, StrategyType};
pub use error::{LoadBalancerError, LoadBalancerResult};
pub use health::{HealthCheck, HealthCheckResult, HealthMonitor, HealthStatus};
pub use strategy::{LeastConnectionsStrategy, RandomStrategy, RoundRobinStrategy, Strategy};
