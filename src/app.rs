//! Wiring of the balancer, limiter, health monitor and proxy server.

use crate::config::{BalancerConfig, ConfigError};
use crate::modules::dispatcher::{DispatchError, Dispatcher, ProxyServer, ProxyService};
use crate::modules::load_balancer::{parse_backends, HealthMonitor, LoadBalancer, LoadBalancerError};
use crate::modules::rate_limiting::{
    start_limiter, ClientRepository, NoopRepository, RateLimitError, RateLimiter,
};
use crate::shutdown::{self, ShutdownTrigger};
use std::net::SocketAddr;
use std::sync::Arc;
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// Startup failures.
#[derive(Debug, Error)]
pub enum AppError {
    /// Configuration could not be loaded or validated.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Backend list is invalid.
    #[error(transparent)]
    LoadBalancer(#[from] LoadBalancerError),

    /// Limiter configuration is invalid.
    #[error(transparent)]
    RateLimit(#[from] RateLimitError),

    /// Server could not be set up.
    #[error(transparent)]
    Dispatch(#[from] DispatchError),
}

/// Result type for application setup.
pub type AppResult<T> = Result<T, AppError>;

/// Unstarted application.
#[derive(Debug)]
pub struct App {
    config: BalancerConfig,
    repository: Arc<dyn ClientRepository>,
}

impl App {
    /// Create an application from validated configuration.
    #[must_use]
    pub fn new(config: BalancerConfig) -> Self {
        Self {
            config,
            repository: Arc::new(NoopRepository),
        }
    }

    /// Use `repository` for new-client records.
    #[must_use]
    pub fn with_repository(mut self, repository: Arc<dyn ClientRepository>) -> Self {
        self.repository = repository;
        self
    }

    /// Get the configuration.
    #[must_use]
    pub fn config(&self) -> &BalancerConfig {
        &self.config
    }

    /// Bind the listener and start every background task.
    ///
    /// Must be called from within a Tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns an error if a backend address, the limiter configuration or
    /// a header name is invalid, or the listen address cannot be bound.
    pub async fn start(self) -> AppResult<RunningApp> {
        let (trigger, shutdown) = shutdown::channel();

        let lb_config = &self.config.load_balancer;
        let backends = parse_backends(&lb_config.backends)?;
        let balancer = Arc::new(LoadBalancer::new(backends.clone(), lb_config.strategy));

        let limiter = start_limiter(&self.config.rate_limit, self.repository, &shutdown)?;

        let dispatcher = Dispatcher::new(
            &self.config.server,
            Arc::clone(&limiter.limiter),
            Arc::clone(&balancer),
        )?;
        let service = ProxyService::from_config(&self.config.server, dispatcher)?;
        let server = ProxyServer::bind(&self.config.server, service).await?;
        let local_addr = server.local_addr()?;

        let mut tasks = HealthMonitor::new(lb_config.health_check.clone()).spawn(&backends, &shutdown);
        tasks.extend(limiter.task);

        let server = tokio::spawn(server.serve(shutdown));

        info!(
            addr = %local_addr,
            backends = backends.len(),
            strategy = balancer.strategy_name(),
            limiter = limiter.limiter.name(),
            "Balancer started"
        );

        Ok(RunningApp {
            local_addr,
            trigger,
            server,
            tasks,
            balancer,
            limiter: limiter.limiter,
        })
    }
}

/// Started application.
#[derive(Debug)]
pub struct RunningApp {
    local_addr: SocketAddr,
    trigger: ShutdownTrigger,
    server: JoinHandle<()>,
    tasks: Vec<JoinHandle<()>>,
    balancer: Arc<LoadBalancer>,
    limiter: Arc<dyn RateLimiter>,
}

impl RunningApp {
    /// Address the proxy is listening on.
    #[must_use]
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Get the load balancer.
    #[must_use]
    pub fn balancer(&self) -> &Arc<LoadBalancer> {
        &self.balancer
    }

    /// Get the rate limiter.
    #[must_use]
    pub fn limiter(&self) -> &Arc<dyn RateLimiter> {
        &self.limiter
    }

    /// Stop accepting, drain the server and wait for background tasks.
    pub async fn shutdown(self) {
        self.trigger.trigger();

        if let Err(e) = self.server.await {
            warn!(error = %e, "Server task failed");
        }
        for task in self.tasks {
            if let Err(e) = task.await {
                warn!(error = %e, "Background task failed");
            }
        }

        let lb = self.balancer.stats();
        let rl = self.limiter.stats();
        info!(
            selections = lb.total(),
            failed_selections = lb.failed(),
            admitted = rl.allowed(),
            rejected = rl.denied(),
            clients = self.limiter.client_count(),
            "Balancer stopped"
        );
    }
}
