//! throttled-lb binary entry point.

use anyhow::{Context, Result};
use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use throttled_lb::app::App;
use throttled_lb::config::{BalancerConfig, BasicValidator, ConfigLoader, ConfigSource, LogLevel};
use throttled_lb::logging;
use tracing::{error, info, warn};

/// Config file read when `--config` is not given.
const DEFAULT_CONFIG: &str = "config/config.toml";

#[derive(Parser)]
#[command(name = "throttled-lb")]
#[command(version, about = "Reverse-proxy load balancer with per-client rate limiting", long_about = None)]
struct Cli {
    /// Config file path; must exist when given [default: config/config.toml]
    #[arg(long, short)]
    config: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long)]
    log_level: Option<LogLevel>,

    /// Listen address, overriding the config file
    #[arg(long)]
    listen: Option<SocketAddr>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let loader = ConfigLoader::new().with_validator(BasicValidator::new());
    // Validated below, once warnings can be logged.
    let (mut config, source) = ConfigLoader::new()
        .resolve(cli.config.as_deref(), DEFAULT_CONFIG)
        .with_context(|| match &cli.config {
            Some(path) => format!("Failed to load {}", path.display()),
            None => format!("Failed to load {DEFAULT_CONFIG}"),
        })?;
    if let Some(listen) = cli.listen {
        config.server.listen = listen;
    }

    logging::init(&config.logging, cli.log_level).context("Failed to install logger")?;
    match &source {
        ConfigSource::File(path) => info!(path = %path.display(), "Configuration loaded"),
        ConfigSource::Defaults(path) => {
            warn!(path = %path.display(), "No configuration file, using defaults");
        },
    }
    loader.validate(&config).context("Invalid configuration")?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to build runtime")?;

    runtime.block_on(run(config))
}

async fn run(config: BalancerConfig) -> Result<()> {
    let app = App::new(config)
        .start()
        .await
        .context("Failed to start balancer")?;
    info!(addr = %app.local_addr(), "Press Ctrl-C to stop");

    shutdown_signal().await;
    info!("Shutdown signal received");
    app.shutdown().await;
    Ok(())
}

/// Resolve on SIGINT or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            },
            Err(e) => {
                error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            },
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
}
