//! Process-wide `tracing` subscriber setup.

use crate::config::{LogFormat, LogLevel, LogOutput, LoggingConfig};
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::{SubscriberInitExt, TryInitError};
use tracing_subscriber::{EnvFilter, Layer, Registry};

/// Pick the filter directive: CLI level, then `RUST_LOG`, then config.
#[must_use]
pub fn filter_directive(
    config: &LoggingConfig,
    cli_level: Option<LogLevel>,
    env: Option<&str>,
) -> String {
    if let Some(level) = cli_level {
        return level.to_string();
    }
    match env {
        Some(directive) if !directive.trim().is_empty() => directive.to_string(),
        _ => config.level.to_string(),
    }
}

/// Install the global subscriber.
///
/// An unparsable `RUST_LOG` falls back to the configured level.
///
/// # Errors
///
/// Returns an error if a global subscriber is already installed.
pub fn init(config: &LoggingConfig, cli_level: Option<LogLevel>) -> Result<(), TryInitError> {
    let env = std::env::var(EnvFilter::DEFAULT_ENV).ok();
    let directive = filter_directive(config, cli_level, env.as_deref());
    let filter = EnvFilter::try_new(&directive)
        .unwrap_or_else(|_| EnvFilter::new(config.level.to_string()));

    let writer = match config.output {
        LogOutput::Stdout => BoxMakeWriter::new(std::io::stdout),
        LogOutput::Stderr => BoxMakeWriter::new(std::io::stderr),
    };

    let fmt_layer: Box<dyn Layer<Registry> + Send + Sync> = match config.format {
        LogFormat::Json => tracing_subscriber::fmt::layer()
            .json()
            .with_writer(writer)
            .boxed(),
        LogFormat::Pretty => tracing_subscriber::fmt::layer()
            .pretty()
            .with_writer(writer)
            .boxed(),
        LogFormat::Compact => tracing_subscriber::fmt::layer()
            .compact()
            .with_writer(writer)
            .boxed(),
    };

    tracing_subscriber::registry()
        .with(fmt_layer)
        .with(filter)
        .try_init()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(level: LogLevel) -> LoggingConfig {
        LoggingConfig {
            level,
            ..LoggingConfig::default()
        }
    }

    #[test]
    fn test_cli_level_wins() {
        let directive = filter_directive(
            &config(LogLevel::Warn),
            Some(LogLevel::Trace),
            Some("debug"),
        );
        assert_eq!(directive, "trace");
    }

    #[test]
    fn test_env_beats_config() {
        let directive = filter_directive(
            &config(LogLevel::Warn),
            None,
            Some("throttled_lb=debug"),
        );
        assert_eq!(directive, "throttled_lb=debug");
    }

    #[test]
    fn test_config_fallback() {
        assert_eq!(filter_directive(&config(LogLevel::Error), None, None), "error");
        assert_eq!(
            filter_directive(&config(LogLevel::Error), None, Some("  ")),
            "error"
        );
    }
}
