//! Errors raised while loading, validating or saving `throttled-lb` config.

use std::path::PathBuf;
use thiserror::Error;

/// Configuration errors. All of them are fatal at startup.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The config file exists but could not be read.
    #[error("cannot read config '{path}': {source}")]
    ReadError {
        /// File that was being read.
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// [`ConfigLoader::save`](super::ConfigLoader::save) could not write.
    #[error("cannot write config '{path}': {source}")]
    WriteError {
        /// File that was being written.
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Malformed TOML, an unknown strategy name, or a bad duration.
    #[error("invalid TOML: {0}")]
    ParseError(#[from] toml::de::Error),

    /// One or more validator errors, joined as `field: message; ...`.
    #[error("invalid configuration: {0}")]
    ValidationError(String),

    /// No file at the given path.
    #[error("config file not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("cannot serialize config: {0}")]
    SerializeError(#[from] toml::ser::Error),
}

/// Result type for configuration operations.
pub type ConfigResult<T> = Result<T, ConfigError>;
