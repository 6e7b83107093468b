//! Configuration file loader.

use super::error::{ConfigError, ConfigResult};
use super::types::BalancerConfig;
use super::validation::{ValidationResult, Validator};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Where a resolved configuration came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigSource {
    /// Read from this file.
    File(PathBuf),
    /// Built-in defaults; this implicit default file does not exist.
    Defaults(PathBuf),
}

/// Configuration loader with validation support.
#[derive(Debug, Default)]
pub struct ConfigLoader {
    /// Validators to run on loaded configuration.
    validators: Vec<Box<dyn Validator>>,
}

impl ConfigLoader {
    /// Create a new configuration loader.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a validator to the loader.
    #[must_use]
    pub fn with_validator<V: Validator + 'static>(mut self, validator: V) -> Self {
        self.validators.push(Box::new(validator));
        self
    }

    /// Load configuration from a file path.
    ///
    /// # Errors
    ///
    /// Returns an error if the file is missing or unreadable, the TOML is
    /// malformed, or any validator reports an error.
    pub fn load<P: AsRef<Path>>(&self, path: P) -> ConfigResult<BalancerConfig> {
        let path = path.as_ref();

        let content = std::fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ConfigError::NotFound(path.to_path_buf())
            } else {
                ConfigError::ReadError {
                    path: path.to_path_buf(),
                    source: e,
                }
            }
        })?;

        let config = self.load_str(&content)?;
        debug!(path = %path.display(), "Configuration loaded");
        Ok(config)
    }

    /// Load configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML is malformed or validation fails.
    pub fn load_str(&self, content: &str) -> ConfigResult<BalancerConfig> {
        let config: BalancerConfig = toml::from_str(content)?;
        self.validate(&config)?;
        Ok(config)
    }

    /// Run every registered validator.
    ///
    /// Warnings are logged; errors from all validators are collected into a
    /// single [`ConfigError::ValidationError`].
    ///
    /// # Errors
    ///
    /// Returns an error if any validator reports an error.
    pub fn validate(&self, config: &BalancerConfig) -> ConfigResult<()> {
        let mut combined = ValidationResult::new();
        for validator in &self.validators {
            combined.merge(validator.validate(config));
        }

        for warning in combined.warnings() {
            warn!(field = %warning.field, "{}", warning.message);
        }

        if combined.is_valid() {
            return Ok(());
        }

        let errors: Vec<String> = combined
            .errors_only()
            .iter()
            .map(|e| format!("{}: {}", e.field, e.message))
            .collect();
        Err(ConfigError::ValidationError(errors.join("; ")))
    }

    /// Load configuration or return default if file doesn't exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read, parsed or
    /// validated.
    pub fn load_or_default<P: AsRef<Path>>(&self, path: P) -> ConfigResult<BalancerConfig> {
        let path = path.as_ref();
        match self.load(path) {
            Err(ConfigError::NotFound(_)) => {
                info!(path = %path.display(), "No configuration file, using defaults");
                let config = BalancerConfig::default();
                self.validate(&config)?;
                Ok(config)
            },
            other => other,
        }
    }

    /// Load an explicitly requested file, or the implicit default file.
    ///
    /// A missing `explicit` path is an error. A missing `default_path`
    /// yields defaults with [`ConfigSource::Defaults`]. Nothing is logged,
    /// so callers can resolve the config before installing a subscriber.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::NotFound`] for a missing explicit path, or any
    /// read, parse or validation error.
    pub fn resolve<P: AsRef<Path>>(
        &self,
        explicit: Option<&Path>,
        default_path: P,
    ) -> ConfigResult<(BalancerConfig, ConfigSource)> {
        if let Some(path) = explicit {
            let config = self.load(path)?;
            return Ok((config, ConfigSource::File(path.to_path_buf())));
        }

        let path = default_path.as_ref();
        match self.load(path) {
            Ok(config) => Ok((config, ConfigSource::File(path.to_path_buf()))),
            Err(ConfigError::NotFound(_)) => {
                let config = BalancerConfig::default();
                self.validate(&config)?;
                Ok((config, ConfigSource::Defaults(path.to_path_buf())))
            },
            Err(e) => Err(e),
        }
    }

    /// Save configuration to a file.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or writing fails.
    pub fn save<P: AsRef<Path>>(&self, config: &BalancerConfig, path: P) -> ConfigResult<()> {
        let path = path.as_ref();
        let content = toml::to_string_pretty(config)?;
        std::fs::write(path, content).map_err(|e| ConfigError::WriteError {
            path: path.to_path_buf(),
            source: e,
        })?;
        Ok(())
    }
}
