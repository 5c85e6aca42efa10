//! Configuration validator for procmem
//!
//! Validates configuration values to ensure they are within acceptable ranges.

use super::defaults::MAX_ATTEMPTS_LIMIT;
use super::loader::{Config, ConfigError, LoggingConfig};
use crate::pe::ExportLimits;
use crate::process::EnumerationLimits;
use tracing_subscriber::EnvFilter;

/// Configuration validator
pub struct ConfigValidator;

impl ConfigValidator {
    /// Validates the entire configuration
    pub fn validate(config: &Config) -> Result<(), ConfigError> {
        Self::validate_enumeration(&config.enumeration)?;
        Self::validate_exports(&config.exports)?;
        Self::validate_logging(&config.logging)?;
        Ok(())
    }

    fn validate_enumeration(limits: &EnumerationLimits) -> Result<(), ConfigError> {
        if limits.process_seed == 0 || limits.module_seed == 0 {
            return Err(ConfigError::Invalid(
                "Enumeration seeds must be at least 1".to_string(),
            ));
        }

        if !(1..=MAX_ATTEMPTS_LIMIT).contains(&limits.max_attempts) {
            return Err(ConfigError::Invalid(format!(
                "max_attempts must be between 1 and {}, got {}",
                MAX_ATTEMPTS_LIMIT, limits.max_attempts
            )));
        }

        Ok(())
    }

    fn validate_exports(limits: &ExportLimits) -> Result<(), ConfigError> {
        if limits.max_name_length == 0 {
            return Err(ConfigError::Invalid(
                "Export name length must be at least 1".to_string(),
            ));
        }

        if limits.max_export_count == 0 {
            return Err(ConfigError::Invalid(
                "Export count limit must be at least 1".to_string(),
            ));
        }

        Ok(())
    }

    fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
        EnvFilter::try_new(&logging.level).map_err(|err| {
            ConfigError::Invalid(format!("Invalid log level {:?}: {}", logging.level, err))
        })?;
        Ok(())
    }
}

/// Validates configuration using the default validator
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    ConfigValidator::validate(config)
}
