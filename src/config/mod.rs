//! Configuration module for procmem
//!
//! Provides configuration loading, validation, and default settings for
//! enumeration limits, export parsing bounds and logging.

mod defaults;
mod loader;
mod validator;

pub use defaults::{default_config, DEFAULT_CONFIG_FILE, DEFAULT_LOG_LEVEL, MAX_ATTEMPTS_LIMIT};
pub use loader::{load_config, Config, ConfigError, ConfigLoader, LoggingConfig};
pub use validator::{validate_config, ConfigValidator};

// Configuration result type
pub type ConfigResult<T> = Result<T, ConfigError>;
