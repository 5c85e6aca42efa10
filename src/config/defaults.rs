//! Default configuration values for procmem

use super::loader::{Config, LoggingConfig};
use crate::pe::ExportLimits;
use crate::process::EnumerationLimits;

/// File read when no `--config` is given
pub const DEFAULT_CONFIG_FILE: &str = "procmem.toml";

/// Filter directive used when neither `RUST_LOG` nor the file sets one
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Upper bound accepted for `enumeration.max_attempts`
pub const MAX_ATTEMPTS_LIMIT: usize = 16;

/// Returns the default configuration
pub fn default_config() -> Config {
    Config {
        enumeration: EnumerationLimits::default(),
        exports: ExportLimits::default(),
        logging: LoggingConfig {
            level: DEFAULT_LOG_LEVEL.to_string(),
        },
    }
}
