//! Flowgate configuration
//!
//! TOML-based configuration loading with sensible defaults. A minimal
//! config should just work - only specify what you need to change.
//!
//! # Parsing
//!
//! Use the `FromStr` trait to parse configuration:
//!
//! ```
//! use flowgate_config::Config;
//! use std::str::FromStr;
//!
//! let config = Config::from_str("[stats]\ninterval = \"30s\"").unwrap();
//! assert_eq!(config.stats.interval.as_secs(), 30);
//! ```
//!
//! # Example Config
//!
//! ```toml
//! [collector]
//! queue_capacity = 8192
//! max_data_managers = 1024
//!
//! [stats]
//! interval = "60s"
//!
//! [log]
//! level = "info"
//! ```

mod collector;
mod error;
mod logging;
mod stats;

pub use collector::CollectorConfig;
pub use error::{ConfigError, Result};
pub use logging::{LogConfig, LogLevel};
pub use stats::StatsConfig;

use std::fs;
use std::path::Path;
use std::str::FromStr;

use serde::Deserialize;

/// Main configuration structure
///
/// All sections are optional with sensible defaults.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Pipeline sizing
    pub collector: CollectorConfig,

    /// Periodic statistics report
    pub stats: StatsConfig,

    /// Internal logging
    pub log: LogConfig,
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_str(&contents)
    }

    /// Validate the configuration
    ///
    /// Called automatically by `from_file`/`from_str`; exposed for
    /// programmatically built configs.
    pub fn validate(&self) -> Result<()> {
        if self.collector.queue_capacity == 0 {
            return Err(ConfigError::Validation(
                "collector.queue_capacity must be at least 1".into(),
            ));
        }
        if self.collector.max_data_managers == 0 {
            return Err(ConfigError::Validation(
                "collector.max_data_managers must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

impl FromStr for Config {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self> {
        let config: Config = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }
}
