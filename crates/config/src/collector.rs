//! Collector pipeline settings
//!
//! Sizing knobs for the distribution pipeline. All fields have defaults;
//! a minimal config needs no `[collector]` section at all.

use serde::Deserialize;

/// Collector pipeline configuration
///
/// # Example
///
/// ```toml
/// [collector]
/// queue_capacity = 8192
/// max_data_managers = 1024
/// ```
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CollectorConfig {
    /// Capacity of every slot queue (input and per-ODID)
    /// Default: 8192
    pub queue_capacity: usize,

    /// Upper bound on concurrently active per-ODID pipelines
    ///
    /// Messages for a new ODID past this bound are dropped with a warning.
    /// Default: 1024
    pub max_data_managers: usize,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 8192,
            max_data_managers: 1024,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = CollectorConfig::default();
        assert_eq!(config.queue_capacity, 8192);
        assert_eq!(config.max_data_managers, 1024);
    }

    #[test]
    fn test_deserialize_empty() {
        let config: CollectorConfig = toml::from_str("").unwrap();
        assert_eq!(config.queue_capacity, 8192);
    }

    #[test]
    fn test_deserialize_partial() {
        let config: CollectorConfig = toml::from_str("queue_capacity = 64").unwrap();
        assert_eq!(config.queue_capacity, 64);
        assert_eq!(config.max_data_managers, 1024);
    }
}
