//! Statistics sampler configuration
//!
//! Controls the periodic throughput/occupancy report.
//!
//! # Defaults
//!
//! The sampler is enabled by default at a 60s interval with all report
//! sections included, so a minimal config gets observability out of the
//! box.

use serde::Deserialize;
use std::time::Duration;

/// Statistics sampler configuration
///
/// # Example
///
/// ```toml
/// [stats]
/// enabled = true
/// interval = "60s"
/// include_cpu = true
/// include_queues = true
/// ```
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StatsConfig {
    /// Enable the periodic report
    /// Default: true
    pub enabled: bool,

    /// Sampling interval; zero disables the sampler
    /// Default: 60s
    #[serde(with = "humantime_serde")]
    pub interval: Duration,

    /// Include process CPU/memory usage in the report
    /// Default: true
    pub include_cpu: bool,

    /// Include queue occupancy in the report
    /// Default: true
    pub include_queues: bool,
}

impl StatsConfig {
    /// Whether the sampler should run at all
    #[inline]
    pub fn is_active(&self) -> bool {
        self.enabled && !self.interval.is_zero()
    }
}

impl Default for StatsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval: Duration::from_secs(60),
            include_cpu: true,
            include_queues: true,
        }
    }
}
