//! Periodic statistics sampler
//!
//! Reports pipeline throughput, queue occupancy and process resource usage
//! at a fixed interval until cancelled.

use std::sync::Arc;
use std::time::Instant;

use flowgate_config::StatsConfig;
use tokio::time::interval;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::{CpuMonitor, QueueStatsProvider, ThroughputProvider, ThroughputSnapshot};

/// Builder for constructing a [`StatsSampler`]
#[derive(Default)]
pub struct StatsSamplerBuilder {
    config: Option<StatsConfig>,
    throughput: Option<Arc<dyn ThroughputProvider>>,
    queues: Option<Arc<dyn QueueStatsProvider>>,
}

impl StatsSamplerBuilder {
    /// Create a new builder
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the sampler configuration
    pub fn config(mut self, config: StatsConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Set the throughput counter provider
    pub fn throughput(mut self, provider: Arc<dyn ThroughputProvider>) -> Self {
        self.throughput = Some(provider);
        self
    }

    /// Set the queue occupancy provider
    pub fn queues(mut self, provider: Arc<dyn QueueStatsProvider>) -> Self {
        self.queues = Some(provider);
        self
    }

    /// Build the sampler
    pub fn build(self) -> StatsSampler {
        let config = self.config.unwrap_or_default();
        let cpu = config.include_cpu.then(CpuMonitor::new);

        StatsSampler {
            config,
            throughput: self.throughput,
            queues: self.queues,
            cpu,
            previous: None,
        }
    }
}

/// Periodic statistics sampler
///
/// Spawn `run()` as a task; it ticks at the configured interval and exits
/// when the cancellation token fires. The token is checked on every wake
/// regardless of what caused it, so cancellation never races a tick.
pub struct StatsSampler {
    config: StatsConfig,
    throughput: Option<Arc<dyn ThroughputProvider>>,
    queues: Option<Arc<dyn QueueStatsProvider>>,
    cpu: Option<CpuMonitor>,
    previous: Option<(Instant, ThroughputSnapshot)>,
}

impl StatsSampler {
    /// Create a new builder
    pub fn builder() -> StatsSamplerBuilder {
        StatsSamplerBuilder::new()
    }

    /// Run the sampler until cancellation
    pub async fn run(mut self, cancel: CancellationToken) {
        if !self.config.is_active() {
            info!("statistics sampler disabled");
            return;
        }

        let mut ticker = interval(self.config.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        // The first tick completes immediately; use it as the baseline
        // instead of emitting an all-zero report.
        ticker.tick().await;
        self.previous = self
            .throughput
            .as_ref()
            .map(|p| (Instant::now(), p.throughput_snapshot()));

        info!(
            interval_secs = self.config.interval.as_secs(),
            "statistics sampler started"
        );

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("statistics sampler shutting down");
                    break;
                }
                _ = ticker.tick() => {
                    self.report();
                }
            }
        }
    }

    /// Collect and report one sample
    fn report(&mut self) {
        if let Some(provider) = &self.throughput {
            let now = Instant::now();
            let snapshot = provider.throughput_snapshot();

            match self.previous {
                Some((at, prev)) => {
                    let elapsed = now.duration_since(at).as_secs_f64().max(f64::EPSILON);
                    let delta = snapshot.diff(&prev);
                    info!(
                        total_packets = snapshot.packets,
                        total_records = snapshot.records,
                        packets_per_sec = (delta.packets as f64 / elapsed) as u64,
                        records_per_sec = (delta.records as f64 / elapsed) as u64,
                        "throughput"
                    );
                }
                None => {
                    info!(
                        total_packets = snapshot.packets,
                        total_records = snapshot.records,
                        "throughput"
                    );
                }
            }

            self.previous = Some((now, snapshot));
        }

        if self.config.include_queues
            && let Some(provider) = &self.queues
        {
            for stats in provider.queue_stats() {
                info!(
                    queue = %stats.name,
                    used = stats.used,
                    capacity = stats.capacity,
                    "queue usage"
                );
            }
        }

        if self.config.include_cpu
            && let Some(cpu) = &mut self.cpu
        {
            let usage = cpu.refresh();
            info!(
                cpu_percent = %format_args!("{:.2}", usage.cpu_percent),
                memory_mb = %format_args!("{:.1}", usage.memory_mb),
                "process usage"
            );
        }
    }
}
