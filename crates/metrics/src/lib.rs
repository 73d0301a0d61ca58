//! Flowgate metrics
//!
//! Periodic statistics sampling for the collector pipeline.
//!
//! # Overview
//!
//! The [`StatsSampler`] runs as a cancellable background task. Each tick it
//! snapshots the pipeline's global counters through a
//! [`ThroughputProvider`], computes deltas since the previous tick, reads
//! queue occupancy through a [`QueueStatsProvider`] and samples process
//! CPU/memory usage, then reports everything via `tracing`.
//!
//! The pipeline crate implements the provider traits; this crate never
//! depends on pipeline internals.

mod cpu;
mod sampler;
mod snapshot;

pub use cpu::{CpuMonitor, CpuSnapshot};
pub use sampler::{StatsSampler, StatsSamplerBuilder};
pub use snapshot::{QueueStats, QueueStatsProvider, ThroughputProvider, ThroughputSnapshot};
