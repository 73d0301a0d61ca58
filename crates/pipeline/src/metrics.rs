//! Global pipeline counters
//!
//! Process-wide totals of dispatched packets and data records. All
//! operations use relaxed ordering; the statistics sampler only needs an
//! eventually consistent snapshot.

use std::sync::atomic::{AtomicU64, Ordering};

use flowgate_metrics::ThroughputSnapshot;

/// Global packet/record counters
///
/// Incremented by the dispatcher for every ordinary data message it
/// forwards; read lock-free by the statistics sampler.
#[derive(Debug, Default)]
pub struct DistributorCounters {
    /// Messages dispatched downstream
    packets: AtomicU64,

    /// Data records carried by those messages
    records: AtomicU64,
}

impl DistributorCounters {
    /// Create a new counter set at zero
    #[inline]
    pub const fn new() -> Self {
        Self {
            packets: AtomicU64::new(0),
            records: AtomicU64::new(0),
        }
    }

    /// Record one dispatched message carrying `records` data records
    #[inline]
    pub fn record_message(&self, records: u32) {
        self.packets.fetch_add(1, Ordering::Relaxed);
        self.records.fetch_add(records as u64, Ordering::Relaxed);
    }

    /// Get total messages dispatched
    #[inline]
    pub fn packets(&self) -> u64 {
        self.packets.load(Ordering::Relaxed)
    }

    /// Get total data records dispatched
    #[inline]
    pub fn records(&self) -> u64 {
        self.records.load(Ordering::Relaxed)
    }

    /// Get a point-in-time snapshot
    #[inline]
    pub fn snapshot(&self) -> ThroughputSnapshot {
        ThroughputSnapshot {
            packets: self.packets.load(Ordering::Relaxed),
            records: self.records.load(Ordering::Relaxed),
        }
    }
}
