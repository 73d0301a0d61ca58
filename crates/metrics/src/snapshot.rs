//! Snapshot types and provider traits
//!
//! The sampler talks to the pipeline exclusively through these traits, so
//! the dependency points from the pipeline crate to this one and the
//! sampler stays testable with stub providers.

/// Point-in-time totals of the pipeline's global counters
///
/// Counters are updated with relaxed atomics; a snapshot is eventually
/// consistent, which is sufficient for rate reporting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ThroughputSnapshot {
    /// Total messages dispatched downstream
    pub packets: u64,
    /// Total data records carried by those messages
    pub records: u64,
}

impl ThroughputSnapshot {
    /// Calculate the difference from an earlier snapshot
    ///
    /// Saturating, so a counter reset never underflows.
    #[inline]
    pub fn diff(&self, previous: &ThroughputSnapshot) -> ThroughputSnapshot {
        ThroughputSnapshot {
            packets: self.packets.saturating_sub(previous.packets),
            records: self.records.saturating_sub(previous.records),
        }
    }
}

/// Occupancy of one bounded queue
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueStats {
    /// Queue label for the report ("input" or the ODID)
    pub name: String,
    /// Slots currently occupied
    pub used: usize,
    /// Fixed capacity
    pub capacity: usize,
}

/// Source of global throughput counters
pub trait ThroughputProvider: Send + Sync {
    /// Get a snapshot of the global counters
    fn throughput_snapshot(&self) -> ThroughputSnapshot;
}

/// Source of per-queue occupancy figures
///
/// Implementations report the dispatcher's input queue first, followed by
/// every active per-ODID queue.
pub trait QueueStatsProvider: Send + Sync {
    /// Get current occupancy of all pipeline queues
    fn queue_stats(&self) -> Vec<QueueStats>;
}
