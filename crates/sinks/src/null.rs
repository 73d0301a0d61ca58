//! Null sink - discards all data
//!
//! Receives messages, updates counters, and immediately discards the
//! payload. Useful for measuring pure pipeline throughput and for tests
//! that only care about delivery counts.

use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;

use flowgate_pipeline::{StoragePlugin, StoreError};
use flowgate_protocol::FlowMessage;

/// Point-in-time snapshot of null sink counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NullSinkSnapshot {
    pub messages: u64,
    pub records: u64,
    pub bytes: u64,
}

/// Storage plugin that discards everything it stores
#[derive(Debug, Default)]
pub struct NullSink {
    messages: AtomicU64,
    records: AtomicU64,
    bytes: AtomicU64,
}

impl NullSink {
    /// Create a new null sink with all counters at zero
    pub fn new() -> Self {
        Self::default()
    }

    /// Messages stored so far
    #[inline]
    pub fn messages(&self) -> u64 {
        self.messages.load(Ordering::Relaxed)
    }

    /// Data records stored so far
    #[inline]
    pub fn records(&self) -> u64 {
        self.records.load(Ordering::Relaxed)
    }

    /// Payload bytes stored so far
    #[inline]
    pub fn bytes(&self) -> u64 {
        self.bytes.load(Ordering::Relaxed)
    }

    /// Get a snapshot of all counters
    pub fn snapshot(&self) -> NullSinkSnapshot {
        NullSinkSnapshot {
            messages: self.messages.load(Ordering::Relaxed),
            records: self.records.load(Ordering::Relaxed),
            bytes: self.bytes.load(Ordering::Relaxed),
        }
    }
}

#[async_trait]
impl StoragePlugin for NullSink {
    fn name(&self) -> &str {
        "null"
    }

    async fn store(&self, message: &FlowMessage) -> Result<(), StoreError> {
        self.messages.fetch_add(1, Ordering::Relaxed);
        self.records
            .fetch_add(message.records() as u64, Ordering::Relaxed);
        self.bytes
            .fetch_add(message.payload_len() as u64, Ordering::Relaxed);
        // payload dropped with the message reference
        Ok(())
    }
}
