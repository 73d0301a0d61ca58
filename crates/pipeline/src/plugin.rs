//! Storage plugin contract
//!
//! Storage plugins are external consumers attached to a data manager's
//! downstream queue. The pipeline drives each attached instance from its
//! own consumer task; the plugin only implements `store`.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use flowgate_protocol::{FlowMessage, Odid};

/// Storage plugin identifier
///
/// Assigned on attach and used for later detachment. Stable for the
/// lifetime of the registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PluginId(u32);

impl PluginId {
    /// Create a plugin ID from its numeric value
    #[inline]
    #[must_use]
    pub const fn new(value: u32) -> Self {
        Self(value)
    }

    /// Get the numeric value
    #[inline]
    #[must_use]
    pub const fn as_u32(self) -> u32 {
        self.0
    }
}

impl fmt::Display for PluginId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "plugin:{}", self.0)
    }
}

/// Error returned by a storage plugin's `store`
#[derive(Debug, Error)]
pub enum StoreError {
    /// Writing the message to the backing store failed
    #[error("write failed: {0}")]
    Write(String),

    /// I/O error from the backing store
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl StoreError {
    /// Create a write error
    pub fn write(msg: impl Into<String>) -> Self {
        Self::Write(msg.into())
    }
}

/// A storage backend consuming messages from a data manager's queue
///
/// Implementations are shared (`Arc`) across the pipelines they are
/// attached to; one consumer task per attachment calls `store` for every
/// message in arrival order. A `store` error is logged and the consumer
/// keeps going - a failing backend loses its own data only.
#[async_trait]
pub trait StoragePlugin: Send + Sync {
    /// Human-readable name for logging
    fn name(&self) -> &str;

    /// Persist one message
    async fn store(&self, message: &FlowMessage) -> Result<(), StoreError>;
}

/// A plugin registration retained by the registry
///
/// Retained descriptors are re-applied when a data manager for a new ODID
/// is created, so a broadcast plugin also reaches pipelines that appear
/// after it was attached.
#[derive(Clone)]
pub(crate) struct RegisteredPlugin {
    pub id: PluginId,
    /// Target ODID; `None` means broadcast (every pipeline)
    pub odid: Option<Odid>,
    pub plugin: Arc<dyn StoragePlugin>,
}
