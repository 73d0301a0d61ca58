//! Queue entry types
//!
//! Control and data share the queues, but the multiplexing is explicit:
//! tagged variants instead of a null-payload convention. `Shutdown` and
//! `SwapInput` ride the same FIFO as data so that control always takes
//! effect between two messages, never in the middle of one.

use std::fmt;
use std::sync::Arc;

use flowgate_protocol::FlowMessage;

use crate::SlotQueue;

/// Entry on the dispatcher's input queue
#[derive(Clone)]
pub enum DispatchEntry {
    /// A decoded metering message
    Message(Arc<FlowMessage>),
    /// Stop the dispatcher after releasing this slot
    Shutdown,
    /// Switch the dispatcher's input to the carried queue and keep going
    SwapInput(Arc<SlotQueue<DispatchEntry>>),
}

impl fmt::Debug for DispatchEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Message(msg) => f.debug_tuple("Message").field(msg).finish(),
            Self::Shutdown => f.write_str("Shutdown"),
            Self::SwapInput(_) => f.write_str("SwapInput"),
        }
    }
}

/// Entry on a data manager's downstream queue
#[derive(Clone)]
pub enum StoreEntry {
    /// A metering message to hand to the storage plugin
    Message(Arc<FlowMessage>),
    /// Stop the consumer after releasing this slot
    Shutdown,
}

impl fmt::Debug for StoreEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Message(msg) => f.debug_tuple("Message").field(msg).finish(),
            Self::Shutdown => f.write_str("Shutdown"),
        }
    }
}
