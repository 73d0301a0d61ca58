//! Flowgate pipeline - message distribution core
//!
//! Routes decoded metering messages from one input queue into per-ODID
//! data managers, each fanning out to its attached storage plugins.
//!
//! # Architecture
//!
//! ```text
//! [Decoder]                [Dispatcher]                  [Storage plugins]
//!    │                                                  ┌──→ consumer ──→ plugin A
//!    └──→ SlotQueue ──→ route by ODID ──→ SlotQueue(100)┴──→ consumer ──→ plugin B
//!          (input)        │   create/destroy
//!                         └─────────────→ SlotQueue(200)───→ consumer ──→ plugin A
//! ```
//!
//! # Key Design
//!
//! - **Reference-counted slots**: [`SlotQueue`] recycles a slot only after
//!   every registered reader acknowledged it, so one queue feeds several
//!   independent consumers without copying.
//! - **Explicit control entries**: shutdown and input hot-swap ride the
//!   data FIFO as tagged variants, so control always lands between two
//!   messages.
//! - **Single routing task**: the dispatcher owns registry mutation on the
//!   hot path; attach/detach synchronize through the same registry mutex.
//! - **Backpressure by blocking**: full queues suspend the writer; drops
//!   happen only on resource-exhaustion and closed-downstream error paths.
//!
//! # Example
//!
//! ```ignore
//! use flowgate_pipeline::{DispatchEntry, Distributor};
//!
//! let mut distributor = Distributor::new(&config);
//! distributor.attach_plugin(plugin, None);
//! distributor.start()?;
//!
//! let input = distributor.input_queue();
//! input.write(DispatchEntry::Message(msg), 1).await?;
//!
//! distributor.close().await;
//! ```

mod consumer;
mod dispatcher;
mod distributor;
mod entry;
mod error;
mod metrics;
mod plugin;
mod registry;
mod slot_queue;
mod stream;
mod templates;

pub use distributor::{Distributor, DistributorStatsHandle};
pub use entry::{DispatchEntry, StoreEntry};
pub use error::{PipelineError, Result};
pub use metrics::DistributorCounters;
pub use plugin::{PluginId, StoragePlugin, StoreError};
pub use slot_queue::{QueueClosed, QueueDepth, SlotQueue, SlotReader, SlotTicket};
pub use templates::TemplateStore;

// Re-export key types from dependencies for convenience
pub use flowgate_protocol::{FlowMessage, Odid, SourceStatus};
