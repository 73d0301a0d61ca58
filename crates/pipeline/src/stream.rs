//! Per-ODID data manager record
//!
//! One `StreamPipeline` per active observation domain: the source
//! reference count, the downstream slot queue, and the consumer task per
//! attached storage plugin.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use flowgate_metrics::QueueStats;
use flowgate_protocol::Odid;

use crate::consumer::run_consumer;
use crate::entry::StoreEntry;
use crate::plugin::{PluginId, RegisteredPlugin};
use crate::slot_queue::SlotQueue;

/// One running consumer attachment
pub(crate) struct ConsumerHandle {
    id: PluginId,
    name: String,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl ConsumerHandle {
    /// Ask the consumer to stop
    pub(crate) fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Wait for the consumer task to finish
    pub(crate) async fn join(self) {
        if let Err(error) = self.task.await {
            warn!(plugin = %self.name, %error, "storage consumer task panicked");
        }
    }
}

/// Per-ODID pipeline record ("data manager")
///
/// Created by the dispatcher on first sight of an ODID, destroyed when its
/// source reference count drops to zero. The downstream queue fans every
/// forwarded message out to the attached consumers.
pub(crate) struct StreamPipeline {
    odid: Odid,
    /// Open upstream sources for this ODID
    sources: u32,
    queue: Arc<SlotQueue<StoreEntry>>,
    consumers: Vec<ConsumerHandle>,
}

impl StreamPipeline {
    /// Create a record with an empty consumer set
    pub(crate) fn new(odid: Odid, queue_capacity: usize) -> Self {
        Self {
            odid,
            sources: 0,
            queue: Arc::new(SlotQueue::new(queue_capacity)),
            consumers: Vec::new(),
        }
    }

    #[inline]
    pub(crate) fn odid(&self) -> Odid {
        self.odid
    }

    #[inline]
    pub(crate) fn sources(&self) -> u32 {
        self.sources
    }

    /// A source session opened for this ODID
    pub(crate) fn add_source(&mut self) {
        self.sources += 1;
    }

    /// A source session closed for this ODID
    ///
    /// Returns the remaining count; at zero the caller unlinks and tears
    /// the record down.
    pub(crate) fn remove_source(&mut self) -> u32 {
        self.sources = self.sources.saturating_sub(1);
        self.sources
    }

    /// Handle to the downstream queue
    #[inline]
    pub(crate) fn queue(&self) -> Arc<SlotQueue<StoreEntry>> {
        Arc::clone(&self.queue)
    }

    /// Number of attached storage consumers
    #[inline]
    pub(crate) fn consumer_count(&self) -> usize {
        self.consumers.len()
    }

    /// Whether the given plugin is attached here
    pub(crate) fn has_plugin(&self, id: PluginId) -> bool {
        self.consumers.iter().any(|c| c.id == id)
    }

    /// Attach a storage plugin: spawn its consumer task on this record's
    /// downstream queue
    pub(crate) fn attach(&mut self, registered: &RegisteredPlugin) {
        let cancel = CancellationToken::new();
        let reader = self.queue.reader();
        let plugin = Arc::clone(&registered.plugin);
        let name = plugin.name().to_string();
        let task = tokio::spawn(run_consumer(reader, plugin, self.odid, cancel.clone()));

        debug!(odid = %self.odid, plugin = %name, id = %registered.id, "storage plugin attached");

        self.consumers.push(ConsumerHandle {
            id: registered.id,
            name,
            cancel,
            task,
        });
    }

    /// Detach a plugin by id
    ///
    /// Cancels the consumer and returns its handle so the caller can await
    /// it outside any lock. `None` if the plugin is not attached here.
    pub(crate) fn detach(&mut self, id: PluginId) -> Option<ConsumerHandle> {
        let index = self.consumers.iter().position(|c| c.id == id)?;
        let handle = self.consumers.remove(index);
        handle.cancel();
        debug!(odid = %self.odid, id = %id, "storage plugin detached");
        Some(handle)
    }

    /// Current downstream queue occupancy for the statistics report
    pub(crate) fn queue_stats(&self) -> QueueStats {
        let depth = self.queue.depth();
        QueueStats {
            name: format!("odid {}", self.odid),
            used: depth.used,
            capacity: depth.capacity,
        }
    }

    /// Drain and stop this record
    ///
    /// Broadcasts the shutdown marker so every consumer finishes the
    /// messages already queued ahead of it, closes the queue, and joins
    /// the consumer tasks.
    pub(crate) async fn teardown(mut self) {
        if self.queue.broadcast(StoreEntry::Shutdown).await.is_err() {
            debug!(odid = %self.odid, "downstream queue already closed");
        }
        self.queue.close();

        for handle in self.consumers.drain(..) {
            handle.join().await;
        }
    }
}
