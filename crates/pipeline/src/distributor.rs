//! Distributor - lifecycle owner of the distribution pipeline
//!
//! The explicitly constructed, explicitly owned pipeline state: the input
//! queue, the data manager registry, the global counters, and the running
//! dispatcher/sampler tasks. Lifecycle is ordinary object lifetime:
//! `new` allocates, `start` spawns, `close` drains and joins.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use flowgate_config::{Config, StatsConfig};
use flowgate_metrics::{QueueStats, QueueStatsProvider, StatsSampler, ThroughputProvider, ThroughputSnapshot};
use flowgate_protocol::Odid;

use crate::dispatcher::Dispatcher;
use crate::entry::DispatchEntry;
use crate::error::{PipelineError, Result};
use crate::metrics::DistributorCounters;
use crate::plugin::{PluginId, StoragePlugin};
use crate::registry::Registry;
use crate::slot_queue::{QueueClosed, SlotQueue};
use crate::templates::TemplateStore;

/// State shared between the distributor, the dispatcher task and the
/// statistics handle
pub(crate) struct Shared {
    pub(crate) registry: Mutex<Registry>,
    pub(crate) counters: DistributorCounters,
    /// The dispatcher's current input queue; replaced on hot-swap
    pub(crate) input: Mutex<Arc<SlotQueue<DispatchEntry>>>,
    /// Bumped by the dispatcher after adopting a new input queue
    pub(crate) swap_epoch: watch::Sender<u64>,
    pub(crate) templates: Option<Arc<dyn TemplateStore>>,
}

struct Running {
    dispatcher: JoinHandle<()>,
    sampler: Option<(CancellationToken, JoinHandle<()>)>,
}

/// Lifecycle owner of the message distribution pipeline
///
/// # Example
///
/// ```ignore
/// let mut distributor = Distributor::new(&config);
/// distributor.attach_plugin(Arc::new(MySink::new()), None);
/// distributor.start()?;
///
/// let input = distributor.input_queue();
/// // upstream decoder writes DispatchEntry::Message entries into `input`
///
/// distributor.close().await;
/// ```
pub struct Distributor {
    shared: Arc<Shared>,
    swap_rx: watch::Receiver<u64>,
    stats: StatsConfig,
    running: Option<Running>,
}

impl Distributor {
    /// Create the pipeline state without a template collaborator
    pub fn new(config: &Config) -> Self {
        Self::build(config, None)
    }

    /// Create the pipeline state with a template collaborator
    ///
    /// `templates.release_odid` is invoked exactly once per data manager
    /// teardown.
    pub fn with_templates(config: &Config, templates: Arc<dyn TemplateStore>) -> Self {
        Self::build(config, Some(templates))
    }

    fn build(config: &Config, templates: Option<Arc<dyn TemplateStore>>) -> Self {
        let registry = Registry::new(
            config.collector.queue_capacity,
            config.collector.max_data_managers,
        );
        let input = Arc::new(SlotQueue::new(config.collector.queue_capacity));
        let (swap_tx, swap_rx) = watch::channel(0);

        Self {
            shared: Arc::new(Shared {
                registry: Mutex::new(registry),
                counters: DistributorCounters::new(),
                input: Mutex::new(input),
                swap_epoch: swap_tx,
                templates,
            }),
            swap_rx,
            stats: config.stats.clone(),
            running: None,
        }
    }

    /// Spawn the dispatcher (and the statistics sampler when configured)
    ///
    /// Fails when the dispatcher is already running.
    pub fn start(&mut self) -> Result<()> {
        if self.running.is_some() {
            return Err(PipelineError::AlreadyRunning);
        }

        // start at the head: anything the decoder queued before `start`
        // is still delivered
        let reader = self.shared.input.lock().reader_from_head();
        let dispatcher = Dispatcher::new(reader, Arc::clone(&self.shared));
        let dispatcher = tokio::spawn(dispatcher.run());

        let sampler = if self.stats.is_active() {
            let cancel = CancellationToken::new();
            let throughput: Arc<dyn ThroughputProvider> = Arc::new(self.stats_handle());
            let queues: Arc<dyn QueueStatsProvider> = Arc::new(self.stats_handle());
            let sampler = StatsSampler::builder()
                .config(self.stats.clone())
                .throughput(throughput)
                .queues(queues)
                .build();
            let task = tokio::spawn(sampler.run(cancel.clone()));
            Some((cancel, task))
        } else {
            None
        };

        self.running = Some(Running {
            dispatcher,
            sampler,
        });

        info!(
            stats_enabled = self.stats.is_active(),
            "distributor started"
        );
        Ok(())
    }

    /// Whether the dispatcher is currently running
    pub fn is_running(&self) -> bool {
        self.running.is_some()
    }

    /// Shut the pipeline down
    ///
    /// Enqueues the shutdown marker into the current input queue, joins
    /// the dispatcher, stops the sampler, then tears down every remaining
    /// data manager record.
    pub async fn close(mut self) {
        if let Some(running) = self.running.take() {
            let input = Arc::clone(&*self.shared.input.lock());
            if input.write(DispatchEntry::Shutdown, 1).await.is_err() {
                warn!("input queue already closed");
            }

            if let Err(error) = running.dispatcher.await {
                warn!(%error, "dispatcher task panicked");
            }

            if let Some((cancel, task)) = running.sampler {
                cancel.cancel();
                if let Err(error) = task.await {
                    warn!(%error, "statistics sampler task panicked");
                }
            }
        }

        let streams = self.shared.registry.lock().drain();
        for stream in streams {
            stream.teardown().await;
        }

        info!("distributor closed");
    }

    /// Handle to the current input queue
    ///
    /// The upstream decoder writes `DispatchEntry::Message` entries into
    /// it with an initial reference count of 1.
    pub fn input_queue(&self) -> Arc<SlotQueue<DispatchEntry>> {
        Arc::clone(&*self.shared.input.lock())
    }

    /// Redirect the dispatcher to a new input queue
    ///
    /// When the dispatcher is not running the swap applies immediately.
    /// When running, a `SwapInput` entry is enqueued into the *current*
    /// input queue and this call waits until the dispatcher has adopted
    /// the new queue, so the swap lands between two messages and the old
    /// and new queues are never read concurrently.
    pub async fn swap_input(&mut self, queue: Arc<SlotQueue<DispatchEntry>>) -> Result<()> {
        if self.running.is_none() {
            *self.shared.input.lock() = queue;
            return Ok(());
        }

        let current = Arc::clone(&*self.shared.input.lock());
        if Arc::ptr_eq(&current, &queue) {
            return Ok(());
        }

        let mut epoch = self.swap_rx.clone();
        epoch.mark_unchanged();
        current
            .write(DispatchEntry::SwapInput(Arc::clone(&queue)), 1)
            .await?;

        loop {
            if Arc::ptr_eq(&*self.shared.input.lock(), &queue) {
                return Ok(());
            }
            if epoch.changed().await.is_err() {
                // sender lives in Shared; unreachable while self exists
                return Err(PipelineError::InputClosed(QueueClosed));
            }
        }
    }

    /// Attach a storage plugin
    ///
    /// With a target ODID the plugin is attached to that ODID's pipeline
    /// (if it exists); without one it is attached to every currently
    /// existing pipeline. The registration is retained and re-applied to
    /// pipelines created later. Returns the id used for detachment.
    pub fn attach_plugin(&self, plugin: Arc<dyn StoragePlugin>, odid: Option<Odid>) -> PluginId {
        let name = plugin.name().to_string();
        let id = self.shared.registry.lock().register_plugin(plugin, odid);
        match odid {
            Some(target) => info!(%id, plugin = %name, odid = %target, "storage plugin registered"),
            None => info!(%id, plugin = %name, "storage plugin registered for all ODIDs"),
        }
        id
    }

    /// Detach a storage plugin by id
    ///
    /// Cancels its consumer tasks and waits for them to finish; slots
    /// already written with the old fan-out count are satisfied by the
    /// departing consumers as they stop. An unknown id is a no-op.
    pub async fn detach_plugin(&self, id: PluginId) {
        let handles = self.shared.registry.lock().unregister_plugin(id);
        for handle in handles {
            handle.join().await;
        }
    }

    /// Global packet/record counters
    pub fn counters(&self) -> ThroughputSnapshot {
        self.shared.counters.snapshot()
    }

    /// Number of active data manager records
    pub fn manager_count(&self) -> usize {
        self.shared.registry.lock().stream_count()
    }

    /// Whether a data manager exists for the given ODID
    pub fn has_manager(&self, odid: Odid) -> bool {
        self.shared.registry.lock().contains(odid)
    }

    /// Source reference count for an ODID's data manager
    pub fn source_count(&self, odid: Odid) -> Option<u32> {
        self.shared.registry.lock().source_count(odid)
    }

    /// Attached consumer count for an ODID's data manager
    pub fn consumer_count(&self, odid: Odid) -> Option<usize> {
        self.shared.registry.lock().consumer_count(odid)
    }

    /// Whether the given plugin is attached to the given ODID's pipeline
    pub fn plugin_attached(&self, odid: Odid, id: PluginId) -> bool {
        self.shared.registry.lock().plugin_attached(odid, id)
    }

    /// Statistics provider handle for the sampler
    pub fn stats_handle(&self) -> DistributorStatsHandle {
        DistributorStatsHandle {
            shared: Arc::clone(&self.shared),
        }
    }
}

/// Handle implementing the sampler's provider traits
///
/// Remains valid independently of the distributor's lifecycle.
#[derive(Clone)]
pub struct DistributorStatsHandle {
    shared: Arc<Shared>,
}

impl ThroughputProvider for DistributorStatsHandle {
    fn throughput_snapshot(&self) -> ThroughputSnapshot {
        self.shared.counters.snapshot()
    }
}

impl QueueStatsProvider for DistributorStatsHandle {
    fn queue_stats(&self) -> Vec<QueueStats> {
        let input = self.shared.input.lock().depth();
        let mut stats = Vec::with_capacity(1 + self.shared.registry.lock().stream_count());
        stats.push(QueueStats {
            name: "input".into(),
            used: input.used,
            capacity: input.capacity,
        });
        stats.extend(self.shared.registry.lock().queue_stats());
        stats
    }
}

#[cfg(test)]
#[path = "distributor_test.rs"]
mod distributor_test;
