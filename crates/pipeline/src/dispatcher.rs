//! Dispatcher - routes messages into per-ODID data managers
//!
//! The single long-lived routing task. Each iteration reads one entry
//! from the current input queue, resolves (or creates) the data manager
//! for its ODID, maintains the source reference count, and forwards data
//! downstream. Control entries stop the loop (`Shutdown`) or switch its
//! input source (`SwapInput`) strictly between two messages.
//!
//! Per-message failures are never fatal: a message that cannot be routed
//! is logged, dropped, and the loop continues.

use std::sync::Arc;

use tracing::{debug, info, trace, warn};

use flowgate_protocol::{FlowMessage, SourceStatus};

use crate::distributor::Shared;
use crate::entry::{DispatchEntry, StoreEntry};
use crate::registry::Registry;
use crate::slot_queue::{SlotQueue, SlotReader, SlotTicket};
use crate::stream::StreamPipeline;

/// Outcome of the registry step for one message
enum Routed {
    /// Forward into the record's downstream queue
    Forward(Arc<SlotQueue<StoreEntry>>),
    /// Message dropped (record creation failed)
    Drop,
    /// Closed-source bookkeeping done; no forwarding. Carries the record
    /// when its reference count hit zero and it was unlinked.
    Closed(Option<StreamPipeline>),
}

pub(crate) struct Dispatcher {
    reader: SlotReader<DispatchEntry>,
    shared: Arc<Shared>,
}

impl Dispatcher {
    pub(crate) fn new(reader: SlotReader<DispatchEntry>, shared: Arc<Shared>) -> Self {
        Self { reader, shared }
    }

    /// Run until the shutdown marker arrives
    pub(crate) async fn run(mut self) {
        info!("dispatcher started");

        loop {
            let (entry, ticket) = match self.reader.read().await {
                Ok(next) => next,
                Err(_) => {
                    warn!("input queue closed without shutdown marker");
                    break;
                }
            };

            match entry {
                DispatchEntry::Shutdown => {
                    self.reader.release(ticket);
                    break;
                }
                DispatchEntry::SwapInput(queue) => {
                    self.reader.release(ticket);
                    self.adopt_input(queue);
                }
                DispatchEntry::Message(message) => {
                    self.dispatch(message, ticket).await;
                }
            }
        }

        info!("dispatcher stopped");
    }

    /// Switch to a new input queue
    ///
    /// Runs strictly between two messages. Dropping the old reader
    /// surrenders its claims on the old queue, so the swap requester's
    /// writer side is never left blocked.
    fn adopt_input(&mut self, queue: Arc<SlotQueue<DispatchEntry>>) {
        self.reader = queue.reader_from_head();
        *self.shared.input.lock() = queue;
        self.shared.swap_epoch.send_modify(|epoch| *epoch += 1);
        debug!("input queue swapped");
    }

    /// Route one message
    async fn dispatch(&mut self, message: Arc<FlowMessage>, ticket: SlotTicket) {
        let odid = message.odid();

        let routed = {
            let mut registry = self.shared.registry.lock();
            self.route(&mut registry, &message)
        };

        match routed {
            Routed::Forward(queue) => {
                match queue.broadcast(StoreEntry::Message(Arc::clone(&message))).await {
                    Ok(0) => {
                        trace!(%odid, "no storage consumers attached; message dropped");
                    }
                    Ok(_) => {}
                    Err(_) => {
                        warn!(%odid, "data manager queue unavailable; dropping message");
                    }
                }
                // Ownership of the payload moved downstream via the Arc
                // clone; releasing the input slot frees it only on the
                // drop paths above.
                self.reader.release(ticket);
            }
            Routed::Drop => {
                self.reader.release(ticket);
            }
            Routed::Closed(stream) => {
                self.reader.release(ticket);
                if let Some(stream) = stream {
                    self.destroy_stream(stream).await;
                }
            }
        }
    }

    /// Registry step: resolve or create the record, apply the source
    /// lifecycle tag, count throughput. Runs under the registry lock.
    fn route(&self, registry: &mut Registry, message: &FlowMessage) -> Routed {
        let odid = message.odid();

        if !registry.contains(odid) {
            match registry.create(odid) {
                Ok(_) => info!(%odid, "data manager created"),
                Err(error) => {
                    warn!(%odid, %error, "cannot create data manager; dropping message");
                    return Routed::Drop;
                }
            }
        }
        let stream = registry
            .lookup_mut(odid)
            .expect("record exists after create");

        match message.status() {
            SourceStatus::New => {
                stream.add_source();
                debug!(%odid, sources = stream.sources(), "new exporter source");
                Routed::Forward(stream.queue())
            }
            SourceStatus::Active => {
                self.shared.counters.record_message(message.records());
                Routed::Forward(stream.queue())
            }
            SourceStatus::Closed => {
                let remaining = stream.remove_source();
                debug!(%odid, sources = remaining, "exporter source closed");
                if remaining == 0 {
                    Routed::Closed(registry.remove(odid))
                } else {
                    Routed::Closed(None)
                }
            }
        }
    }

    /// Tear down a record whose last source closed
    async fn destroy_stream(&self, stream: StreamPipeline) {
        let odid = stream.odid();
        debug!(%odid, "no open sources; releasing data manager");

        stream.teardown().await;
        if let Some(templates) = &self.shared.templates {
            templates.release_odid(odid);
        }

        info!(%odid, "data manager destroyed");
    }
}
