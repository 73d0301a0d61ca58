//! Storage consumer task
//!
//! One consumer task per attached plugin instance. The task reads its data
//! manager's queue in order, hands each message to the plugin, and
//! acknowledges the slot. A plugin error is logged and the loop keeps
//! going; the task stops on the shutdown marker, on queue close, or on
//! its cancellation token.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use flowgate_protocol::Odid;

use crate::entry::StoreEntry;
use crate::plugin::StoragePlugin;
use crate::slot_queue::SlotReader;

/// Consumption loop for one plugin attachment
///
/// Dropping the reader on exit surrenders any outstanding slot claims, so
/// a cancelled consumer can never wedge the queue for the writer or for
/// the other attached plugins.
pub(crate) async fn run_consumer(
    mut reader: SlotReader<StoreEntry>,
    plugin: Arc<dyn StoragePlugin>,
    odid: Odid,
    cancel: CancellationToken,
) {
    debug!(%odid, plugin = plugin.name(), "storage consumer started");

    loop {
        let next = tokio::select! {
            _ = cancel.cancelled() => break,
            next = reader.read() => next,
        };

        let (entry, ticket) = match next {
            Ok(next) => next,
            Err(_) => break,
        };

        match entry {
            StoreEntry::Message(message) => {
                if let Err(error) = plugin.store(&message).await {
                    warn!(
                        %odid,
                        plugin = plugin.name(),
                        %error,
                        "storage plugin failed to store message"
                    );
                }
                reader.release(ticket);
            }
            StoreEntry::Shutdown => {
                reader.release(ticket);
                break;
            }
        }
    }

    debug!(%odid, plugin = plugin.name(), "storage consumer stopped");
}
