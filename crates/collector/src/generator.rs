//! Synthetic traffic generator
//!
//! Stands in for the protocol decoder when exercising the pipeline end to
//! end: opens a source session per ODID, emits data messages round-robin
//! across them, then closes every session. Useful for smoke testing and
//! throughput measurements without a live exporter.

use std::sync::Arc;

use bytes::Bytes;
use tracing::info;

use flowgate_pipeline::{DispatchEntry, QueueClosed, SlotQueue};
use flowgate_protocol::{FlowMessage, Odid};

/// Generator parameters
#[derive(Debug, Clone)]
pub struct GeneratorConfig {
    /// Number of distinct observation domains to simulate
    pub odids: u32,
    /// Data messages to emit per observation domain
    pub messages_per_odid: u64,
    /// Records carried by each data message
    pub records_per_message: u32,
    /// Payload size per message in bytes
    pub payload_bytes: usize,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            odids: 4,
            messages_per_odid: 10_000,
            records_per_message: 10,
            payload_bytes: 512,
        }
    }
}

/// First simulated ODID; the rest follow consecutively
const BASE_ODID: u32 = 256;

/// Feed synthetic traffic into the pipeline's input queue
///
/// Returns the number of data messages written. Stops early if the queue
/// closes underneath the run.
pub async fn run(
    input: Arc<SlotQueue<DispatchEntry>>,
    config: GeneratorConfig,
) -> Result<u64, QueueClosed> {
    let odids: Vec<Odid> = (0..config.odids)
        .map(|i| Odid::new(BASE_ODID + i))
        .collect();
    // one shared payload; Bytes clones are reference-counted
    let payload = Bytes::from(vec![0u8; config.payload_bytes]);

    info!(
        odids = config.odids,
        messages_per_odid = config.messages_per_odid,
        records_per_message = config.records_per_message,
        "traffic generator started"
    );

    for &odid in &odids {
        let message = FlowMessage::source_new(odid, 0, Bytes::new());
        input.write(DispatchEntry::Message(Arc::new(message)), 1).await?;
    }

    let mut written = 0u64;
    for _ in 0..config.messages_per_odid {
        for &odid in &odids {
            let message =
                FlowMessage::data(odid, config.records_per_message, payload.clone());
            input.write(DispatchEntry::Message(Arc::new(message)), 1).await?;
            written += 1;
        }
    }

    for &odid in &odids {
        let message = FlowMessage::source_closed(odid);
        input.write(DispatchEntry::Message(Arc::new(message)), 1).await?;
    }

    info!(messages = written, "traffic generator finished");
    Ok(written)
}
