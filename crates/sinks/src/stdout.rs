//! Stdout sink - one summary line per message
//!
//! Development aid: prints ODID, record count and payload size for every
//! stored message. Not meant for production throughput.

use std::io::Write;

use async_trait::async_trait;

use flowgate_pipeline::{StoragePlugin, StoreError};
use flowgate_protocol::FlowMessage;

/// Storage plugin printing a summary line per message to stdout
#[derive(Debug, Default)]
pub struct StdoutSink;

impl StdoutSink {
    /// Create a new stdout sink
    pub fn new() -> Self {
        Self
    }

    fn format_line(message: &FlowMessage) -> String {
        format!(
            "odid={} records={} bytes={}",
            message.odid(),
            message.records(),
            message.payload_len()
        )
    }
}

#[async_trait]
impl StoragePlugin for StdoutSink {
    fn name(&self) -> &str {
        "stdout"
    }

    async fn store(&self, message: &FlowMessage) -> Result<(), StoreError> {
        let mut stdout = std::io::stdout().lock();
        writeln!(stdout, "{}", Self::format_line(message))?;
        Ok(())
    }
}
