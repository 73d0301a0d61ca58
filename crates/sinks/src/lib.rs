//! Flowgate reference storage plugins
//!
//! Two small [`StoragePlugin`](flowgate_pipeline::StoragePlugin)
//! implementations used by the collector binary and the end-to-end tests:
//!
//! - [`NullSink`] - counts and discards; for benchmarking the pipeline
//!   without I/O overhead
//! - [`StdoutSink`] - one summary line per message; for development
//!
//! Real deployments bring their own plugins; these only exercise the
//! consumption contract.

mod null;
mod stdout;

pub use null::{NullSink, NullSinkSnapshot};
pub use stdout::StdoutSink;
