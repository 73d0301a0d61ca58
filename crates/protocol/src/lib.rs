//! Flowgate protocol types
//!
//! The message types that flow through the collector pipeline. Wire
//! decoding happens upstream; by the time a message reaches this crate's
//! types it is already parsed into an opaque payload plus the routing
//! metadata the pipeline needs (ODID, source lifecycle, record count).
//!
//! # Key Types
//!
//! - [`Odid`] - Observation Domain ID, the per-exporter routing key
//! - [`SourceStatus`] - lifecycle tag of the exporting source
//! - [`FlowMessage`] - one decoded metering message

mod message;
mod odid;

pub use message::{FlowMessage, SourceStatus};
pub use odid::Odid;
