//! Flow message - the unit of work in the pipeline
//!
//! A `FlowMessage` is one decoded metering message: an opaque payload plus
//! the metadata the dispatcher routes on. The payload uses `bytes::Bytes`
//! so cloning a message header around the pipeline never copies the body.

use bytes::Bytes;

use crate::Odid;

/// Lifecycle tag of the exporting source
///
/// The upstream decoder tags the first message of a new transport session
/// with `New` and emits a final `Closed` message when the session ends.
/// Everything in between is `Active`. The dispatcher uses these tags to
/// reference-count open sources per ODID.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceStatus {
    /// First message from a previously unseen source
    New,
    /// Ordinary data message from an established source
    Active,
    /// Source terminated; carries no records to store
    Closed,
}

/// One decoded metering message
///
/// Created by the upstream decoder and handed to the dispatcher's input
/// queue. Inside the pipeline messages are shared as `Arc<FlowMessage>`;
/// the slot queue's per-slot reference count decides when a slot may be
/// reused, while the `Arc` decides when the payload itself is freed.
#[derive(Debug, Clone)]
pub struct FlowMessage {
    /// Observation domain the message belongs to
    odid: Odid,

    /// Lifecycle tag of the exporting source
    status: SourceStatus,

    /// Number of data records carried in the payload
    records: u32,

    /// Raw message body - opaque to the pipeline
    payload: Bytes,
}

impl FlowMessage {
    /// Create an ordinary data message
    pub fn data(odid: Odid, records: u32, payload: Bytes) -> Self {
        Self {
            odid,
            status: SourceStatus::Active,
            records,
            payload,
        }
    }

    /// Create the first message of a new source session
    ///
    /// Carries the session's first payload; the dispatcher additionally
    /// increments the ODID's source reference count when it sees it.
    pub fn source_new(odid: Odid, records: u32, payload: Bytes) -> Self {
        Self {
            odid,
            status: SourceStatus::New,
            records,
            payload,
        }
    }

    /// Create the terminating message of a closed source session
    ///
    /// Carries no payload; the dispatcher decrements the ODID's source
    /// reference count and never forwards it downstream.
    pub fn source_closed(odid: Odid) -> Self {
        Self {
            odid,
            status: SourceStatus::Closed,
            records: 0,
            payload: Bytes::new(),
        }
    }

    /// Observation domain this message belongs to
    #[inline]
    pub fn odid(&self) -> Odid {
        self.odid
    }

    /// Lifecycle tag of the exporting source
    #[inline]
    pub fn status(&self) -> SourceStatus {
        self.status
    }

    /// Number of data records in the payload
    #[inline]
    pub fn records(&self) -> u32 {
        self.records
    }

    /// Raw message body
    #[inline]
    pub fn payload(&self) -> &Bytes {
        &self.payload
    }

    /// Payload length in bytes
    #[inline]
    pub fn payload_len(&self) -> usize {
        self.payload.len()
    }
}
