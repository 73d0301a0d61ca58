//! Data manager registry
//!
//! The ordered collection of per-ODID pipeline records plus the retained
//! plugin registrations. Insertion appends, removal unlinks in place, and
//! lookup is a linear scan keyed by ODID - the number of concurrently
//! active observation domains is small, so the simple structure keeps the
//! hot path cheap and the locking discipline trivial.
//!
//! The registry is mutated by the dispatcher (create/remove) and by the
//! external attach/detach calls; one mutex around the whole structure
//! covers both, and it is never held across an await.

use std::sync::Arc;

use flowgate_metrics::QueueStats;
use flowgate_protocol::Odid;

use crate::error::PipelineError;
use crate::plugin::{PluginId, RegisteredPlugin, StoragePlugin};
use crate::stream::{ConsumerHandle, StreamPipeline};

pub(crate) struct Registry {
    /// Active pipeline records, in creation order
    streams: Vec<StreamPipeline>,
    /// Retained plugin registrations, re-applied to new pipelines
    plugins: Vec<RegisteredPlugin>,
    next_plugin_id: u32,
    queue_capacity: usize,
    max_streams: usize,
}

impl Registry {
    pub(crate) fn new(queue_capacity: usize, max_streams: usize) -> Self {
        Self {
            streams: Vec::new(),
            plugins: Vec::new(),
            next_plugin_id: 0,
            queue_capacity,
            max_streams,
        }
    }

    /// Find the record for an ODID
    pub(crate) fn lookup_mut(&mut self, odid: Odid) -> Option<&mut StreamPipeline> {
        self.streams.iter_mut().find(|s| s.odid() == odid)
    }

    pub(crate) fn contains(&self, odid: Odid) -> bool {
        self.streams.iter().any(|s| s.odid() == odid)
    }

    /// Create the record for a previously unseen ODID
    ///
    /// Applies the retained plugin registrations: plugins targeting this
    /// ODID specifically win; broadcast plugins apply only when no
    /// specific plugin exists for it. Fails when the active-manager limit
    /// is reached.
    pub(crate) fn create(&mut self, odid: Odid) -> Result<&mut StreamPipeline, PipelineError> {
        debug_assert!(!self.contains(odid), "duplicate data manager for ODID");
        if self.streams.len() >= self.max_streams {
            return Err(PipelineError::ManagerLimit(self.max_streams));
        }

        let mut stream = StreamPipeline::new(odid, self.queue_capacity);

        let has_specific = self.plugins.iter().any(|p| p.odid == Some(odid));
        for registered in &self.plugins {
            let matches = match registered.odid {
                Some(target) => target == odid,
                None => !has_specific,
            };
            if matches {
                stream.attach(registered);
            }
        }

        self.streams.push(stream);
        Ok(self
            .streams
            .last_mut()
            .expect("record was just appended"))
    }

    /// Unlink the record for an ODID
    pub(crate) fn remove(&mut self, odid: Odid) -> Option<StreamPipeline> {
        let index = self.streams.iter().position(|s| s.odid() == odid)?;
        Some(self.streams.remove(index))
    }

    /// Register a plugin and attach it to the matching existing pipelines
    ///
    /// A specific target attaches to at most the one record for that ODID;
    /// a broadcast registration attaches to every record that currently
    /// exists. Pipelines created afterwards pick the registration up from
    /// the retained list in `create`.
    pub(crate) fn register_plugin(
        &mut self,
        plugin: Arc<dyn StoragePlugin>,
        odid: Option<Odid>,
    ) -> PluginId {
        let id = PluginId::new(self.next_plugin_id);
        self.next_plugin_id += 1;

        let registered = RegisteredPlugin { id, odid, plugin };

        match odid {
            Some(target) => {
                if let Some(stream) = self.lookup_mut(target) {
                    stream.attach(&registered);
                }
            }
            None => {
                for stream in &mut self.streams {
                    stream.attach(&registered);
                }
            }
        }

        self.plugins.push(registered);
        id
    }

    /// Drop a plugin registration and detach its running instances
    ///
    /// Unknown ids are a no-op. Returns the cancelled consumer handles for
    /// the caller to await outside the registry lock.
    pub(crate) fn unregister_plugin(&mut self, id: PluginId) -> Vec<ConsumerHandle> {
        let Some(index) = self.plugins.iter().position(|p| p.id == id) else {
            return Vec::new();
        };
        self.plugins.remove(index);

        self.streams
            .iter_mut()
            .filter_map(|stream| stream.detach(id))
            .collect()
    }

    /// Number of active pipeline records
    pub(crate) fn stream_count(&self) -> usize {
        self.streams.len()
    }

    /// Source reference count for an ODID, if a record exists
    pub(crate) fn source_count(&self, odid: Odid) -> Option<u32> {
        self.streams
            .iter()
            .find(|s| s.odid() == odid)
            .map(|s| s.sources())
    }

    /// Attached consumer count for an ODID, if a record exists
    pub(crate) fn consumer_count(&self, odid: Odid) -> Option<usize> {
        self.streams
            .iter()
            .find(|s| s.odid() == odid)
            .map(|s| s.consumer_count())
    }

    /// Whether the given plugin is attached to the given ODID's record
    pub(crate) fn plugin_attached(&self, odid: Odid, id: PluginId) -> bool {
        self.streams
            .iter()
            .find(|s| s.odid() == odid)
            .is_some_and(|s| s.has_plugin(id))
    }

    /// Occupancy of every downstream queue, in creation order
    pub(crate) fn queue_stats(&self) -> Vec<QueueStats> {
        self.streams.iter().map(|s| s.queue_stats()).collect()
    }

    /// Take every remaining record for teardown
    pub(crate) fn drain(&mut self) -> Vec<StreamPipeline> {
        self.streams.drain(..).collect()
    }
}
