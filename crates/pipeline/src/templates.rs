//! Template management collaborator
//!
//! The collector's template table lives outside this crate; the pipeline
//! only needs one call against it, made exactly once when a data manager
//! is destroyed.

use flowgate_protocol::Odid;

/// Releases protocol templates retained per observation domain
pub trait TemplateStore: Send + Sync {
    /// Release every template associated with `odid`
    ///
    /// Invoked exactly once per data manager teardown, after the
    /// downstream queue has been drained and its consumers have stopped.
    fn release_odid(&self, odid: Odid);
}
