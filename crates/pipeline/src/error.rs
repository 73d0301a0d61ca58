//! Pipeline error types

use thiserror::Error;

use crate::slot_queue::QueueClosed;

/// Pipeline errors
#[derive(Debug, Error)]
pub enum PipelineError {
    /// `start` called while the dispatcher is already running
    #[error("distributor already running")]
    AlreadyRunning,

    /// The active data manager limit was reached
    #[error("data manager limit reached ({0})")]
    ManagerLimit(usize),

    /// The input queue was closed underneath an operation
    #[error(transparent)]
    InputClosed(#[from] QueueClosed),
}

/// Result type for pipeline operations
pub type Result<T> = std::result::Result<T, PipelineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = PipelineError::AlreadyRunning;
        assert!(err.to_string().contains("already running"));

        let err = PipelineError::ManagerLimit(64);
        assert!(err.to_string().contains("64"));

        let err = PipelineError::from(QueueClosed);
        assert!(err.to_string().contains("closed"));
    }
}
