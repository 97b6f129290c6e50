//! Queue error types.

/// Specialized `Result` alias for queue operations.
pub type QueueResult<T, E = QueueError> = Result<T, E>;

/// Failures surfaced by the scheduling queue.
#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    /// The queue has been closed; no further messages are accepted.
    #[error("queue is closed")]
    Closed,

    /// A message payload failed to (de)serialize.
    #[error("queue serialization failure: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The broker or transport failed.
    #[error("queue backend failure during {operation}: {message}")]
    Backend {
        /// The operation that failed.
        operation: &'static str,
        /// Backend-specific detail.
        message: String,
    },
}

impl QueueError {
    /// Shorthand for a [`QueueError::Backend`].
    pub fn backend(operation: &'static str, message: impl Into<String>) -> Self {
        Self::Backend {
            operation,
            message: message.into(),
        }
    }
}
