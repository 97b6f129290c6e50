//! Worker error types.

/// Result type alias for worker operations.
pub type Result<T, E = WorkerError> = std::result::Result<T, E>;

/// Worker error type.
#[derive(Debug, thiserror::Error)]
#[must_use = "errors do nothing unless handled"]
pub enum WorkerError {
    /// A storage operation failed.
    #[error("storage error: {0}")]
    Store(#[from] ratchet_store::StoreError),

    /// A queue operation failed.
    #[error("queue error: {0}")]
    Queue(#[from] ratchet_queue::QueueError),

    /// The engine rejected a workflow or a transition.
    #[error("engine error: {0}")]
    Engine(#[from] ratchet_engine::EngineError),
}
