//! Service error types.

/// Result type alias for service operations.
pub type ServiceResult<T, E = ServiceError> = std::result::Result<T, E>;

/// Service error type.
///
/// `Validation` and `Conflict` are caller faults and must surface to the
/// original submitter; the transparent variants carry lower-layer failures
/// upward unchanged.
#[derive(Debug, thiserror::Error)]
#[must_use = "errors do nothing unless handled"]
pub enum ServiceError {
    /// The request is malformed; retrying without changes cannot succeed.
    #[error("validation failed: {0}")]
    Validation(String),

    /// The request conflicts with the current state of the workflow.
    #[error("conflict: {0}")]
    Conflict(String),

    /// A storage operation failed.
    #[error(transparent)]
    Store(#[from] ratchet_store::StoreError),

    /// A queue operation failed.
    #[error(transparent)]
    Queue(#[from] ratchet_queue::QueueError),

    /// The engine rejected the definition.
    #[error(transparent)]
    Engine(#[from] ratchet_engine::EngineError),
}

impl ServiceError {
    /// Creates a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Creates a conflict error.
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict(message.into())
    }

    /// Returns whether the error is a missing-entity failure.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Store(err) if err.is_not_found())
    }
}
