//! Storage error types.

use uuid::Uuid;

/// Specialized `Result` alias for storage operations.
pub type StoreResult<T, E = StoreError> = Result<T, E>;

/// Failures surfaced by the storage layer.
///
/// Backends map their native failures onto these variants so callers can
/// branch on semantics instead of on backend-specific error types.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The referenced record does not exist.
    #[error("{entity} not found: {id}")]
    NotFound {
        /// Entity kind, e.g. `workflow` or `batch`.
        entity: &'static str,
        /// The missing record's id.
        id: Uuid,
    },

    /// A record with this id already exists.
    #[error("{entity} already exists: {id}")]
    AlreadyExists {
        /// Entity kind.
        entity: &'static str,
        /// The conflicting id.
        id: Uuid,
    },

    /// A stored payload failed to (de)serialize.
    #[error("storage serialization failure: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The backend itself failed (connection, transaction, io).
    #[error("storage backend failure: {0}")]
    Backend(String),
}

impl StoreError {
    /// Shorthand for a [`StoreError::NotFound`].
    pub fn not_found(entity: &'static str, id: impl Into<Uuid>) -> Self {
        Self::NotFound {
            entity,
            id: id.into(),
        }
    }

    /// Shorthand for a [`StoreError::AlreadyExists`].
    pub fn already_exists(entity: &'static str, id: impl Into<Uuid>) -> Self {
        Self::AlreadyExists {
            entity,
            id: id.into(),
        }
    }

    /// Returns whether this is a not-found failure.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}
