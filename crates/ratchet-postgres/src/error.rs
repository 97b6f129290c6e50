//! Error types and utilities for database operations.

use std::borrow::Cow;

use deadpool::managed::TimeoutType;
use diesel::result::{DatabaseErrorKind, Error as DieselError};
use diesel_async::pooled_connection::deadpool::PoolError as DeadpoolError;
use ratchet_store::StoreError;
use uuid::Uuid;

/// Type-erased error type for dynamic error handling.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Specialized `Result` alias for database operations.
pub type PgResult<T, E = PgError> = Result<T, E>;

/// Error type for all PostgreSQL database operations.
#[derive(Debug, thiserror::Error)]
#[must_use = "database errors should be handled appropriately"]
pub enum PgError {
    /// Invalid configuration parameters.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Database operation timed out.
    #[error("Database operation timed out")]
    Timeout(TimeoutType),

    /// Database query execution failed.
    #[error("Database query error: {0}")]
    Query(#[from] DieselError),

    /// Database migration operation failed.
    #[error("Database migration error: {0}")]
    Migration(BoxError),

    /// A stored payload failed to (de)serialize.
    #[error("Stored payload (de)serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Unexpected error occurred.
    #[error("Unexpected error: {0}")]
    Unexpected(Cow<'static, str>),
}

impl PgError {
    /// Returns whether this error is a unique constraint violation.
    pub fn is_unique_violation(&self) -> bool {
        matches!(
            self,
            PgError::Query(DieselError::DatabaseError(
                DatabaseErrorKind::UniqueViolation,
                _,
            ))
        )
    }

    /// Returns whether this error is diesel's row-not-found.
    pub fn is_not_found(&self) -> bool {
        matches!(self, PgError::Query(DieselError::NotFound))
    }

    /// Maps this error onto the storage error vocabulary for `entity`/`id`.
    pub fn into_store_error(self, entity: &'static str, id: impl Into<Uuid>) -> StoreError {
        if self.is_unique_violation() {
            StoreError::already_exists(entity, id)
        } else if self.is_not_found() {
            StoreError::not_found(entity, id)
        } else {
            match self {
                PgError::Serialization(err) => StoreError::Serialization(err),
                other => StoreError::Backend(other.to_string()),
            }
        }
    }
}

impl From<DeadpoolError> for PgError {
    fn from(err: DeadpoolError) -> Self {
        match err {
            DeadpoolError::Timeout(timeout_type) => PgError::Timeout(timeout_type),
            other => PgError::Unexpected(other.to_string().into()),
        }
    }
}
