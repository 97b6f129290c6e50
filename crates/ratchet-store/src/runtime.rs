//! Runtime cursor storage.

use ratchet_core::{NodeId, WorkflowId};
use ratchet_engine::RuntimeState;
use serde::{Deserialize, Serialize};

use crate::error::StoreResult;

/// Partial update to a stored runtime cursor.
///
/// `None` leaves a field untouched; for `current` the inner `Option`
/// clears it. Frontier changes go through
/// [`RuntimeStore::replace_runtime`] instead.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UpdateRuntime {
    /// The node most recently popped for execution; `Some(None)` clears it.
    pub current: Option<Option<NodeId>>,
    /// Terminal flag.
    pub finished: Option<bool>,
}

impl UpdateRuntime {
    /// Returns whether the patch changes nothing.
    pub fn is_empty(&self) -> bool {
        self.current.is_none() && self.finished.is_none()
    }

    /// Applies the patch to a cursor in place.
    pub fn apply(&self, runtime: &mut RuntimeState) {
        if let Some(current) = self.current {
            runtime.current = current;
        }
        if let Some(finished) = self.finished {
            runtime.finished = finished;
        }
    }
}

/// Persistent storage for runtime cursors.
///
/// A cursor shares its workflow's id and lives from first scheduling until
/// the run finishes.
#[async_trait::async_trait]
pub trait RuntimeStore: Send + Sync {
    /// Persists a new runtime cursor.
    async fn create_runtime(&self, runtime: &RuntimeState) -> StoreResult<()>;

    /// Fetches the cursor for a workflow, if one exists.
    async fn get_runtime(&self, id: WorkflowId) -> StoreResult<Option<RuntimeState>>;

    /// Returns whether a cursor exists, without loading it.
    async fn exists_runtime(&self, id: WorkflowId) -> StoreResult<bool>;

    /// Applies a partial update to a stored cursor.
    async fn update_runtime(&self, id: WorkflowId, update: UpdateRuntime) -> StoreResult<()>;

    /// Writes the full cursor, inserting it when absent.
    ///
    /// Idempotent: replaying the same write is harmless.
    async fn replace_runtime(&self, runtime: &RuntimeState) -> StoreResult<()>;

    /// Deletes the cursor for a workflow; absent cursors are a no-op.
    async fn delete_runtime(&self, id: WorkflowId) -> StoreResult<()>;
}
