//! Workflow definition storage.

use jiff::{SignedDuration, Timestamp};
use ratchet_core::WorkflowId;
use ratchet_engine::definition::WorkflowDefinition;
use serde::{Deserialize, Serialize};

use crate::error::StoreResult;
use crate::pagination::{CursorPage, CursorPagination};

/// A stored workflow definition with storage timestamps.
///
/// The definition is persisted whole: the engine mutates it in memory and
/// the worker writes the updated copy back after every step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowRecord {
    /// The full definition.
    pub definition: WorkflowDefinition,
    /// When the record was created.
    pub created_at: Timestamp,
    /// When the record was last written.
    pub updated_at: Timestamp,
}

impl WorkflowRecord {
    /// Wraps a definition in a fresh record.
    pub fn new(definition: WorkflowDefinition) -> Self {
        let now = Timestamp::now();
        Self {
            definition,
            created_at: now,
            updated_at: now,
        }
    }

    /// Produces the listing projection of this record.
    pub fn summary(&self) -> WorkflowSummary {
        WorkflowSummary {
            id: self.definition.id,
            owner: self.definition.owner.clone(),
            name: self.definition.name.clone(),
            is_initiated: self.definition.is_initiated,
            in_progress: self.definition.in_progress,
            awaiting_input: self.definition.expecting_input_for.is_some(),
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

/// Partial update to a stored workflow's scalar fields.
///
/// `None` leaves a field untouched; for `name` the inner `Option` clears
/// it. Structural changes (nodes, edges, accumulated inputs) go through
/// [`WorkflowStore::replace_workflow`] instead.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UpdateWorkflow {
    /// Display name; `Some(None)` clears it.
    pub name: Option<Option<String>>,
    /// Scheduling flag.
    pub is_initiated: Option<bool>,
    /// Progress flag.
    pub in_progress: Option<bool>,
}

impl UpdateWorkflow {
    /// Returns whether the patch changes nothing.
    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.is_initiated.is_none() && self.in_progress.is_none()
    }

    /// Applies the patch to a definition in place.
    pub fn apply(&self, definition: &mut WorkflowDefinition) {
        if let Some(name) = &self.name {
            definition.name = name.clone();
        }
        if let Some(is_initiated) = self.is_initiated {
            definition.is_initiated = is_initiated;
        }
        if let Some(in_progress) = self.in_progress {
            definition.in_progress = in_progress;
        }
    }
}

/// Listing projection of a stored workflow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowSummary {
    /// Workflow id.
    pub id: WorkflowId,
    /// Owning principal.
    pub owner: String,
    /// Optional display name.
    pub name: Option<String>,
    /// Whether the workflow has been enqueued at least once.
    pub is_initiated: bool,
    /// Whether a worker is currently advancing it.
    pub in_progress: bool,
    /// Whether it is paused on external input.
    pub awaiting_input: bool,
    /// Record creation time.
    pub created_at: Timestamp,
    /// Record update time.
    pub updated_at: Timestamp,
}

/// Persistent storage for workflow definitions.
///
/// Implementations must make `acquire_lock` atomic: of any number of
/// concurrent callers for the same workflow, at most one observes `true`
/// until the lock is released or its TTL elapses.
#[async_trait::async_trait]
pub trait WorkflowStore: Send + Sync {
    /// Persists a new workflow.
    ///
    /// Fails with [`StoreError::AlreadyExists`](crate::StoreError) if the
    /// id is taken.
    async fn create_workflow(&self, definition: &WorkflowDefinition) -> StoreResult<()>;

    /// Persists several workflows atomically.
    ///
    /// Either every definition is stored or none is; a conflict on any id
    /// rolls back the whole set.
    async fn create_workflows(&self, definitions: &[WorkflowDefinition]) -> StoreResult<()>;

    /// Fetches a workflow by id.
    async fn get_workflow(&self, id: WorkflowId) -> StoreResult<WorkflowRecord>;

    /// Returns whether a workflow exists, without loading its payload.
    async fn exists_workflow(&self, id: WorkflowId) -> StoreResult<bool>;

    /// Applies a partial update to a stored workflow's scalar fields.
    async fn update_workflow(&self, id: WorkflowId, update: UpdateWorkflow) -> StoreResult<()>;

    /// Writes the full definition, inserting it when absent.
    ///
    /// Idempotent: replaying the same write is harmless. The advisory lock
    /// is never touched by a replace; it moves only through
    /// [`acquire_lock`](WorkflowStore::acquire_lock) and
    /// [`release_lock`](WorkflowStore::release_lock).
    async fn replace_workflow(&self, definition: &WorkflowDefinition) -> StoreResult<()>;

    /// Deletes a workflow.
    async fn delete_workflow(&self, id: WorkflowId) -> StoreResult<()>;

    /// Lists an owner's workflows, newest first.
    async fn list_workflows(
        &self,
        owner: &str,
        pagination: CursorPagination,
    ) -> StoreResult<CursorPage<WorkflowSummary>>;

    /// Attempts to take the advisory lock with compare-and-set semantics.
    ///
    /// Returns whether the lock was taken. A lock whose holder has not
    /// refreshed it within `ttl` counts as free and may be taken over.
    /// Re-acquiring a lock already held by `holder` refreshes it and
    /// returns `true`.
    async fn acquire_lock(
        &self,
        id: WorkflowId,
        holder: &str,
        ttl: SignedDuration,
    ) -> StoreResult<bool>;

    /// Releases the advisory lock if `holder` still owns it.
    ///
    /// Releasing a lock held by someone else (or no lock at all) is a
    /// no-op: the holder may have been timed out and superseded.
    async fn release_lock(&self, id: WorkflowId, holder: &str) -> StoreResult<()>;
}
