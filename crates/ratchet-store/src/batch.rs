//! Workflow batch storage.

use jiff::Timestamp;
use ratchet_core::{BatchId, WorkflowId};
use serde::{Deserialize, Serialize};

use crate::error::StoreResult;
use crate::pagination::{CursorPage, CursorPagination};

/// A named group of workflows created together.
///
/// Batches are bookkeeping only: members execute independently, but batch
/// creation is all-or-none and batch deletion cascades to the members.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowBatch {
    /// Batch id.
    pub id: BatchId,
    /// Owning principal.
    pub owner: String,
    /// Optional display name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Member workflow ids, in creation order.
    pub workflow_ids: Vec<WorkflowId>,
    /// When the batch was created.
    pub created_at: Timestamp,
}

impl WorkflowBatch {
    /// Creates a batch over the given members.
    pub fn new(
        owner: impl Into<String>,
        name: Option<String>,
        workflow_ids: Vec<WorkflowId>,
    ) -> Self {
        Self {
            id: BatchId::new(),
            owner: owner.into(),
            name,
            workflow_ids,
            created_at: Timestamp::now(),
        }
    }
}

/// Persistent storage for workflow batches.
#[async_trait::async_trait]
pub trait BatchStore: Send + Sync {
    /// Persists a new batch.
    async fn create_batch(&self, batch: &WorkflowBatch) -> StoreResult<()>;

    /// Fetches a batch by id.
    async fn get_batch(&self, id: BatchId) -> StoreResult<WorkflowBatch>;

    /// Returns whether a batch exists, without loading its members.
    async fn exists_batch(&self, id: BatchId) -> StoreResult<bool>;

    /// Deletes a batch record. Cascading to members is the service layer's
    /// job; the store only removes the grouping.
    async fn delete_batch(&self, id: BatchId) -> StoreResult<()>;

    /// Lists an owner's batches, newest first.
    async fn list_batches(
        &self,
        owner: &str,
        pagination: CursorPagination,
    ) -> StoreResult<CursorPage<WorkflowBatch>>;
}
