//! Durable batch store.

use ratchet_core::{BatchId, WorkflowId};
use ratchet_store::{
    BatchStore, CursorPage, CursorPagination, StoreError, StoreResult, WorkflowBatch,
};
use uuid::Uuid;

use super::connection;
use crate::client::PgClient;
use crate::model::{BatchRow, NewBatchRow};
use crate::query::BatchRepository;

/// [`BatchStore`] backend over PostgreSQL.
#[derive(Debug, Clone)]
pub struct PgBatchStore {
    client: PgClient,
}

impl PgBatchStore {
    /// Creates a store over the given client.
    pub fn new(client: PgClient) -> Self {
        Self { client }
    }
}

fn batch_from_row(row: BatchRow) -> WorkflowBatch {
    WorkflowBatch {
        id: BatchId::from_uuid(row.id),
        owner: row.owner,
        name: row.name,
        workflow_ids: row
            .workflow_ids
            .into_iter()
            .map(WorkflowId::from_uuid)
            .collect(),
        created_at: row.created_at.into(),
    }
}

#[async_trait::async_trait]
impl BatchStore for PgBatchStore {
    async fn create_batch(&self, batch: &WorkflowBatch) -> StoreResult<()> {
        let new_batch = NewBatchRow {
            id: batch.id.as_uuid(),
            owner: batch.owner.clone(),
            name: batch.name.clone(),
            workflow_ids: batch.workflow_ids.iter().map(|id| id.as_uuid()).collect(),
        };

        let mut conn = connection(&self.client).await?;
        conn.create_batch(new_batch)
            .await
            .map_err(|err| err.into_store_error("batch", batch.id))?;
        Ok(())
    }

    async fn get_batch(&self, id: BatchId) -> StoreResult<WorkflowBatch> {
        let mut conn = connection(&self.client).await?;
        let row = conn
            .find_batch_by_id(id.as_uuid())
            .await
            .map_err(|err| err.into_store_error("batch", id))?
            .ok_or_else(|| StoreError::not_found("batch", id))?;

        Ok(batch_from_row(row))
    }

    async fn exists_batch(&self, id: BatchId) -> StoreResult<bool> {
        let mut conn = connection(&self.client).await?;
        conn.batch_exists(id.as_uuid())
            .await
            .map_err(|err| err.into_store_error("batch", id))
    }

    async fn delete_batch(&self, id: BatchId) -> StoreResult<()> {
        let mut conn = connection(&self.client).await?;
        let existed = conn
            .delete_batch(id.as_uuid())
            .await
            .map_err(|err| err.into_store_error("batch", id))?;

        if !existed {
            return Err(StoreError::not_found("batch", id));
        }
        Ok(())
    }

    async fn list_batches(
        &self,
        owner: &str,
        pagination: CursorPagination,
    ) -> StoreResult<CursorPage<WorkflowBatch>> {
        let mut conn = connection(&self.client).await?;
        let page = conn
            .cursor_list_batches(owner, pagination)
            .await
            .map_err(|err| err.into_store_error("batch", Uuid::nil()))?;

        Ok(page.map(batch_from_row))
    }
}
