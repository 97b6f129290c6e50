//! In-memory batch store.

use std::collections::HashMap;

use ratchet_core::BatchId;
use tokio::sync::RwLock;

use crate::batch::{BatchStore, WorkflowBatch};
use crate::error::{StoreError, StoreResult};
use crate::pagination::{CursorPage, CursorPagination};

/// [`BatchStore`] backend over an in-process map.
#[derive(Debug, Default)]
pub struct MemoryBatchStore {
    batches: RwLock<HashMap<BatchId, WorkflowBatch>>,
}

impl MemoryBatchStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl BatchStore for MemoryBatchStore {
    async fn create_batch(&self, batch: &WorkflowBatch) -> StoreResult<()> {
        let mut batches = self.batches.write().await;
        if batches.contains_key(&batch.id) {
            return Err(StoreError::already_exists("batch", batch.id));
        }
        batches.insert(batch.id, batch.clone());
        Ok(())
    }

    async fn get_batch(&self, id: BatchId) -> StoreResult<WorkflowBatch> {
        self.batches
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or_else(|| StoreError::not_found("batch", id))
    }

    async fn exists_batch(&self, id: BatchId) -> StoreResult<bool> {
        Ok(self.batches.read().await.contains_key(&id))
    }

    async fn delete_batch(&self, id: BatchId) -> StoreResult<()> {
        self.batches
            .write()
            .await
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| StoreError::not_found("batch", id))
    }

    async fn list_batches(
        &self,
        owner: &str,
        pagination: CursorPagination,
    ) -> StoreResult<CursorPage<WorkflowBatch>> {
        let batches = self.batches.read().await;

        let mut rows: Vec<WorkflowBatch> = batches
            .values()
            .filter(|batch| batch.owner == owner)
            .filter(|batch| {
                pagination
                    .after
                    .as_ref()
                    .is_none_or(|cursor| cursor.admits(batch.created_at, batch.id.as_uuid()))
            })
            .cloned()
            .collect();

        rows.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| b.id.cmp(&a.id))
        });
        rows.truncate(pagination.fetch_limit() as usize);

        Ok(CursorPage::from_rows(rows, pagination.limit, |batch| {
            (batch.created_at, batch.id.as_uuid())
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ratchet_core::WorkflowId;

    #[tokio::test]
    async fn batch_lifecycle() {
        let store = MemoryBatchStore::new();
        let batch = WorkflowBatch::new("o", Some("imports".into()), vec![WorkflowId::new()]);

        store.create_batch(&batch).await.unwrap();
        let stored = store.get_batch(batch.id).await.unwrap();
        assert_eq!(stored.workflow_ids, batch.workflow_ids);
        assert!(store.exists_batch(batch.id).await.unwrap());

        store.delete_batch(batch.id).await.unwrap();
        assert!(!store.exists_batch(batch.id).await.unwrap());
        assert!(matches!(
            store.get_batch(batch.id).await,
            Err(StoreError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn listing_filters_by_owner() {
        let store = MemoryBatchStore::new();
        for _ in 0..3 {
            let batch = WorkflowBatch::new("owner", None, Vec::new());
            store.create_batch(&batch).await.unwrap();
        }
        store
            .create_batch(&WorkflowBatch::new("other", None, Vec::new()))
            .await
            .unwrap();

        let page = store
            .list_batches("owner", CursorPagination::new(10))
            .await
            .unwrap();
        assert_eq!(page.items.len(), 3);
        assert!(page.items.iter().all(|batch| batch.owner == "owner"));
    }
}
