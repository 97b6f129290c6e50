//! In-memory workflow store.

use std::collections::HashMap;

use jiff::{SignedDuration, Timestamp};
use ratchet_core::WorkflowId;
use ratchet_engine::definition::{WorkflowDefinition, WorkflowLock};
use tokio::sync::RwLock;

use crate::TRACING_TARGET_LOCK;
use crate::error::{StoreError, StoreResult};
use crate::pagination::{CursorPage, CursorPagination};
use crate::workflow::{UpdateWorkflow, WorkflowRecord, WorkflowStore, WorkflowSummary};

/// [`WorkflowStore`] backend over an in-process map.
#[derive(Debug, Default)]
pub struct MemoryWorkflowStore {
    records: RwLock<HashMap<WorkflowId, WorkflowRecord>>,
}

impl MemoryWorkflowStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl WorkflowStore for MemoryWorkflowStore {
    async fn create_workflow(&self, definition: &WorkflowDefinition) -> StoreResult<()> {
        self.create_workflows(std::slice::from_ref(definition)).await
    }

    async fn create_workflows(&self, definitions: &[WorkflowDefinition]) -> StoreResult<()> {
        let mut records = self.records.write().await;

        // Validate the whole set before touching the map.
        for definition in definitions {
            if records.contains_key(&definition.id) {
                return Err(StoreError::already_exists("workflow", definition.id));
            }
        }
        for definition in definitions {
            records.insert(definition.id, WorkflowRecord::new(definition.clone()));
        }
        Ok(())
    }

    async fn get_workflow(&self, id: WorkflowId) -> StoreResult<WorkflowRecord> {
        self.records
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or_else(|| StoreError::not_found("workflow", id))
    }

    async fn exists_workflow(&self, id: WorkflowId) -> StoreResult<bool> {
        Ok(self.records.read().await.contains_key(&id))
    }

    async fn update_workflow(&self, id: WorkflowId, update: UpdateWorkflow) -> StoreResult<()> {
        let mut records = self.records.write().await;
        let record = records
            .get_mut(&id)
            .ok_or_else(|| StoreError::not_found("workflow", id))?;

        update.apply(&mut record.definition);
        record.updated_at = Timestamp::now();
        Ok(())
    }

    async fn replace_workflow(&self, definition: &WorkflowDefinition) -> StoreResult<()> {
        let mut records = self.records.write().await;
        match records.get_mut(&definition.id) {
            Some(record) => {
                // The stored lock is authoritative; a replace cannot move it.
                let lock = record.definition.lock.clone();
                record.definition = definition.clone();
                record.definition.lock = lock;
                record.updated_at = Timestamp::now();
            }
            None => {
                records.insert(definition.id, WorkflowRecord::new(definition.clone()));
            }
        }
        Ok(())
    }

    async fn delete_workflow(&self, id: WorkflowId) -> StoreResult<()> {
        self.records
            .write()
            .await
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| StoreError::not_found("workflow", id))
    }

    async fn list_workflows(
        &self,
        owner: &str,
        pagination: CursorPagination,
    ) -> StoreResult<CursorPage<WorkflowSummary>> {
        let records = self.records.read().await;

        let mut rows: Vec<WorkflowSummary> = records
            .values()
            .filter(|record| record.definition.owner == owner)
            .filter(|record| {
                pagination.after.as_ref().is_none_or(|cursor| {
                    cursor.admits(record.created_at, record.definition.id.as_uuid())
                })
            })
            .map(WorkflowRecord::summary)
            .collect();

        rows.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| b.id.cmp(&a.id))
        });
        rows.truncate(pagination.fetch_limit() as usize);

        Ok(CursorPage::from_rows(rows, pagination.limit, |row| {
            (row.created_at, row.id.as_uuid())
        }))
    }

    async fn acquire_lock(
        &self,
        id: WorkflowId,
        holder: &str,
        ttl: SignedDuration,
    ) -> StoreResult<bool> {
        let mut records = self.records.write().await;
        let record = records
            .get_mut(&id)
            .ok_or_else(|| StoreError::not_found("workflow", id))?;

        let now = Timestamp::now();
        let free = match &record.definition.lock {
            None => true,
            Some(lock) if lock.holder == holder => true,
            Some(lock) => now.duration_since(lock.acquired_at) >= ttl,
        };

        if free {
            match &record.definition.lock {
                Some(lock) if lock.holder != holder => {
                    tracing::warn!(
                        target: TRACING_TARGET_LOCK,
                        workflow_id = %id,
                        previous_holder = %lock.holder,
                        holder = %holder,
                        "Taking over an expired workflow lock"
                    );
                }
                _ => {}
            }
            record.definition.lock = Some(WorkflowLock::held_by(holder));
            record.updated_at = now;
        }
        Ok(free)
    }

    async fn release_lock(&self, id: WorkflowId, holder: &str) -> StoreResult<()> {
        let mut records = self.records.write().await;
        let record = records
            .get_mut(&id)
            .ok_or_else(|| StoreError::not_found("workflow", id))?;

        if record
            .definition
            .lock
            .as_ref()
            .is_some_and(|lock| lock.holder == holder)
        {
            record.definition.lock = None;
            record.updated_at = Timestamp::now();
        }
        Ok(())
    }
}
