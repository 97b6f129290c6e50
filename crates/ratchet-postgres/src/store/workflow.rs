//! Durable workflow store.

use jiff::SignedDuration;
use ratchet_core::WorkflowId;
use ratchet_engine::definition::{WorkflowDefinition, WorkflowLock};
use ratchet_store::{
    CursorPage, CursorPagination, StoreError, StoreResult, UpdateWorkflow, WorkflowRecord,
    WorkflowStore, WorkflowSummary,
};
use uuid::Uuid;

use super::connection;
use crate::client::PgClient;
use crate::model::{NewWorkflowRow, UpdateWorkflowRow, WorkflowRow};
use crate::query::WorkflowRepository;

/// [`WorkflowStore`] backend over PostgreSQL.
///
/// The definition is persisted as jsonb; scheduling flags and the advisory
/// lock are denormalized into scalar columns so the lock compare-and-set
/// is a single conditional `UPDATE` and listings never parse payloads.
/// The columns are authoritative: reads overwrite the payload's copies.
#[derive(Debug, Clone)]
pub struct PgWorkflowStore {
    client: PgClient,
}

impl PgWorkflowStore {
    /// Creates a store over the given client.
    pub fn new(client: PgClient) -> Self {
        Self { client }
    }
}

fn new_row(definition: &WorkflowDefinition) -> StoreResult<NewWorkflowRow> {
    Ok(NewWorkflowRow {
        id: definition.id.as_uuid(),
        owner: definition.owner.clone(),
        name: definition.name.clone(),
        definition: serde_json::to_value(definition)?,
        is_initiated: definition.is_initiated,
        in_progress: definition.in_progress,
    })
}

fn record_from_row(row: WorkflowRow) -> StoreResult<WorkflowRecord> {
    let mut definition: WorkflowDefinition = serde_json::from_value(row.definition)?;

    // Scalar columns win over the payload's copies.
    definition.name = row.name;
    definition.is_initiated = row.is_initiated;
    definition.in_progress = row.in_progress;
    definition.lock = match (row.lock_holder, row.lock_acquired_at) {
        (Some(holder), Some(acquired_at)) => Some(WorkflowLock {
            holder,
            acquired_at: acquired_at.into(),
        }),
        _ => None,
    };

    Ok(WorkflowRecord {
        definition,
        created_at: row.created_at.into(),
        updated_at: row.updated_at.into(),
    })
}

fn summary_from_row(row: &WorkflowRow) -> WorkflowSummary {
    let awaiting_input = row
        .definition
        .get("expecting_input_for")
        .is_some_and(|value| !value.is_null());

    WorkflowSummary {
        id: WorkflowId::from_uuid(row.id),
        owner: row.owner.clone(),
        name: row.name.clone(),
        is_initiated: row.is_initiated,
        in_progress: row.in_progress,
        awaiting_input,
        created_at: row.created_at.into(),
        updated_at: row.updated_at.into(),
    }
}

#[async_trait::async_trait]
impl WorkflowStore for PgWorkflowStore {
    async fn create_workflow(&self, definition: &WorkflowDefinition) -> StoreResult<()> {
        self.create_workflows(std::slice::from_ref(definition)).await
    }

    async fn create_workflows(&self, definitions: &[WorkflowDefinition]) -> StoreResult<()> {
        if definitions.is_empty() {
            return Ok(());
        }
        let rows = definitions.iter().map(new_row).collect::<StoreResult<Vec<_>>>()?;
        let first_id = definitions[0].id;

        let mut conn = connection(&self.client).await?;
        // One multi-row INSERT; a conflict on any id aborts the statement
        // and nothing is stored.
        conn.create_workflows(rows)
            .await
            .map_err(|err| err.into_store_error("workflow", first_id))?;
        Ok(())
    }

    async fn get_workflow(&self, id: WorkflowId) -> StoreResult<WorkflowRecord> {
        let mut conn = connection(&self.client).await?;
        let row = conn
            .find_workflow_by_id(id.as_uuid())
            .await
            .map_err(|err| err.into_store_error("workflow", id))?
            .ok_or_else(|| StoreError::not_found("workflow", id))?;

        record_from_row(row)
    }

    async fn exists_workflow(&self, id: WorkflowId) -> StoreResult<bool> {
        let mut conn = connection(&self.client).await?;
        conn.workflow_exists(id.as_uuid())
            .await
            .map_err(|err| err.into_store_error("workflow", id))
    }

    async fn update_workflow(&self, id: WorkflowId, update: UpdateWorkflow) -> StoreResult<()> {
        // Patches touch the scalar columns only; the jsonb payload's copies
        // go stale but the columns are authoritative on read.
        let updates = UpdateWorkflowRow {
            name: update.name,
            definition: None,
            is_initiated: update.is_initiated,
            in_progress: update.in_progress,
            updated_at: Some(jiff::Timestamp::now().into()),
        };

        let mut conn = connection(&self.client).await?;
        conn.update_workflow(id.as_uuid(), updates)
            .await
            .map_err(|err| err.into_store_error("workflow", id))?;
        Ok(())
    }

    async fn replace_workflow(&self, definition: &WorkflowDefinition) -> StoreResult<()> {
        let updates = UpdateWorkflowRow {
            name: Some(definition.name.clone()),
            definition: Some(serde_json::to_value(definition)?),
            is_initiated: Some(definition.is_initiated),
            in_progress: Some(definition.in_progress),
            updated_at: Some(jiff::Timestamp::now().into()),
        };

        let mut conn = connection(&self.client).await?;
        conn.upsert_workflow(new_row(definition)?, updates)
            .await
            .map_err(|err| err.into_store_error("workflow", definition.id))?;
        Ok(())
    }

    async fn delete_workflow(&self, id: WorkflowId) -> StoreResult<()> {
        let mut conn = connection(&self.client).await?;
        let existed = conn
            .delete_workflow(id.as_uuid())
            .await
            .map_err(|err| err.into_store_error("workflow", id))?;

        if !existed {
            return Err(StoreError::not_found("workflow", id));
        }
        Ok(())
    }

    async fn list_workflows(
        &self,
        owner: &str,
        pagination: CursorPagination,
    ) -> StoreResult<CursorPage<WorkflowSummary>> {
        let mut conn = connection(&self.client).await?;
        let page = conn
            .cursor_list_workflows(owner, pagination)
            .await
            .map_err(|err| err.into_store_error("workflow", Uuid::nil()))?;

        Ok(page.map(|row| summary_from_row(&row)))
    }

    async fn acquire_lock(
        &self,
        id: WorkflowId,
        holder: &str,
        ttl: SignedDuration,
    ) -> StoreResult<bool> {
        let mut conn = connection(&self.client).await?;
        conn.try_acquire_lock(id.as_uuid(), holder, ttl)
            .await
            .map_err(|err| err.into_store_error("workflow", id))
    }

    async fn release_lock(&self, id: WorkflowId, holder: &str) -> StoreResult<()> {
        let mut conn = connection(&self.client).await?;
        conn.release_lock(id.as_uuid(), holder)
            .await
            .map_err(|err| err.into_store_error("workflow", id))
    }
}
