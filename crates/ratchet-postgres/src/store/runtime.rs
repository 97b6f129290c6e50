//! Durable runtime cursor store.

use ratchet_core::WorkflowId;
use ratchet_engine::RuntimeState;
use ratchet_store::{RuntimeStore, StoreError, StoreResult, UpdateRuntime};

use super::connection;
use crate::client::PgClient;
use crate::model::{NewRuntimeRow, UpdateRuntimeRow};
use crate::query::RuntimeRepository;

/// [`RuntimeStore`] backend over PostgreSQL.
///
/// The cursor is stored as one jsonb blob per workflow; `finished` is
/// denormalized into a column. Rows cascade away with their workflow.
#[derive(Debug, Clone)]
pub struct PgRuntimeStore {
    client: PgClient,
}

impl PgRuntimeStore {
    /// Creates a store over the given client.
    pub fn new(client: PgClient) -> Self {
        Self { client }
    }
}

#[async_trait::async_trait]
impl RuntimeStore for PgRuntimeStore {
    async fn create_runtime(&self, runtime: &RuntimeState) -> StoreResult<()> {
        let new_runtime = NewRuntimeRow {
            id: runtime.id.as_uuid(),
            state: serde_json::to_value(runtime)?,
            finished: runtime.finished,
        };

        let mut conn = connection(&self.client).await?;
        conn.create_runtime(new_runtime)
            .await
            .map_err(|err| err.into_store_error("runtime", runtime.id))?;
        Ok(())
    }

    async fn get_runtime(&self, id: WorkflowId) -> StoreResult<Option<RuntimeState>> {
        let mut conn = connection(&self.client).await?;
        let row = conn
            .find_runtime_by_id(id.as_uuid())
            .await
            .map_err(|err| err.into_store_error("runtime", id))?;

        match row {
            Some(row) => Ok(Some(serde_json::from_value(row.state)?)),
            None => Ok(None),
        }
    }

    async fn exists_runtime(&self, id: WorkflowId) -> StoreResult<bool> {
        let mut conn = connection(&self.client).await?;
        conn.runtime_exists(id.as_uuid())
            .await
            .map_err(|err| err.into_store_error("runtime", id))
    }

    async fn update_runtime(&self, id: WorkflowId, update: UpdateRuntime) -> StoreResult<()> {
        let mut conn = connection(&self.client).await?;

        // The cursor is one jsonb blob, so a patch is a read-modify-write.
        let row = conn
            .find_runtime_by_id(id.as_uuid())
            .await
            .map_err(|err| err.into_store_error("runtime", id))?
            .ok_or_else(|| StoreError::not_found("runtime", id))?;

        let mut runtime: RuntimeState = serde_json::from_value(row.state)?;
        update.apply(&mut runtime);

        let updates = UpdateRuntimeRow {
            state: Some(serde_json::to_value(&runtime)?),
            finished: Some(runtime.finished),
            updated_at: Some(jiff::Timestamp::now().into()),
        };
        conn.update_runtime(id.as_uuid(), updates)
            .await
            .map_err(|err| err.into_store_error("runtime", id))?;
        Ok(())
    }

    async fn replace_runtime(&self, runtime: &RuntimeState) -> StoreResult<()> {
        let state = serde_json::to_value(runtime)?;
        let new_runtime = NewRuntimeRow {
            id: runtime.id.as_uuid(),
            state: state.clone(),
            finished: runtime.finished,
        };
        let updates = UpdateRuntimeRow {
            state: Some(state),
            finished: Some(runtime.finished),
            updated_at: Some(jiff::Timestamp::now().into()),
        };

        let mut conn = connection(&self.client).await?;
        conn.upsert_runtime(new_runtime, updates)
            .await
            .map_err(|err| err.into_store_error("runtime", runtime.id))?;
        Ok(())
    }

    async fn delete_runtime(&self, id: WorkflowId) -> StoreResult<()> {
        let mut conn = connection(&self.client).await?;
        // Absent cursors are fine; the workflow may never have run.
        conn.delete_runtime(id.as_uuid())
            .await
            .map_err(|err| err.into_store_error("runtime", id))?;
        Ok(())
    }
}
