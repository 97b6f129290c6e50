//! In-memory runtime store.

use std::collections::HashMap;

use ratchet_core::WorkflowId;
use ratchet_engine::RuntimeState;
use tokio::sync::RwLock;

use crate::error::{StoreError, StoreResult};
use crate::runtime::{RuntimeStore, UpdateRuntime};

/// [`RuntimeStore`] backend over an in-process map.
#[derive(Debug, Default)]
pub struct MemoryRuntimeStore {
    cursors: RwLock<HashMap<WorkflowId, RuntimeState>>,
}

impl MemoryRuntimeStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl RuntimeStore for MemoryRuntimeStore {
    async fn create_runtime(&self, runtime: &RuntimeState) -> StoreResult<()> {
        let mut cursors = self.cursors.write().await;
        if cursors.contains_key(&runtime.id) {
            return Err(StoreError::already_exists("runtime", runtime.id));
        }
        cursors.insert(runtime.id, runtime.clone());
        Ok(())
    }

    async fn get_runtime(&self, id: WorkflowId) -> StoreResult<Option<RuntimeState>> {
        Ok(self.cursors.read().await.get(&id).cloned())
    }

    async fn exists_runtime(&self, id: WorkflowId) -> StoreResult<bool> {
        Ok(self.cursors.read().await.contains_key(&id))
    }

    async fn update_runtime(&self, id: WorkflowId, update: UpdateRuntime) -> StoreResult<()> {
        let mut cursors = self.cursors.write().await;
        let runtime = cursors
            .get_mut(&id)
            .ok_or_else(|| StoreError::not_found("runtime", id))?;

        update.apply(runtime);
        Ok(())
    }

    async fn replace_runtime(&self, runtime: &RuntimeState) -> StoreResult<()> {
        self.cursors.write().await.insert(runtime.id, runtime.clone());
        Ok(())
    }

    async fn delete_runtime(&self, id: WorkflowId) -> StoreResult<()> {
        self.cursors.write().await.remove(&id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ratchet_core::NodeId;

    #[tokio::test]
    async fn runtime_lifecycle() {
        let store = MemoryRuntimeStore::new();
        let id = WorkflowId::new();
        let mut runtime = RuntimeState::seeded(id, NodeId::new());

        store.create_runtime(&runtime).await.unwrap();
        assert!(matches!(
            store.create_runtime(&runtime).await,
            Err(StoreError::AlreadyExists { .. })
        ));
        assert!(store.exists_runtime(id).await.unwrap());

        runtime.finish();
        store.replace_runtime(&runtime).await.unwrap();
        let stored = store.get_runtime(id).await.unwrap().unwrap();
        assert!(stored.finished);

        store.delete_runtime(id).await.unwrap();
        assert!(store.get_runtime(id).await.unwrap().is_none());
        assert!(!store.exists_runtime(id).await.unwrap());
        // Deleting an absent cursor is fine.
        store.delete_runtime(id).await.unwrap();
    }

    #[tokio::test]
    async fn replace_inserts_when_absent() {
        let store = MemoryRuntimeStore::new();
        let runtime = RuntimeState::seeded(WorkflowId::new(), NodeId::new());

        store.replace_runtime(&runtime).await.unwrap();
        assert!(store.get_runtime(runtime.id).await.unwrap().is_some());
        // Replaying the same write is harmless.
        store.replace_runtime(&runtime).await.unwrap();
    }

    #[tokio::test]
    async fn patch_updates_cursor_fields() {
        let store = MemoryRuntimeStore::new();
        let entry = NodeId::new();
        let mut runtime = RuntimeState::seeded(WorkflowId::new(), entry);
        runtime.pop_current();
        store.create_runtime(&runtime).await.unwrap();

        let patch = UpdateRuntime {
            current: Some(None),
            finished: Some(true),
        };
        assert!(!patch.is_empty());
        assert!(UpdateRuntime::default().is_empty());
        store.update_runtime(runtime.id, patch.clone()).await.unwrap();

        let stored = store.get_runtime(runtime.id).await.unwrap().unwrap();
        assert!(stored.current.is_none());
        assert!(stored.finished);

        let missing = store.update_runtime(WorkflowId::new(), patch).await;
        assert!(matches!(missing, Err(StoreError::NotFound { .. })));
    }
}
