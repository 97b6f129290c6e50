//! Batch lifecycle operations.

use std::sync::Arc;

use jiff::SignedDuration;
use ratchet_core::{BatchId, WorkflowId};
use ratchet_engine::RuntimeState;
use ratchet_engine::definition::{CoreDefinition, WorkflowDefinition};
use ratchet_queue::WorkflowQueue;
use ratchet_store::{
    BatchStore, CursorPage, CursorPagination, RuntimeStore, WorkflowBatch, WorkflowStore,
};
use serde::Serialize;

use crate::TRACING_TARGET_BATCH;
use crate::error::{ServiceError, ServiceResult};

/// Result of a successful batch creation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchCreated {
    /// The new batch's id.
    pub batch_id: BatchId,
    /// Member workflow ids, one per requested delay, in order.
    pub workflow_ids: Vec<WorkflowId>,
}

/// Front-line operations on workflow batches.
///
/// A batch stamps N independent instances out of one template and tracks
/// them as a group. Creation is all-or-none: any failure rolls back every
/// workflow, runtime, and membership record written so far.
#[derive(Clone)]
pub struct BatchService {
    workflows: Arc<dyn WorkflowStore>,
    runtimes: Arc<dyn RuntimeStore>,
    batches: Arc<dyn BatchStore>,
    queue: Arc<dyn WorkflowQueue>,
}

impl BatchService {
    /// Creates a service over the given backends.
    pub fn new(
        workflows: Arc<dyn WorkflowStore>,
        runtimes: Arc<dyn RuntimeStore>,
        batches: Arc<dyn BatchStore>,
        queue: Arc<dyn WorkflowQueue>,
    ) -> Self {
        Self {
            workflows,
            runtimes,
            batches,
            queue,
        }
    }

    /// Creates one workflow per delay from the template and schedules all
    /// of them.
    ///
    /// `delays_ms[i]` delays the i-th member's first step. All-or-none: on
    /// any failure nothing remains persisted and the error is returned.
    pub async fn create_batch(
        &self,
        owner: impl Into<String>,
        name: Option<String>,
        template: CoreDefinition,
        delays_ms: &[u64],
    ) -> ServiceResult<BatchCreated> {
        if delays_ms.is_empty() {
            return Err(ServiceError::validation("batch requires at least one member"));
        }
        let scratch =
            WorkflowDefinition::from_core(WorkflowId::new(), "validation", template.clone());
        ratchet_engine::WorkflowGraph::compile(&scratch)?;

        let owner = owner.into();
        let definitions: Vec<WorkflowDefinition> = delays_ms
            .iter()
            .map(|_| {
                let mut definition = WorkflowDefinition::from_core(
                    WorkflowId::new(),
                    owner.clone(),
                    template.clone(),
                );
                definition.is_initiated = true;
                definition
            })
            .collect();
        let workflow_ids: Vec<WorkflowId> =
            definitions.iter().map(|definition| definition.id).collect();

        // Workflows land in one atomic write; runtimes and the membership
        // record are rolled back by hand if anything after them fails.
        self.workflows.create_workflows(&definitions).await?;

        let batch = WorkflowBatch::new(owner, name, workflow_ids.clone());
        let batch_id = batch.id;

        let seed = async {
            for definition in &definitions {
                self.runtimes
                    .create_runtime(&RuntimeState::seeded(definition.id, definition.entry))
                    .await?;
            }
            self.batches.create_batch(&batch).await?;
            ServiceResult::Ok(())
        };
        if let Err(err) = seed.await {
            self.rollback(batch_id, &workflow_ids).await;
            return Err(err);
        }

        let schedule = async {
            for (definition, delay_ms) in definitions.iter().zip(delays_ms) {
                let delay = match *delay_ms {
                    0 => None,
                    millis => Some(SignedDuration::from_millis(millis as i64)),
                };
                self.queue.enqueue(definition.id, delay).await?;
            }
            ServiceResult::Ok(())
        };
        if let Err(err) = schedule.await {
            // Messages already published cannot be recalled; the worker
            // drops jobs whose workflow no longer exists.
            self.rollback(batch_id, &workflow_ids).await;
            return Err(err);
        }

        tracing::info!(
            target: TRACING_TARGET_BATCH,
            batch_id = %batch_id,
            members = workflow_ids.len(),
            "Batch created"
        );
        Ok(BatchCreated {
            batch_id,
            workflow_ids,
        })
    }

    /// Returns whether a batch exists.
    pub async fn exists_batch(&self, id: BatchId) -> ServiceResult<bool> {
        Ok(self.batches.exists_batch(id).await?)
    }

    /// Fetches a batch by id.
    pub async fn get_batch(&self, id: BatchId) -> ServiceResult<WorkflowBatch> {
        Ok(self.batches.get_batch(id).await?)
    }

    /// Lists an owner's batches, newest first.
    pub async fn list_batches(
        &self,
        owner: &str,
        pagination: CursorPagination,
    ) -> ServiceResult<CursorPage<WorkflowBatch>> {
        Ok(self.batches.list_batches(owner, pagination).await?)
    }

    /// Deletes a batch and cascades to its member workflows and runtimes.
    pub async fn delete_batch(&self, id: BatchId) -> ServiceResult<()> {
        let batch = self.batches.get_batch(id).await?;

        for workflow_id in &batch.workflow_ids {
            self.runtimes.delete_runtime(*workflow_id).await?;
            match self.workflows.delete_workflow(*workflow_id).await {
                Ok(()) => {}
                Err(err) if err.is_not_found() => {}
                Err(err) => return Err(err.into()),
            }
        }
        self.batches.delete_batch(id).await?;

        tracing::info!(
            target: TRACING_TARGET_BATCH,
            batch_id = %id,
            members = batch.workflow_ids.len(),
            "Batch deleted"
        );
        Ok(())
    }

    /// Best-effort removal of partially created batch state.
    async fn rollback(&self, batch_id: BatchId, workflow_ids: &[WorkflowId]) {
        for workflow_id in workflow_ids {
            if let Err(err) = self.runtimes.delete_runtime(*workflow_id).await {
                tracing::warn!(
                    target: TRACING_TARGET_BATCH,
                    workflow_id = %workflow_id,
                    error = %err,
                    "Batch rollback failed to delete runtime"
                );
            }
            match self.workflows.delete_workflow(*workflow_id).await {
                Ok(()) => {}
                Err(err) if err.is_not_found() => {}
                Err(err) => {
                    tracing::warn!(
                        target: TRACING_TARGET_BATCH,
                        workflow_id = %workflow_id,
                        error = %err,
                        "Batch rollback failed to delete workflow"
                    );
                }
            }
        }
        match self.batches.delete_batch(batch_id).await {
            Ok(()) => {}
            // The membership record may not have been written yet.
            Err(err) if err.is_not_found() => {}
            Err(err) => {
                tracing::warn!(
                    target: TRACING_TARGET_BATCH,
                    batch_id = %batch_id,
                    error = %err,
                    "Batch rollback failed to delete membership record"
                );
            }
        }
        tracing::warn!(
            target: TRACING_TARGET_BATCH,
            batch_id = %batch_id,
            "Batch creation rolled back"
        );
    }
}

#[cfg(test)]
mod tests {
    use ratchet_engine::definition::{Edge, Node, NodeKind};
    use ratchet_queue::MemoryQueue;
    use ratchet_store::StoreError;
    use ratchet_store::memory::{MemoryBatchStore, MemoryRuntimeStore, MemoryWorkflowStore};
    use serde_json::json;

    use super::*;

    struct Fixture {
        service: BatchService,
        workflows: Arc<MemoryWorkflowStore>,
        runtimes: Arc<MemoryRuntimeStore>,
        queue: Arc<MemoryQueue>,
    }

    fn fixture() -> Fixture {
        let workflows = Arc::new(MemoryWorkflowStore::new());
        let runtimes = Arc::new(MemoryRuntimeStore::new());
        let queue = Arc::new(MemoryQueue::new());
        let service = BatchService::new(
            workflows.clone(),
            runtimes.clone(),
            Arc::new(MemoryBatchStore::new()),
            queue.clone(),
        );
        Fixture {
            service,
            workflows,
            runtimes,
            queue,
        }
    }

    fn template() -> CoreDefinition {
        let a = Node::new(NodeKind::Value).with_config(json!({
            "outputs": [{"name": "a", "type": "string", "value": "a"}]
        }));
        let b = Node::new(NodeKind::NoOp);
        let entry = a.id;
        let edges = vec![Edge::new(a.id, b.id)];
        CoreDefinition {
            name: None,
            version: 1,
            nodes: vec![a, b],
            edges,
            entry,
            global_state: None,
        }
    }

    #[tokio::test]
    async fn create_batch_persists_members_and_schedules_all() {
        let fixture = fixture();
        let created = fixture
            .service
            .create_batch("owner", Some("nightly".into()), template(), &[0, 500, 1000])
            .await
            .unwrap();

        assert_eq!(created.workflow_ids.len(), 3);
        assert_eq!(fixture.queue.size().await.unwrap(), 3);

        for id in &created.workflow_ids {
            let record = fixture.workflows.get_workflow(*id).await.unwrap();
            assert!(record.definition.is_initiated);
            assert!(fixture.runtimes.get_runtime(*id).await.unwrap().is_some());
        }

        let batch = fixture.service.get_batch(created.batch_id).await.unwrap();
        assert_eq!(batch.workflow_ids, created.workflow_ids);
        assert!(fixture.service.exists_batch(created.batch_id).await.unwrap());
    }

    #[tokio::test]
    async fn empty_batch_is_rejected() {
        let fixture = fixture();
        let rejected = fixture
            .service
            .create_batch("owner", None, template(), &[])
            .await;
        assert!(matches!(rejected, Err(ServiceError::Validation(_))));
    }

    #[tokio::test]
    async fn enqueue_failure_rolls_back_the_batch() {
        let fixture = fixture();
        fixture.queue.close().await.unwrap();

        let rejected = fixture
            .service
            .create_batch("owner", None, template(), &[0, 0])
            .await;
        assert!(matches!(rejected, Err(ServiceError::Queue(_))));

        // Nothing stays persisted: no batches, no members, no runtimes.
        let page = fixture
            .service
            .list_batches("owner", CursorPagination::new(10))
            .await
            .unwrap();
        assert!(page.items.is_empty());
        let workflows = fixture
            .workflows
            .list_workflows("owner", CursorPagination::new(10))
            .await
            .unwrap();
        assert!(workflows.items.is_empty());
    }

    #[tokio::test]
    async fn delete_batch_cascades_to_members() {
        let fixture = fixture();
        let created = fixture
            .service
            .create_batch("owner", None, template(), &[0, 0])
            .await
            .unwrap();

        fixture.service.delete_batch(created.batch_id).await.unwrap();

        assert!(!fixture.service.exists_batch(created.batch_id).await.unwrap());
        for id in &created.workflow_ids {
            let gone = fixture.workflows.get_workflow(*id).await;
            assert!(matches!(gone, Err(StoreError::NotFound { .. })));
            assert!(fixture.runtimes.get_runtime(*id).await.unwrap().is_none());
        }
    }

    #[tokio::test]
    async fn list_batches_pages_by_owner() {
        let fixture = fixture();
        for _ in 0..3 {
            fixture
                .service
                .create_batch("owner", None, template(), &[0])
                .await
                .unwrap();
        }
        fixture
            .service
            .create_batch("someone-else", None, template(), &[0])
            .await
            .unwrap();

        let page = fixture
            .service
            .list_batches("owner", CursorPagination::new(2))
            .await
            .unwrap();
        assert_eq!(page.items.len(), 2);
        assert!(page.has_more());

        let rest = fixture
            .service
            .list_batches(
                "owner",
                CursorPagination::from_cursor_string(2, page.next_cursor.as_deref()),
            )
            .await
            .unwrap();
        assert_eq!(rest.items.len(), 1);
        assert!(!rest.has_more());
    }
}
