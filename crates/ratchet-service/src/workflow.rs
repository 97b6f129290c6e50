//! Workflow lifecycle operations.

use std::collections::HashSet;
use std::sync::Arc;

use jiff::{SignedDuration, Timestamp};
use ratchet_core::{NodeId, TypedValue, WorkflowId};
use ratchet_engine::definition::{
    CoreDefinition, ExpectedInput, LinkedWorkflow, WorkflowDefinition,
};
use ratchet_engine::node::NodeRegistry;
use ratchet_engine::{RuntimeState, WorkflowGraph};
use ratchet_queue::WorkflowQueue;
use ratchet_store::{RuntimeStore, UpdateWorkflow, WorkflowStore};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::TRACING_TARGET_WORKFLOW;
use crate::error::{ServiceError, ServiceResult};

/// Reported lifecycle phase of a workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[derive(strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum WorkflowStatus {
    /// Loaded but never scheduled.
    Idle,
    /// Scheduled, first node not yet executed.
    Initiated,
    /// A worker is advancing the run.
    InProgress,
    /// Paused until an external input arrives.
    AwaitingInput,
    /// Deliberately stopped by a node.
    Terminated,
    /// Ran to natural completion.
    Finished,
}

/// Point-in-time view of one workflow, as reported by [`WorkflowService::fetch`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WorkflowSnapshot {
    /// Workflow id.
    pub id: WorkflowId,
    /// Lifecycle phase.
    pub status: WorkflowStatus,
    /// The input slot a paused run is waiting on.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expecting_input_for: Option<ExpectedInput>,
    /// Terminal outputs, present once the run is finished or terminated.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Vec<TypedValue>>,
}

/// Recurrence description for [`WorkflowService::cron`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntervalSchedule {
    /// Delay between consecutive runs, in milliseconds.
    pub every_ms: u64,
    /// Total number of runs to pre-create.
    pub max_runs: u32,
    /// Optional absolute time of the first run; immediate when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_at: Option<Timestamp>,
}

/// Front-line operations on individual workflows.
#[derive(Clone)]
pub struct WorkflowService {
    workflows: Arc<dyn WorkflowStore>,
    runtimes: Arc<dyn RuntimeStore>,
    queue: Arc<dyn WorkflowQueue>,
    registry: Arc<NodeRegistry>,
}

impl WorkflowService {
    /// Creates a service over the given backends.
    pub fn new(
        workflows: Arc<dyn WorkflowStore>,
        runtimes: Arc<dyn RuntimeStore>,
        queue: Arc<dyn WorkflowQueue>,
        registry: Arc<NodeRegistry>,
    ) -> Self {
        Self {
            workflows,
            runtimes,
            queue,
            registry,
        }
    }

    /// Validates a client-supplied definition without persisting anything.
    ///
    /// Rejects empty graphs, unknown node kinds, dangling edge references,
    /// and cycles.
    pub fn validate(&self, core: &CoreDefinition) -> ServiceResult<()> {
        if core.nodes.is_empty() {
            return Err(ServiceError::validation("definition has no nodes"));
        }
        for node in &core.nodes {
            if !self.registry.supports(node.kind) {
                return Err(ServiceError::validation(format!(
                    "unsupported node kind: {}",
                    node.kind
                )));
            }
        }

        let scratch =
            WorkflowDefinition::from_core(WorkflowId::new(), "validation", core.clone());
        WorkflowGraph::compile(&scratch)?;
        Ok(())
    }

    /// Validates and persists a definition, seeding its runtime cursor.
    ///
    /// The workflow is stored idle; it does not run until initiated.
    pub async fn load(
        &self,
        owner: impl Into<String>,
        core: CoreDefinition,
    ) -> ServiceResult<WorkflowId> {
        self.validate(&core)?;

        let definition = WorkflowDefinition::from_core(WorkflowId::new(), owner, core);
        let id = definition.id;

        self.workflows.create_workflow(&definition).await?;
        self.runtimes
            .create_runtime(&RuntimeState::seeded(id, definition.entry))
            .await?;

        tracing::info!(
            target: TRACING_TARGET_WORKFLOW,
            workflow_id = %id,
            owner = %definition.owner,
            nodes = definition.nodes.len(),
            "Workflow loaded"
        );
        Ok(id)
    }

    /// Enqueues a workflow's first step immediately.
    pub async fn initiate(&self, id: WorkflowId) -> ServiceResult<()> {
        self.schedule(id, None).await
    }

    /// Enqueues a workflow's first step after an optional delay.
    ///
    /// Fails with `Conflict` when the workflow was already initiated or has
    /// finished, and with `Validation` when it is a linked continuation
    /// whose predecessor has not finished yet.
    pub async fn schedule(
        &self,
        id: WorkflowId,
        delay: Option<SignedDuration>,
    ) -> ServiceResult<()> {
        let record = self.workflows.get_workflow(id).await?;
        let definition = record.definition;

        let runtime = self.runtimes.get_runtime(id).await?;
        if runtime.as_ref().is_some_and(|runtime| runtime.finished) {
            return Err(ServiceError::conflict("workflow already finished"));
        }
        if definition.is_initiated {
            return Err(ServiceError::conflict("workflow already initiated"));
        }

        if let Some(previous) = definition.previous_linked {
            let predecessor_done = self
                .runtimes
                .get_runtime(previous)
                .await?
                .is_some_and(|runtime| runtime.finished);
            if !predecessor_done {
                return Err(ServiceError::validation(
                    "linked predecessor has not finished",
                ));
            }
        }

        let patch = UpdateWorkflow {
            is_initiated: Some(true),
            ..UpdateWorkflow::default()
        };
        self.workflows.update_workflow(id, patch).await?;

        if runtime.is_none() {
            self.runtimes
                .create_runtime(&RuntimeState::seeded(id, definition.entry))
                .await?;
        }

        self.queue.enqueue(id, delay).await?;
        tracing::info!(
            target: TRACING_TARGET_WORKFLOW,
            workflow_id = %id,
            delayed = delay.is_some(),
            "Workflow scheduled"
        );
        Ok(())
    }

    /// Reports the current lifecycle phase of a workflow.
    pub async fn fetch(&self, id: WorkflowId) -> ServiceResult<WorkflowSnapshot> {
        let record = self.workflows.get_workflow(id).await?;
        let runtime = self.runtimes.get_runtime(id).await?;
        let definition = &record.definition;

        let (status, result) = match &runtime {
            Some(runtime) if runtime.finished => match runtime.terminated_by {
                Some(node) => (
                    WorkflowStatus::Terminated,
                    Some(node_outputs(definition, node)),
                ),
                None => (WorkflowStatus::Finished, Some(leaf_outputs(definition))),
            },
            _ if definition.expecting_input_for.is_some() => {
                (WorkflowStatus::AwaitingInput, None)
            }
            _ if definition.in_progress => (WorkflowStatus::InProgress, None),
            _ if definition.is_initiated => (WorkflowStatus::Initiated, None),
            _ => (WorkflowStatus::Idle, None),
        };

        Ok(WorkflowSnapshot {
            id,
            status,
            expecting_input_for: definition.expecting_input_for,
            result,
        })
    }

    /// Supplies the external input a paused workflow is waiting on and
    /// re-schedules it.
    pub async fn external_input(
        &self,
        id: WorkflowId,
        node: NodeId,
        input_id: Uuid,
        data: serde_json::Value,
    ) -> ServiceResult<()> {
        let record = self.workflows.get_workflow(id).await?;
        let mut definition = record.definition;

        let expected = definition.expecting_input_for.ok_or_else(|| {
            ServiceError::validation("workflow is not awaiting external input")
        })?;
        if expected.node != node || expected.input_id != input_id {
            return Err(ServiceError::validation(format!(
                "workflow expects input {} for node {}",
                expected.input_id, expected.node
            )));
        }

        definition.push_external_input(expected, data);
        self.workflows.replace_workflow(&definition).await?;
        self.queue.enqueue(id, None).await?;

        tracing::info!(
            target: TRACING_TARGET_WORKFLOW,
            workflow_id = %id,
            node = %node,
            input_id = %input_id,
            "External input accepted"
        );
        Ok(())
    }

    /// Pre-creates a chain of linked workflow instances from one template.
    ///
    /// Builds `max_runs` copies linked head to tail with `every_ms` delay
    /// per link, persists all of them atomically, and enqueues only the
    /// first (delayed until `start_at` when that lies in the future).
    /// Returns the first instance's id.
    pub async fn cron(
        &self,
        owner: impl Into<String>,
        template: CoreDefinition,
        schedule: IntervalSchedule,
    ) -> ServiceResult<WorkflowId> {
        self.validate(&template)?;
        if schedule.max_runs == 0 {
            return Err(ServiceError::validation("cron requires at least one run"));
        }

        let owner = owner.into();
        let mut definitions: Vec<WorkflowDefinition> = (0..schedule.max_runs)
            .map(|_| {
                WorkflowDefinition::from_core(WorkflowId::new(), owner.clone(), template.clone())
            })
            .collect();

        for index in 0..definitions.len() {
            if index + 1 < definitions.len() {
                let next_id = definitions[index + 1].id;
                definitions[index].next_linked = vec![LinkedWorkflow {
                    id: next_id,
                    execution_delay_ms: schedule.every_ms,
                }];
            }
            if index > 0 {
                let previous_id = definitions[index - 1].id;
                definitions[index].previous_linked = Some(previous_id);
            }
        }
        definitions[0].is_initiated = true;
        let first_id = definitions[0].id;

        self.workflows.create_workflows(&definitions).await?;
        for definition in &definitions {
            self.runtimes
                .create_runtime(&RuntimeState::seeded(definition.id, definition.entry))
                .await?;
        }

        let delay = schedule
            .start_at
            .map(|start_at| start_at.duration_since(Timestamp::now()))
            .filter(|delay| delay.is_positive());
        self.queue.enqueue(first_id, delay).await?;

        tracing::info!(
            target: TRACING_TARGET_WORKFLOW,
            workflow_id = %first_id,
            runs = schedule.max_runs,
            every_ms = schedule.every_ms,
            "Cron chain created"
        );
        Ok(first_id)
    }
}

/// Outputs of one node, for terminated runs.
fn node_outputs(definition: &WorkflowDefinition, node: NodeId) -> Vec<TypedValue> {
    definition
        .nodes
        .iter()
        .find(|candidate| candidate.id == node)
        .map(|node| node.outputs.clone())
        .unwrap_or_default()
}

/// Concatenated outputs of executed leaf nodes, for finished runs.
fn leaf_outputs(definition: &WorkflowDefinition) -> Vec<TypedValue> {
    let parents: HashSet<NodeId> = definition.edges.iter().map(|edge| edge.from).collect();
    definition
        .nodes
        .iter()
        .filter(|node| node.executed && !parents.contains(&node.id))
        .flat_map(|node| node.outputs.iter().cloned())
        .collect()
}

#[cfg(test)]
mod tests {
    use ratchet_engine::definition::{Edge, Node, NodeKind};
    use ratchet_queue::MemoryQueue;
    use ratchet_store::memory::{MemoryRuntimeStore, MemoryWorkflowStore};
    use serde_json::json;

    use super::*;

    fn service() -> (WorkflowService, Arc<MemoryWorkflowStore>, Arc<MemoryQueue>) {
        let workflows = Arc::new(MemoryWorkflowStore::new());
        let queue = Arc::new(MemoryQueue::new());
        let service = WorkflowService::new(
            workflows.clone(),
            Arc::new(MemoryRuntimeStore::new()),
            queue.clone(),
            Arc::new(NodeRegistry::with_builtins()),
        );
        (service, workflows, queue)
    }

    fn two_node_core() -> CoreDefinition {
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
    async fn validate_rejects_cycles_and_empty_graphs() {
        let (service, _, _) = service();

        let mut core = two_node_core();
        let (a, b) = (core.nodes[0].id, core.nodes[1].id);
        core.edges.push(Edge::new(b, a));
        assert!(matches!(
            service.validate(&core),
            Err(ServiceError::Engine(_))
        ));

        let empty = CoreDefinition {
            name: None,
            version: 1,
            nodes: vec![],
            edges: vec![],
            entry: NodeId::new(),
            global_state: None,
        };
        assert!(matches!(
            service.validate(&empty),
            Err(ServiceError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn load_then_initiate_enqueues_once() {
        let (service, _, queue) = service();
        let id = service.load("owner", two_node_core()).await.unwrap();

        let snapshot = service.fetch(id).await.unwrap();
        assert_eq!(snapshot.status, WorkflowStatus::Idle);

        service.initiate(id).await.unwrap();
        assert_eq!(queue.size().await.unwrap(), 1);

        let snapshot = service.fetch(id).await.unwrap();
        assert_eq!(snapshot.status, WorkflowStatus::Initiated);

        let again = service.initiate(id).await;
        assert!(matches!(again, Err(ServiceError::Conflict(_))));
        assert_eq!(queue.size().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn external_input_requires_a_waiting_workflow() {
        let (service, workflows, queue) = service();
        let id = service.load("owner", two_node_core()).await.unwrap();

        let rejected = service
            .external_input(id, NodeId::new(), Uuid::from_u128(1), json!("data"))
            .await;
        assert!(matches!(rejected, Err(ServiceError::Validation(_))));

        // Mark the workflow paused, then resume it through the service.
        let mut record = workflows.get_workflow(id).await.unwrap();
        let node = record.definition.entry;
        let input_id = Uuid::from_u128(9);
        record.definition.expecting_input_for = Some(ExpectedInput { node, input_id });
        workflows.replace_workflow(&record.definition).await.unwrap();

        let wrong_slot = service
            .external_input(id, node, Uuid::from_u128(8), json!("data"))
            .await;
        assert!(matches!(wrong_slot, Err(ServiceError::Validation(_))));

        service
            .external_input(id, node, input_id, json!("data"))
            .await
            .unwrap();
        assert_eq!(queue.size().await.unwrap(), 1);

        let record = workflows.get_workflow(id).await.unwrap();
        assert!(!record.definition.external_input_storage.is_empty());
    }

    #[tokio::test]
    async fn cron_links_instances_and_enqueues_only_first() {
        let (service, workflows, queue) = service();
        let first = service
            .cron(
                "owner",
                two_node_core(),
                IntervalSchedule {
                    every_ms: 60_000,
                    max_runs: 3,
                    start_at: None,
                },
            )
            .await
            .unwrap();

        assert_eq!(queue.size().await.unwrap(), 1);

        let head = workflows.get_workflow(first).await.unwrap().definition;
        assert!(head.is_initiated);
        assert!(head.previous_linked.is_none());
        assert_eq!(head.next_linked.len(), 1);
        assert_eq!(head.next_linked[0].execution_delay_ms, 60_000);

        let second = workflows
            .get_workflow(head.next_linked[0].id)
            .await
            .unwrap()
            .definition;
        assert!(!second.is_initiated);
        assert_eq!(second.previous_linked, Some(first));
        assert_eq!(second.next_linked.len(), 1);

        let tail = workflows
            .get_workflow(second.next_linked[0].id)
            .await
            .unwrap()
            .definition;
        assert!(tail.next_linked.is_empty());

        // A continuation cannot be scheduled while its predecessor is live.
        let blocked = service.schedule(second.id, None).await;
        assert!(matches!(blocked, Err(ServiceError::Validation(_))));
    }

    #[tokio::test]
    async fn fetch_reports_terminal_states() {
        let (service, workflows, _) = service();
        let id = service.load("owner", two_node_core()).await.unwrap();

        // Simulate a finished run.
        let record = workflows.get_workflow(id).await.unwrap();
        let mut definition = record.definition;
        for node in &mut definition.nodes {
            node.executed = true;
            node.outputs = vec![TypedValue::new("out", "done")];
        }
        workflows.replace_workflow(&definition).await.unwrap();

        let runtimes = MemoryRuntimeStore::new();
        let mut runtime = RuntimeState::seeded(id, definition.entry);
        runtime.finished = true;
        runtimes.create_runtime(&runtime).await.unwrap();

        let service = WorkflowService::new(
            workflows.clone(),
            Arc::new(runtimes),
            Arc::new(MemoryQueue::new()),
            Arc::new(NodeRegistry::with_builtins()),
        );

        let snapshot = service.fetch(id).await.unwrap();
        assert_eq!(snapshot.status, WorkflowStatus::Finished);
        // Only the leaf node's outputs count as the result.
        assert_eq!(snapshot.result.as_deref().map(<[TypedValue]>::len), Some(1));
    }
}
