//! The workflow advancement loop.

use std::sync::Arc;

use ratchet_core::WorkflowId;
use ratchet_engine::definition::{LinkedWorkflow, WorkflowDefinition};
use ratchet_engine::node::NodeRegistry;
use ratchet_engine::{ClockResult, EngineError, RuntimeState, Workflow};
use ratchet_queue::{Delivery, QueueConsumer, WorkflowQueue};
use ratchet_store::{RuntimeStore, UpdateWorkflow, WorkflowStore};
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::TRACING_TARGET_WORKER;
use crate::config::WorkerConfig;
use crate::error::Result;

/// Shared handles a worker needs to advance workflows.
#[derive(Clone)]
pub struct WorkerContext {
    /// Workflow definition storage.
    pub workflows: Arc<dyn WorkflowStore>,
    /// Runtime cursor storage.
    pub runtimes: Arc<dyn RuntimeStore>,
    /// Scheduling queue producer, used for re-enqueueing and linked
    /// continuations.
    pub queue: Arc<dyn WorkflowQueue>,
    /// Node executor registry.
    pub registry: Arc<NodeRegistry>,
}

/// How a processed delivery should be settled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Settle {
    /// The step is done; do not redeliver.
    Ack,
    /// The step could not run yet; redeliver.
    Retry,
    /// The job can never succeed; drop it.
    Discard,
}

/// Background worker that advances workflows one node per delivery.
///
/// Exactly one `clock()` transition happens per delivery. The advisory
/// lock makes concurrent workers safe: only the lock holder advances a
/// given workflow, everyone else redelivers and tries again. Deliveries
/// are processed on spawned tasks, bounded by a semaphore.
pub struct WorkflowWorker {
    processor: StepProcessor,
    cancel_token: CancellationToken,
    semaphore: Arc<Semaphore>,
}

/// The per-delivery half of the worker, cloned into each spawned task.
#[derive(Clone)]
struct StepProcessor {
    context: WorkerContext,
    config: WorkerConfig,
    worker_id: String,
}

impl WorkflowWorker {
    /// Creates a new worker.
    ///
    /// The lock-holder name comes from the configuration, or is generated
    /// from a fresh UUID so two instances never collide.
    pub fn new(context: WorkerContext, config: WorkerConfig, cancel_token: CancellationToken) -> Self {
        let worker_id = config
            .worker_id
            .clone()
            .unwrap_or_else(|| format!("worker-{}", Uuid::now_v7().simple()));
        let semaphore = Arc::new(Semaphore::new(config.max_concurrent_jobs()));

        Self {
            processor: StepProcessor {
                context,
                config,
                worker_id,
            },
            cancel_token,
            semaphore,
        }
    }

    /// Returns the lock-holder name of this instance.
    pub fn worker_id(&self) -> &str {
        &self.processor.worker_id
    }

    /// Spawns the worker as a background task.
    pub fn spawn<C>(self, consumer: C) -> JoinHandle<Result<()>>
    where
        C: QueueConsumer + 'static,
    {
        tokio::spawn(async move { self.run(consumer).await })
    }

    /// Runs the worker loop until cancellation or queue shutdown.
    pub async fn run<C>(self, consumer: C) -> Result<()>
    where
        C: QueueConsumer,
    {
        tracing::info!(
            target: TRACING_TARGET_WORKER,
            worker_id = %self.processor.worker_id,
            "Starting workflow worker"
        );

        loop {
            tokio::select! {
                biased;

                () = self.cancel_token.cancelled() => {
                    tracing::info!(
                        target: TRACING_TARGET_WORKER,
                        worker_id = %self.processor.worker_id,
                        "Shutdown requested, stopping worker"
                    );
                    break;
                }

                result = consumer.next() => {
                    match result {
                        Ok(Some(delivery)) => {
                            let permit = match self.semaphore.clone().acquire_owned().await {
                                Ok(permit) => permit,
                                Err(_) => break,
                            };
                            let processor = self.processor.clone();
                            tokio::spawn(async move {
                                // Hold the permit until the step settles.
                                let _permit = permit;
                                processor.process(delivery).await;
                            });
                        }
                        Ok(None) => {
                            tracing::info!(
                                target: TRACING_TARGET_WORKER,
                                worker_id = %self.processor.worker_id,
                                "Queue closed, stopping worker"
                            );
                            break;
                        }
                        Err(err) => {
                            tracing::error!(
                                target: TRACING_TARGET_WORKER,
                                error = %err,
                                "Failed to receive delivery"
                            );
                        }
                    }
                }
            }
        }

        Ok(())
    }
}

impl StepProcessor {
    /// Processes one delivery and settles it.
    async fn process(&self, delivery: Box<dyn Delivery>) {
        let workflow_id = delivery.job().workflow_id;

        let settle = match self.advance(workflow_id).await {
            Ok(settle) => settle,
            Err(err) => {
                tracing::error!(
                    target: TRACING_TARGET_WORKER,
                    workflow_id = %workflow_id,
                    error = %err,
                    "Step failed, redelivering"
                );
                Settle::Retry
            }
        };

        let settled = match settle {
            Settle::Ack => delivery.ack().await,
            Settle::Retry => delivery.nack(true).await,
            Settle::Discard => delivery.nack(false).await,
        };
        if let Err(err) = settled {
            tracing::error!(
                target: TRACING_TARGET_WORKER,
                workflow_id = %workflow_id,
                error = %err,
                "Failed to settle delivery"
            );
        }
    }

    /// Takes the advisory lock and performs one step.
    async fn advance(&self, workflow_id: WorkflowId) -> Result<Settle> {
        let locked = self
            .context
            .workflows
            .acquire_lock(workflow_id, &self.worker_id, self.config.lock_ttl())
            .await?;

        if !locked {
            tracing::debug!(
                target: TRACING_TARGET_WORKER,
                workflow_id = %workflow_id,
                worker_id = %self.worker_id,
                "Workflow locked elsewhere, redelivering"
            );
            return Ok(Settle::Retry);
        }

        let outcome = self.step(workflow_id).await;

        if let Err(err) = self
            .context
            .workflows
            .release_lock(workflow_id, &self.worker_id)
            .await
        {
            tracing::warn!(
                target: TRACING_TARGET_WORKER,
                workflow_id = %workflow_id,
                error = %err,
                "Failed to release workflow lock"
            );
        }

        outcome
    }

    /// Performs exactly one `clock()` transition under the lock.
    async fn step(&self, workflow_id: WorkflowId) -> Result<Settle> {
        let record = match self.context.workflows.get_workflow(workflow_id).await {
            Ok(record) => record,
            Err(err) if err.is_not_found() => {
                tracing::warn!(
                    target: TRACING_TARGET_WORKER,
                    workflow_id = %workflow_id,
                    "Scheduled workflow no longer exists, dropping job"
                );
                return Ok(Settle::Discard);
            }
            Err(err) => return Err(err.into()),
        };

        let existing = self.context.runtimes.get_runtime(workflow_id).await?;

        if existing.as_ref().is_some_and(|runtime| runtime.finished) {
            tracing::debug!(
                target: TRACING_TARGET_WORKER,
                workflow_id = %workflow_id,
                "Duplicate delivery for a finished run, dropping job"
            );
            return Ok(Settle::Discard);
        }

        let engine = match existing {
            Some(runtime) => Workflow::resume(record.definition, runtime, self.context.registry.clone()),
            None => Workflow::new(record.definition, self.context.registry.clone()),
        };
        let mut engine = match engine {
            Ok(engine) => engine,
            Err(err) => {
                tracing::error!(
                    target: TRACING_TARGET_WORKER,
                    workflow_id = %workflow_id,
                    error = %err,
                    "Workflow rejected by the engine, dropping job"
                );
                return Ok(Settle::Discard);
            }
        };

        let result = match engine.clock().await {
            Ok(result) => result,
            Err(EngineError::AlreadyExecuted) => {
                tracing::debug!(
                    target: TRACING_TARGET_WORKER,
                    workflow_id = %workflow_id,
                    "Run already complete, dropping job"
                );
                return Ok(Settle::Discard);
            }
            Err(err) => {
                tracing::error!(
                    target: TRACING_TARGET_WORKER,
                    workflow_id = %workflow_id,
                    error = %err,
                    "Step cannot execute, dropping job"
                );
                return Ok(Settle::Discard);
            }
        };

        let (mut definition, runtime) = engine.into_parts();
        let finished = runtime.finished;
        let awaiting = matches!(result, ClockResult::AwaitingInput { .. });

        // A paused run is not in progress: nothing advances it until the
        // input arrives. A finished run sheds both scheduling flags.
        definition.in_progress = !finished && !awaiting;
        if finished {
            definition.is_initiated = false;
        }

        self.persist(&definition, &runtime).await?;

        match result {
            ClockResult::AwaitingInput { node, input_id } => {
                tracing::info!(
                    target: TRACING_TARGET_WORKER,
                    workflow_id = %workflow_id,
                    node = %node,
                    input_id = %input_id,
                    "Workflow paused awaiting external input"
                );
                // No re-enqueue: supplying the input re-schedules the run.
            }
            _ if finished => {
                tracing::info!(
                    target: TRACING_TARGET_WORKER,
                    workflow_id = %workflow_id,
                    terminated = runtime.terminated_by.is_some(),
                    "Workflow run complete"
                );
                // Deliberate termination does not trigger continuations.
                if runtime.terminated_by.is_none() {
                    for linked in &definition.next_linked {
                        self.initiate_linked(linked).await;
                    }
                }
            }
            ClockResult::NodeError { node, code, .. } => {
                tracing::warn!(
                    target: TRACING_TARGET_WORKER,
                    workflow_id = %workflow_id,
                    node = %node,
                    code = %code,
                    "Node failed, remaining branches continue"
                );
                self.context
                    .queue
                    .enqueue(workflow_id, self.config.step_delay())
                    .await?;
            }
            ClockResult::Completed { node, .. } => {
                tracing::debug!(
                    target: TRACING_TARGET_WORKER,
                    workflow_id = %workflow_id,
                    node = %node,
                    "Node executed"
                );
                self.context
                    .queue
                    .enqueue(workflow_id, self.config.step_delay())
                    .await?;
            }
            ClockResult::Finished | ClockResult::Terminated { .. } => {
                // Covered by the finished arm above.
            }
        }

        Ok(Settle::Ack)
    }

    /// Writes back the `(definition, runtime)` pair.
    async fn persist(&self, definition: &WorkflowDefinition, runtime: &RuntimeState) -> Result<()> {
        self.context.workflows.replace_workflow(definition).await?;
        self.context.runtimes.replace_runtime(runtime).await?;
        Ok(())
    }

    /// Marks a linked continuation initiated and enqueues its first step.
    ///
    /// Failures are logged, not propagated: a broken continuation must not
    /// fail the step that finished its predecessor.
    async fn initiate_linked(&self, linked: &LinkedWorkflow) {
        let record = match self.context.workflows.get_workflow(linked.id).await {
            Ok(record) => record,
            Err(err) => {
                tracing::warn!(
                    target: TRACING_TARGET_WORKER,
                    workflow_id = %linked.id,
                    error = %err,
                    "Linked workflow could not be loaded"
                );
                return;
            }
        };

        let definition = record.definition;
        if definition.is_initiated {
            tracing::debug!(
                target: TRACING_TARGET_WORKER,
                workflow_id = %linked.id,
                "Linked workflow already initiated, skipping"
            );
            return;
        }

        let update = async {
            // Cron chains pre-create runtime cursors; seed only when absent.
            if !self.context.runtimes.exists_runtime(definition.id).await? {
                let seeded = RuntimeState::seeded(definition.id, definition.entry);
                self.context.runtimes.create_runtime(&seeded).await?;
            }
            let patch = UpdateWorkflow {
                is_initiated: Some(true),
                ..UpdateWorkflow::default()
            };
            self.context.workflows.update_workflow(linked.id, patch).await?;

            let delay = match linked.execution_delay_ms {
                0 => None,
                millis => Some(jiff::SignedDuration::from_millis(millis as i64)),
            };
            self.context.queue.enqueue(linked.id, delay).await?;
            crate::error::Result::<(), crate::error::WorkerError>::Ok(())
        };

        if let Err(err) = update.await {
            tracing::warn!(
                target: TRACING_TARGET_WORKER,
                workflow_id = %linked.id,
                error = %err,
                "Failed to initiate linked workflow"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use ratchet_engine::definition::{CoreDefinition, Edge, Node, NodeKind};
    use ratchet_queue::MemoryQueue;
    use ratchet_store::memory::{MemoryRuntimeStore, MemoryWorkflowStore};
    use serde_json::json;

    use super::*;

    fn registry() -> Arc<NodeRegistry> {
        Arc::new(NodeRegistry::with_builtins())
    }

    fn value_node(name: &str) -> Node {
        Node::new(NodeKind::Value).with_config(json!({
            "outputs": [{"name": name, "type": "string", "value": name}]
        }))
    }

    fn chain(names: &[&str]) -> WorkflowDefinition {
        let nodes: Vec<Node> = names.iter().map(|name| value_node(name)).collect();
        let edges = nodes
            .windows(2)
            .map(|pair| Edge::new(pair[0].id, pair[1].id))
            .collect();
        let entry = nodes[0].id;

        WorkflowDefinition::from_core(
            ratchet_core::WorkflowId::new(),
            "owner",
            CoreDefinition {
                name: None,
                version: 1,
                nodes,
                edges,
                entry,
                global_state: None,
            },
        )
    }

    struct Harness {
        workflows: Arc<MemoryWorkflowStore>,
        runtimes: Arc<MemoryRuntimeStore>,
        queue: Arc<MemoryQueue>,
        cancel: CancellationToken,
        handle: JoinHandle<Result<()>>,
    }

    impl Harness {
        fn start(config: WorkerConfig) -> Self {
            let workflows = Arc::new(MemoryWorkflowStore::new());
            let runtimes = Arc::new(MemoryRuntimeStore::new());
            let queue = Arc::new(MemoryQueue::new());
            let cancel = CancellationToken::new();

            let context = WorkerContext {
                workflows: workflows.clone(),
                runtimes: runtimes.clone(),
                queue: queue.clone(),
                registry: registry(),
            };
            let consumer = queue.consumer();
            let worker = WorkflowWorker::new(context, config, cancel.clone());
            let handle = worker.spawn(consumer);

            Self {
                workflows,
                runtimes,
                queue,
                cancel,
                handle,
            }
        }

        async fn wait_until<F, Fut>(&self, mut condition: F)
        where
            F: FnMut() -> Fut,
            Fut: std::future::Future<Output = bool>,
        {
            let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
            loop {
                if condition().await {
                    return;
                }
                assert!(
                    tokio::time::Instant::now() < deadline,
                    "condition not reached within deadline"
                );
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        }

        async fn stop(self) {
            self.cancel.cancel();
            self.handle.await.unwrap().unwrap();
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn worker_drives_workflow_to_completion() {
        let harness = Harness::start(WorkerConfig::new());
        let definition = chain(&["a", "b", "c"]);
        let id = definition.id;

        harness.workflows.create_workflow(&definition).await.unwrap();
        harness.queue.enqueue(id, None).await.unwrap();

        harness
            .wait_until(|| async {
                harness
                    .runtimes
                    .get_runtime(id)
                    .await
                    .unwrap()
                    .is_some_and(|runtime| runtime.finished)
            })
            .await;

        let runtime = harness.runtimes.get_runtime(id).await.unwrap().unwrap();
        assert_eq!(runtime.visited.len(), 3);

        let record = harness.workflows.get_workflow(id).await.unwrap();
        assert!(!record.definition.in_progress);

        harness.stop().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn locked_workflow_is_not_advanced() {
        let harness = Harness::start(WorkerConfig::new());
        let definition = chain(&["a", "b"]);
        let id = definition.id;

        harness.workflows.create_workflow(&definition).await.unwrap();
        let held = harness
            .workflows
            .acquire_lock(id, "another-worker", jiff::SignedDuration::from_secs(300))
            .await
            .unwrap();
        assert!(held);

        harness.queue.enqueue(id, None).await.unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(harness.runtimes.get_runtime(id).await.unwrap().is_none());

        harness
            .workflows
            .release_lock(id, "another-worker")
            .await
            .unwrap();
        harness
            .wait_until(|| async {
                harness
                    .runtimes
                    .get_runtime(id)
                    .await
                    .unwrap()
                    .is_some_and(|runtime| runtime.finished)
            })
            .await;

        harness.stop().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn awaiting_input_pauses_until_resumed() {
        let harness = Harness::start(WorkerConfig::new());

        let input_id = Uuid::from_u128(42);
        let first = value_node("a");
        let pause = Node::new(NodeKind::AwaitInput).with_config(json!({ "input_id": input_id }));
        let last = value_node("c");
        let edges = vec![Edge::new(first.id, pause.id), Edge::new(pause.id, last.id)];
        let entry = first.id;

        let definition = WorkflowDefinition::from_core(
            ratchet_core::WorkflowId::new(),
            "owner",
            CoreDefinition {
                name: None,
                version: 1,
                nodes: vec![first, pause, last],
                edges,
                entry,
                global_state: None,
            },
        );
        let id = definition.id;

        harness.workflows.create_workflow(&definition).await.unwrap();
        harness.queue.enqueue(id, None).await.unwrap();

        harness
            .wait_until(|| async {
                let record = harness.workflows.get_workflow(id).await.unwrap();
                record.definition.expecting_input_for.is_some()
                    && harness.queue.size().await.unwrap() == 0
            })
            .await;

        let runtime = harness.runtimes.get_runtime(id).await.unwrap().unwrap();
        assert!(!runtime.finished);

        // Supply the input and re-schedule.
        let mut record = harness.workflows.get_workflow(id).await.unwrap();
        let expected = record.definition.expecting_input_for.unwrap();
        record
            .definition
            .push_external_input(expected, json!({"answer": 42}));
        harness.workflows.replace_workflow(&record.definition).await.unwrap();
        harness.queue.enqueue(id, None).await.unwrap();

        harness
            .wait_until(|| async {
                harness
                    .runtimes
                    .get_runtime(id)
                    .await
                    .unwrap()
                    .is_some_and(|runtime| runtime.finished)
            })
            .await;

        let record = harness.workflows.get_workflow(id).await.unwrap();
        assert!(record.definition.expecting_input_for.is_none());

        harness.stop().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn persisted_flags_track_pause_and_completion() {
        let harness = Harness::start(WorkerConfig::new());

        let input_id = Uuid::from_u128(7);
        let first = value_node("a");
        let pause = Node::new(NodeKind::AwaitInput).with_config(json!({ "input_id": input_id }));
        let edges = vec![Edge::new(first.id, pause.id)];
        let entry = first.id;

        let mut definition = WorkflowDefinition::from_core(
            ratchet_core::WorkflowId::new(),
            "owner",
            CoreDefinition {
                name: None,
                version: 1,
                nodes: vec![first, pause],
                edges,
                entry,
                global_state: None,
            },
        );
        definition.is_initiated = true;
        let id = definition.id;

        harness.workflows.create_workflow(&definition).await.unwrap();
        harness.queue.enqueue(id, None).await.unwrap();

        harness
            .wait_until(|| async {
                let record = harness.workflows.get_workflow(id).await.unwrap();
                record.definition.expecting_input_for.is_some()
            })
            .await;

        // Paused runs are not in progress, and listings must agree.
        let record = harness.workflows.get_workflow(id).await.unwrap();
        assert!(!record.definition.in_progress);
        assert!(record.definition.is_initiated);
        let summary = record.summary();
        assert!(summary.awaiting_input);
        assert!(!summary.in_progress);

        let mut resumed = record.definition;
        let expected = resumed.expecting_input_for.unwrap();
        resumed.push_external_input(expected, json!("ready"));
        harness.workflows.replace_workflow(&resumed).await.unwrap();
        harness.queue.enqueue(id, None).await.unwrap();

        harness
            .wait_until(|| async {
                harness
                    .runtimes
                    .get_runtime(id)
                    .await
                    .unwrap()
                    .is_some_and(|runtime| runtime.finished)
            })
            .await;

        // A finished run sheds both scheduling flags.
        let record = harness.workflows.get_workflow(id).await.unwrap();
        assert!(!record.definition.in_progress);
        assert!(!record.definition.is_initiated);

        harness.stop().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn finished_run_initiates_linked_workflow() {
        let harness = Harness::start(WorkerConfig::new());

        let continuation = chain(&["x"]);
        let mut origin = chain(&["a"]);
        origin.next_linked = vec![LinkedWorkflow {
            id: continuation.id,
            execution_delay_ms: 0,
        }];
        let (origin_id, continuation_id) = (origin.id, continuation.id);

        harness.workflows.create_workflow(&origin).await.unwrap();
        harness.workflows.create_workflow(&continuation).await.unwrap();
        harness.queue.enqueue(origin_id, None).await.unwrap();

        harness
            .wait_until(|| async {
                harness
                    .runtimes
                    .get_runtime(continuation_id)
                    .await
                    .unwrap()
                    .is_some_and(|runtime| runtime.finished)
            })
            .await;

        let record = harness.workflows.get_workflow(continuation_id).await.unwrap();
        assert!(record.definition.is_initiated);

        harness.stop().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn job_for_missing_workflow_is_dropped() {
        let harness = Harness::start(WorkerConfig::new());

        harness
            .queue
            .enqueue(ratchet_core::WorkflowId::new(), None)
            .await
            .unwrap();
        harness
            .wait_until(|| async { harness.queue.size().await.unwrap() == 0 })
            .await;

        // The worker stays healthy and keeps serving real workflows.
        let definition = chain(&["a"]);
        let id = definition.id;
        harness.workflows.create_workflow(&definition).await.unwrap();
        harness.queue.enqueue(id, None).await.unwrap();
        harness
            .wait_until(|| async {
                harness
                    .runtimes
                    .get_runtime(id)
                    .await
                    .unwrap()
                    .is_some_and(|runtime| runtime.finished)
            })
            .await;

        harness.stop().await;
    }

    #[tokio::test]
    async fn worker_ids_are_unique_by_default() {
        let context = WorkerContext {
            workflows: Arc::new(MemoryWorkflowStore::new()),
            runtimes: Arc::new(MemoryRuntimeStore::new()),
            queue: Arc::new(MemoryQueue::new()),
            registry: registry(),
        };

        let a = WorkflowWorker::new(context.clone(), WorkerConfig::new(), CancellationToken::new());
        let b = WorkflowWorker::new(context, WorkerConfig::new(), CancellationToken::new());
        assert_ne!(a.worker_id(), b.worker_id());
        assert!(a.worker_id().starts_with("worker-"));
    }
}
