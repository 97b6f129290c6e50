//! The step-wise execution engine.

use std::sync::Arc;

use ratchet_core::{NodeId, TypedValue};
use uuid::Uuid;

use crate::TRACING_TARGET_ENGINE;
use crate::definition::{ExpectedInput, WorkflowDefinition};
use crate::error::{EngineError, EngineResult};
use crate::graph::WorkflowGraph;
use crate::node::{ExecutionResult, NodeContext, NodeRegistry};
use crate::runtime::RuntimeState;

/// Result of a single `clock()` transition.
#[derive(Debug, Clone, PartialEq)]
pub enum ClockResult {
    /// The frontier was empty; the run is complete.
    Finished,
    /// One node executed successfully; the run continues, or just became
    /// finished (check [`Workflow::runtime`]).
    Completed {
        /// The node that executed.
        node: NodeId,
        /// Its outputs.
        outputs: Vec<TypedValue>,
    },
    /// One node reported a business-logic failure; its children do not
    /// fire, the run continues elsewhere.
    NodeError {
        /// The failed node.
        node: NodeId,
        /// Failure code.
        code: String,
        /// Failure detail.
        message: String,
    },
    /// A node deliberately stopped the whole run.
    Terminated {
        /// The terminating node.
        node: NodeId,
        /// Its outputs.
        outputs: Vec<TypedValue>,
    },
    /// The current node needs external input; the engine will not advance
    /// until it is supplied and the workflow is re-enqueued.
    AwaitingInput {
        /// The paused node.
        node: NodeId,
        /// The input slot being waited on.
        input_id: Uuid,
    },
}

impl ClockResult {
    /// Returns whether this result ends the run.
    pub fn is_terminal(&self) -> bool {
        matches!(self, ClockResult::Finished | ClockResult::Terminated { .. })
    }
}

/// The execution engine for one workflow instance.
///
/// Combines the definition, the compiled DAG, the runtime cursor, and the
/// node registry. Construction validates the graph (cyclic definitions are
/// rejected before anything executes) and seeds the runtime when absent.
pub struct Workflow {
    definition: WorkflowDefinition,
    graph: WorkflowGraph,
    runtime: RuntimeState,
    registry: Arc<NodeRegistry>,
}

impl Workflow {
    /// Creates an engine for a freshly loaded workflow, seeding the runtime
    /// with the entry node.
    pub fn new(definition: WorkflowDefinition, registry: Arc<NodeRegistry>) -> EngineResult<Self> {
        let runtime = RuntimeState::seeded(definition.id, definition.entry);
        Self::resume(definition, runtime, registry)
    }

    /// Creates an engine over an existing runtime cursor (worker resume
    /// path).
    pub fn resume(
        definition: WorkflowDefinition,
        runtime: RuntimeState,
        registry: Arc<NodeRegistry>,
    ) -> EngineResult<Self> {
        let graph = WorkflowGraph::compile(&definition)?;
        Ok(Self {
            definition,
            graph,
            runtime,
            registry,
        })
    }

    /// Returns the definition.
    pub fn definition(&self) -> &WorkflowDefinition {
        &self.definition
    }

    /// Returns the runtime cursor.
    pub fn runtime(&self) -> &RuntimeState {
        &self.runtime
    }

    /// Consumes the engine, returning the pair the caller persists.
    pub fn into_parts(self) -> (WorkflowDefinition, RuntimeState) {
        (self.definition, self.runtime)
    }

    /// Performs the single state transition: executes exactly one node.
    ///
    /// Callers repeat `clock()` until a terminal result, persisting the
    /// `(definition, runtime)` pair after every call.
    pub async fn clock(&mut self) -> EngineResult<ClockResult> {
        if self.runtime.finished {
            return Err(EngineError::AlreadyExecuted);
        }

        let Some(node_id) = self.runtime.pop_current() else {
            self.runtime.finish();
            return Ok(ClockResult::Finished);
        };

        let external = self.definition.external_inputs_for(node_id);
        let result = self.execute_node(node_id, &external).await?;

        match result {
            ExecutionResult::AwaitingInput { input_id } => {
                // Not visited, not executed: the node re-runs once input
                // arrives.
                self.runtime.requeue_front(node_id);
                self.definition.expecting_input_for = Some(ExpectedInput {
                    node: node_id,
                    input_id,
                });

                tracing::debug!(
                    target: TRACING_TARGET_ENGINE,
                    workflow_id = %self.definition.id,
                    node_id = %node_id,
                    input_id = %input_id,
                    "Workflow paused awaiting external input"
                );

                Ok(ClockResult::AwaitingInput {
                    node: node_id,
                    input_id,
                })
            }
            ExecutionResult::Error { code, message } => {
                self.runtime.mark_visited(node_id);
                self.definition
                    .node_mut(node_id)
                    .ok_or(EngineError::MissingNode(node_id))?
                    .mark_failed(code.clone(), message.clone());

                // A resumed node that then fails must not leave its pause
                // marker behind.
                if self
                    .definition
                    .expecting_input_for
                    .is_some_and(|expected| expected.node == node_id)
                {
                    self.definition.expecting_input_for = None;
                }

                tracing::warn!(
                    target: TRACING_TARGET_ENGINE,
                    workflow_id = %self.definition.id,
                    node_id = %node_id,
                    code = %code,
                    "Node execution failed; downstream edges will not fire"
                );

                // A failed node fires no children.
                self.finalize_if_drained();
                Ok(ClockResult::NodeError {
                    node: node_id,
                    code,
                    message,
                })
            }
            ExecutionResult::Ok {
                outputs,
                next,
                terminate_run,
            } => {
                self.runtime.mark_visited(node_id);
                self.definition
                    .node_mut(node_id)
                    .ok_or(EngineError::MissingNode(node_id))?
                    .mark_executed(outputs.clone());

                // A node resumed from a pause clears the pending marker.
                if self
                    .definition
                    .expecting_input_for
                    .is_some_and(|expected| expected.node == node_id)
                {
                    self.definition.expecting_input_for = None;
                }

                if terminate_run {
                    self.runtime.terminate(node_id);
                    tracing::debug!(
                        target: TRACING_TARGET_ENGINE,
                        workflow_id = %self.definition.id,
                        node_id = %node_id,
                        "Workflow terminated by node"
                    );
                    return Ok(ClockResult::Terminated {
                        node: node_id,
                        outputs,
                    });
                }

                self.fire_children(node_id, &outputs, next);
                self.finalize_if_drained();

                Ok(ClockResult::Completed {
                    node: node_id,
                    outputs,
                })
            }
        }
    }

    /// Looks up, constructs, and executes one node.
    async fn execute_node(
        &mut self,
        node_id: NodeId,
        external: &[serde_json::Value],
    ) -> EngineResult<ExecutionResult> {
        let definition = &mut self.definition;
        let node = definition
            .nodes
            .iter()
            .find(|n| n.id == node_id)
            .ok_or(EngineError::MissingNode(node_id))?;
        let executor = self.registry.build(node)?;

        let ctx = NodeContext {
            node,
            state: &mut definition.global_state,
            external_inputs: external,
        };
        executor.execute(ctx).await
    }

    /// Merges a finished node's outputs into its firing children and
    /// schedules them.
    ///
    /// An explicit `next` list prunes the static children; it can never add
    /// an edge that does not exist. Outputs merge into a child's inputs
    /// even when the child is already visited: a second parent firing after
    /// the child executed contributes data but does not re-schedule it
    /// (eager first-arrival semantics).
    fn fire_children(&mut self, parent: NodeId, outputs: &[TypedValue], next: Option<Vec<NodeId>>) {
        let static_children = self.graph.children(parent).to_vec();
        let firing: Vec<NodeId> = match next {
            Some(allowed) => static_children
                .into_iter()
                .filter(|child| allowed.contains(child))
                .collect(),
            None => static_children,
        };

        for child in firing {
            if let Some(node) = self.definition.node_mut(child) {
                node.inputs.extend(outputs.iter().cloned());
            }
            self.runtime.enqueue(child);
        }
    }

    /// Finalizes the run when scheduling left the frontier empty.
    fn finalize_if_drained(&mut self) {
        if self.runtime.queue.is_empty() {
            self.runtime.finish();
        }
    }
}

impl std::fmt::Debug for Workflow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Workflow")
            .field("id", &self.definition.id)
            .field("nodes", &self.graph.node_count())
            .field("finished", &self.runtime.finished)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::definition::{CoreDefinition, Edge, Node, NodeKind};
    use ratchet_core::WorkflowId;
    use serde_json::json;

    fn node_id(n: u128) -> NodeId {
        NodeId::from_uuid(Uuid::from_u128(n))
    }

    fn registry() -> Arc<NodeRegistry> {
        Arc::new(NodeRegistry::with_builtins())
    }

    fn definition(nodes: Vec<Node>, edges: Vec<Edge>, entry: NodeId) -> WorkflowDefinition {
        WorkflowDefinition::from_core(
            WorkflowId::new(),
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

    fn value_node(id: NodeId, name: &str) -> Node {
        Node::with_id(id, NodeKind::Value).with_config(json!({
            "outputs": [{"name": name, "type": "string", "value": name}]
        }))
    }

    /// Six-node diamond: A→B,C; B→D,E; C→E; D→F; E→F.
    fn diamond() -> WorkflowDefinition {
        let (a, b, c, d, e, f) = (
            node_id(1),
            node_id(2),
            node_id(3),
            node_id(4),
            node_id(5),
            node_id(6),
        );
        definition(
            vec![
                value_node(a, "a"),
                value_node(b, "b"),
                value_node(c, "c"),
                value_node(d, "d"),
                value_node(e, "e"),
                value_node(f, "f"),
            ],
            vec![
                Edge::new(a, b),
                Edge::new(a, c),
                Edge::new(b, d),
                Edge::new(b, e),
                Edge::new(c, e),
                Edge::new(d, f),
                Edge::new(e, f),
            ],
            a,
        )
    }

    #[tokio::test]
    async fn diamond_runs_to_completion_in_six_clocks() {
        let mut workflow = Workflow::new(diamond(), registry()).unwrap();

        // First clock executes A and schedules B, C.
        match workflow.clock().await.unwrap() {
            ClockResult::Completed { node, .. } => assert_eq!(node, node_id(1)),
            other => panic!("unexpected result: {other:?}"),
        }
        assert_eq!(
            workflow.runtime().queue,
            std::collections::VecDeque::from([node_id(2), node_id(3)])
        );

        for _ in 0..5 {
            match workflow.clock().await.unwrap() {
                ClockResult::Completed { .. } => {}
                other => panic!("unexpected result: {other:?}"),
            }
        }

        let runtime = workflow.runtime();
        assert!(runtime.finished);
        assert_eq!(runtime.visited.len(), 6);
        // Every node exactly once, BFS order.
        assert_eq!(
            runtime.visited,
            vec![node_id(1), node_id(2), node_id(3), node_id(4), node_id(5), node_id(6)]
        );

        // F received inputs merged from both D and E.
        let f = workflow.definition().node(node_id(6)).unwrap();
        assert!(f.executed);
        let input_names: Vec<&str> = f.inputs.iter().map(|v| v.name.as_str()).collect();
        assert_eq!(input_names, vec!["d", "e"]);
    }

    #[tokio::test]
    async fn clock_advances_exactly_one_node() {
        let mut workflow = Workflow::new(diamond(), registry()).unwrap();
        workflow.clock().await.unwrap();

        let before = workflow.runtime().visited.len();
        workflow.clock().await.unwrap();
        assert_eq!(workflow.runtime().visited.len(), before + 1);
    }

    #[tokio::test]
    async fn finished_workflow_rejects_further_clocks() {
        let a = node_id(1);
        let def = definition(vec![value_node(a, "a")], vec![], a);
        let mut workflow = Workflow::new(def, registry()).unwrap();

        workflow.clock().await.unwrap();
        assert!(workflow.runtime().finished);
        assert!(matches!(
            workflow.clock().await,
            Err(EngineError::AlreadyExecuted)
        ));
    }

    #[tokio::test]
    async fn cyclic_definition_rejected_at_construction() {
        let (a, b) = (node_id(1), node_id(2));
        let def = definition(
            vec![value_node(a, "a"), value_node(b, "b")],
            vec![Edge::new(a, b), Edge::new(b, a)],
            a,
        );
        assert!(matches!(
            Workflow::new(def, registry()),
            Err(EngineError::CyclicWorkflow)
        ));
    }

    #[tokio::test]
    async fn node_error_halts_downstream_only() {
        // A → fail → C; A → D. C never runs, D does.
        let (a, bad, c, d) = (node_id(1), node_id(2), node_id(3), node_id(4));
        let def = definition(
            vec![
                value_node(a, "a"),
                Node::with_id(bad, NodeKind::Fail).with_config(json!({"code": "boom"})),
                value_node(c, "c"),
                value_node(d, "d"),
            ],
            vec![Edge::new(a, bad), Edge::new(a, d), Edge::new(bad, c)],
            a,
        );
        let mut workflow = Workflow::new(def, registry()).unwrap();

        workflow.clock().await.unwrap();
        match workflow.clock().await.unwrap() {
            ClockResult::NodeError { node, code, .. } => {
                assert_eq!(node, bad);
                assert_eq!(code, "boom");
            }
            other => panic!("unexpected result: {other:?}"),
        }

        // The failed node is recorded as executed, with the error on it.
        let failed = workflow.definition().node(bad).unwrap();
        assert!(failed.executed);
        assert!(failed.outputs.is_empty());
        assert_eq!(failed.error.as_ref().map(|e| e.code.as_str()), Some("boom"));

        workflow.clock().await.unwrap();
        assert!(workflow.runtime().finished);
        assert!(!workflow.definition().node(c).unwrap().executed);
        assert!(workflow.definition().node(d).unwrap().executed);
    }

    #[tokio::test]
    async fn node_error_clears_pending_input_marker() {
        let bad = node_id(1);
        let mut def = definition(
            vec![Node::with_id(bad, NodeKind::Fail).with_config(json!({"code": "boom"}))],
            vec![],
            bad,
        );
        // Simulate a run paused on this node whose resumption fails.
        def.expecting_input_for = Some(ExpectedInput {
            node: bad,
            input_id: Uuid::from_u128(5),
        });
        let runtime = RuntimeState::seeded(def.id, bad);

        let mut workflow = Workflow::resume(def, runtime, registry()).unwrap();
        match workflow.clock().await.unwrap() {
            ClockResult::NodeError { node, .. } => assert_eq!(node, bad),
            other => panic!("unexpected result: {other:?}"),
        }
        assert!(workflow.definition().expecting_input_for.is_none());
        assert!(workflow.runtime().finished);
    }

    #[tokio::test]
    async fn terminate_clears_frontier_and_reports_terminated() {
        let (a, stop, never) = (node_id(1), node_id(2), node_id(3));
        let def = definition(
            vec![
                value_node(a, "a"),
                Node::with_id(stop, NodeKind::Terminate),
                value_node(never, "never"),
            ],
            vec![Edge::new(a, stop), Edge::new(stop, never)],
            a,
        );
        let mut workflow = Workflow::new(def, registry()).unwrap();

        workflow.clock().await.unwrap();
        match workflow.clock().await.unwrap() {
            ClockResult::Terminated { node, .. } => assert_eq!(node, stop),
            other => panic!("unexpected result: {other:?}"),
        }

        let runtime = workflow.runtime();
        assert!(runtime.finished);
        assert_eq!(runtime.terminated_by, Some(stop));
        assert!(runtime.queue.is_empty());
        assert!(!workflow.definition().node(never).unwrap().executed);
    }

    #[tokio::test]
    async fn branch_prunes_but_cannot_invent_edges() {
        // branch statically connects to [yes, no]; config also names a
        // node the branch has no edge to.
        let (a, branch, yes, no, stranger) =
            (node_id(1), node_id(2), node_id(3), node_id(4), node_id(5));
        let def = definition(
            vec![
                Node::with_id(a, NodeKind::SetState)
                    .with_config(json!({"entries": {"flags.go": true}})),
                Node::with_id(branch, NodeKind::Branch).with_config(json!({
                    "path": "flags.go",
                    "when_true": [yes, stranger],
                    "when_false": [no]
                })),
                value_node(yes, "yes"),
                value_node(no, "no"),
                value_node(stranger, "stranger"),
            ],
            vec![
                Edge::new(a, branch),
                Edge::new(branch, yes),
                Edge::new(branch, no),
            ],
            a,
        );
        let mut workflow = Workflow::new(def, registry()).unwrap();

        workflow.clock().await.unwrap();
        workflow.clock().await.unwrap();

        assert_eq!(
            workflow.runtime().queue,
            std::collections::VecDeque::from([yes])
        );
        loop {
            if workflow.runtime().finished {
                break;
            }
            workflow.clock().await.unwrap();
        }
        assert!(!workflow.definition().node(stranger).unwrap().executed);
        assert!(!workflow.definition().node(no).unwrap().executed);
    }

    #[tokio::test]
    async fn awaiting_input_pauses_then_resumes() {
        let input_id = Uuid::from_u128(77);
        let (a, waiter, after) = (node_id(1), node_id(2), node_id(3));
        let def = definition(
            vec![
                value_node(a, "a"),
                Node::with_id(waiter, NodeKind::AwaitInput)
                    .with_config(json!({"input_id": input_id})),
                value_node(after, "after"),
            ],
            vec![Edge::new(a, waiter), Edge::new(waiter, after)],
            a,
        );
        let mut workflow = Workflow::new(def, registry()).unwrap();

        workflow.clock().await.unwrap();
        match workflow.clock().await.unwrap() {
            ClockResult::AwaitingInput { node, input_id: got } => {
                assert_eq!(node, waiter);
                assert_eq!(got, input_id);
            }
            other => panic!("unexpected result: {other:?}"),
        }

        // The paused node is back at the frontier head, not visited.
        assert_eq!(workflow.runtime().queue.front(), Some(&waiter));
        assert!(!workflow.runtime().visited.contains(&waiter));
        let expected = workflow.definition().expecting_input_for.unwrap();
        assert_eq!(expected.node, waiter);

        // Supply the datum and continue clocking.
        let (mut def, runtime) = workflow.into_parts();
        def.push_external_input(expected, json!("supplied"));
        let mut workflow = Workflow::resume(def, runtime, registry()).unwrap();

        match workflow.clock().await.unwrap() {
            ClockResult::Completed { node, outputs } => {
                assert_eq!(node, waiter);
                assert_eq!(outputs.len(), 1);
            }
            other => panic!("unexpected result: {other:?}"),
        }
        assert!(workflow.definition().expecting_input_for.is_none());

        workflow.clock().await.unwrap();
        assert!(workflow.runtime().finished);
        assert!(workflow.definition().node(after).unwrap().executed);
    }

    #[tokio::test]
    async fn unknown_node_type_surfaces_from_registry() {
        let a = node_id(1);
        let def = definition(vec![Node::with_id(a, NodeKind::Value)], vec![], a);
        let empty = Arc::new(NodeRegistry::new());
        let mut workflow = Workflow::new(def, empty).unwrap();

        assert!(matches!(
            workflow.clock().await,
            Err(EngineError::UnknownNodeType(NodeKind::Value))
        ));
    }

    #[tokio::test]
    async fn empty_frontier_reports_finished_once() {
        let a = node_id(1);
        let def = definition(vec![value_node(a, "a")], vec![], a);
        let mut runtime = RuntimeState::seeded(def.id, a);
        runtime.queue.clear(); // simulate a resumed, drained cursor

        let mut workflow = Workflow::resume(def, runtime, registry()).unwrap();
        assert_eq!(workflow.clock().await.unwrap(), ClockResult::Finished);
        assert!(matches!(
            workflow.clock().await,
            Err(EngineError::AlreadyExecuted)
        ));
    }
}
