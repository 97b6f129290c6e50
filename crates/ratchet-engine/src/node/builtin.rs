//! Built-in control-flow node kinds.
//!
//! These cover the engine's own vocabulary (values, branching, state
//! writes, pause points, deliberate stops) and double as the test fixtures
//! for the worker and service layers. External capability providers
//! register richer executors behind their own tags.

use async_trait::async_trait;
use ratchet_core::{NodeId, TypedValue};
use serde::Deserialize;
use uuid::Uuid;

use crate::definition::{Node, NodeKind};
use crate::error::{EngineError, EngineResult};

use super::{ExecutionResult, NodeContext, NodeExecutor, NodeRegistry};

/// Registers every built-in kind on the registry.
pub(super) fn register_all(registry: &mut NodeRegistry) {
    registry
        .register(NodeKind::NoOp, |_| Ok(Box::new(NoOpNode)))
        .register(NodeKind::Value, |node| {
            Ok(Box::new(ValueNode::from_node(node)?))
        })
        .register(NodeKind::SetState, |node| {
            Ok(Box::new(SetStateNode::from_node(node)?))
        })
        .register(NodeKind::Branch, |node| {
            Ok(Box::new(BranchNode::from_node(node)?))
        })
        .register(NodeKind::AwaitInput, |node| {
            Ok(Box::new(AwaitInputNode::from_node(node)?))
        })
        .register(NodeKind::Fail, |node| {
            Ok(Box::new(FailNode::from_node(node)?))
        })
        .register(NodeKind::Terminate, |_| Ok(Box::new(TerminateNode)));
}

fn parse_config<T: serde::de::DeserializeOwned + Default>(node: &Node) -> EngineResult<T> {
    if node.config.is_null() {
        return Ok(T::default());
    }
    serde_json::from_value(node.config.clone()).map_err(|err| EngineError::InvalidNodeConfig {
        node_id: node.id,
        message: err.to_string(),
    })
}

/// Does nothing; passes control to all static children.
struct NoOpNode;

#[async_trait]
impl NodeExecutor for NoOpNode {
    async fn execute(&self, _ctx: NodeContext<'_>) -> EngineResult<ExecutionResult> {
        Ok(ExecutionResult::empty())
    }
}

#[derive(Debug, Default, Deserialize)]
struct ValueConfig {
    #[serde(default)]
    outputs: Vec<TypedValue>,
}

/// Emits the outputs listed in its config.
struct ValueNode {
    outputs: Vec<TypedValue>,
}

impl ValueNode {
    fn from_node(node: &Node) -> EngineResult<Self> {
        let config: ValueConfig = parse_config(node)?;
        Ok(Self {
            outputs: config.outputs,
        })
    }
}

#[async_trait]
impl NodeExecutor for ValueNode {
    async fn execute(&self, _ctx: NodeContext<'_>) -> EngineResult<ExecutionResult> {
        Ok(ExecutionResult::ok(self.outputs.clone()))
    }
}

#[derive(Debug, Default, Deserialize)]
struct SetStateConfig {
    #[serde(default)]
    entries: serde_json::Map<String, serde_json::Value>,
}

/// Writes configured entries into the workflow-global state.
struct SetStateNode {
    entries: serde_json::Map<String, serde_json::Value>,
}

impl SetStateNode {
    fn from_node(node: &Node) -> EngineResult<Self> {
        let config: SetStateConfig = parse_config(node)?;
        Ok(Self {
            entries: config.entries,
        })
    }
}

#[async_trait]
impl NodeExecutor for SetStateNode {
    async fn execute(&self, ctx: NodeContext<'_>) -> EngineResult<ExecutionResult> {
        for (path, value) in &self.entries {
            ctx.state.set(path, value.clone());
        }
        Ok(ExecutionResult::empty())
    }
}

#[derive(Debug, Default, Deserialize)]
struct BranchConfig {
    /// Global-state path holding the branch condition.
    #[serde(default)]
    path: String,
    #[serde(default)]
    when_true: Vec<NodeId>,
    #[serde(default)]
    when_false: Vec<NodeId>,
}

/// Prunes which children fire based on a boolean read from global state.
///
/// The engine intersects the returned list with static edges, so a branch
/// can never invent an edge that does not exist.
struct BranchNode {
    config: BranchConfig,
}

impl BranchNode {
    fn from_node(node: &Node) -> EngineResult<Self> {
        Ok(Self {
            config: parse_config(node)?,
        })
    }
}

#[async_trait]
impl NodeExecutor for BranchNode {
    async fn execute(&self, ctx: NodeContext<'_>) -> EngineResult<ExecutionResult> {
        let condition = ctx
            .state
            .get(&self.config.path)
            .and_then(serde_json::Value::as_bool)
            .unwrap_or(false);

        let next = if condition {
            self.config.when_true.clone()
        } else {
            self.config.when_false.clone()
        };

        Ok(ExecutionResult::empty().with_next(next))
    }
}

#[derive(Debug, Deserialize)]
struct AwaitInputConfig {
    input_id: Uuid,
}

/// Pauses until an external input for its slot has been supplied, then
/// re-emits the supplied data as outputs.
struct AwaitInputNode {
    input_id: Uuid,
}

impl AwaitInputNode {
    fn from_node(node: &Node) -> EngineResult<Self> {
        let config: AwaitInputConfig =
            serde_json::from_value(node.config.clone()).map_err(|err| {
                EngineError::InvalidNodeConfig {
                    node_id: node.id,
                    message: err.to_string(),
                }
            })?;
        Ok(Self {
            input_id: config.input_id,
        })
    }
}

#[async_trait]
impl NodeExecutor for AwaitInputNode {
    async fn execute(&self, ctx: NodeContext<'_>) -> EngineResult<ExecutionResult> {
        if ctx.external_inputs.is_empty() {
            return Ok(ExecutionResult::AwaitingInput {
                input_id: self.input_id,
            });
        }

        let outputs = ctx
            .external_inputs
            .iter()
            .map(|value| TypedValue::new("external", value.clone()))
            .collect();
        Ok(ExecutionResult::ok(outputs))
    }
}

#[derive(Debug, Deserialize)]
struct FailConfig {
    #[serde(default = "FailConfig::default_code")]
    code: String,
    #[serde(default)]
    message: String,
}

impl FailConfig {
    fn default_code() -> String {
        "node_failed".to_owned()
    }
}

impl Default for FailConfig {
    fn default() -> Self {
        Self {
            code: Self::default_code(),
            message: String::new(),
        }
    }
}

/// Always reports a node-level error.
struct FailNode {
    config: FailConfig,
}

impl FailNode {
    fn from_node(node: &Node) -> EngineResult<Self> {
        Ok(Self {
            config: parse_config(node)?,
        })
    }
}

#[async_trait]
impl NodeExecutor for FailNode {
    async fn execute(&self, _ctx: NodeContext<'_>) -> EngineResult<ExecutionResult> {
        Ok(ExecutionResult::Error {
            code: self.config.code.clone(),
            message: self.config.message.clone(),
        })
    }
}

/// Stops the whole run.
struct TerminateNode;

#[async_trait]
impl NodeExecutor for TerminateNode {
    async fn execute(&self, _ctx: NodeContext<'_>) -> EngineResult<ExecutionResult> {
        Ok(ExecutionResult::empty().terminating())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ratchet_core::GlobalState;
    use serde_json::json;

    async fn run(node: &Node, state: &mut GlobalState) -> ExecutionResult {
        run_with_inputs(node, state, &[]).await
    }

    async fn run_with_inputs(
        node: &Node,
        state: &mut GlobalState,
        external: &[serde_json::Value],
    ) -> ExecutionResult {
        let registry = NodeRegistry::with_builtins();
        let executor = registry.build(node).unwrap();
        executor
            .execute(NodeContext {
                node,
                state,
                external_inputs: external,
            })
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn value_node_emits_configured_outputs() {
        let node = Node::new(NodeKind::Value).with_config(json!({
            "outputs": [{"name": "greeting", "type": "string", "value": "hi"}]
        }));
        let mut state = GlobalState::new();

        match run(&node, &mut state).await {
            ExecutionResult::Ok { outputs, .. } => {
                assert_eq!(outputs, vec![TypedValue::new("greeting", "hi")]);
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[tokio::test]
    async fn set_state_node_writes_entries() {
        let node = Node::new(NodeKind::SetState)
            .with_config(json!({"entries": {"flags.ready": true}}));
        let mut state = GlobalState::new();

        run(&node, &mut state).await;
        assert_eq!(state.get("flags.ready"), Some(&json!(true)));
    }

    #[tokio::test]
    async fn branch_node_picks_side_from_state() {
        let target = NodeId::new();
        let node = Node::new(NodeKind::Branch).with_config(json!({
            "path": "flags.go",
            "when_true": [target],
            "when_false": []
        }));

        let mut state = GlobalState::new();
        match run(&node, &mut state).await {
            ExecutionResult::Ok { next, .. } => assert_eq!(next, Some(vec![])),
            other => panic!("unexpected result: {other:?}"),
        }

        state.set("flags.go", json!(true));
        match run(&node, &mut state).await {
            ExecutionResult::Ok { next, .. } => assert_eq!(next, Some(vec![target])),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[tokio::test]
    async fn await_input_node_pauses_then_consumes() {
        let input_id = Uuid::from_u128(42);
        let node =
            Node::new(NodeKind::AwaitInput).with_config(json!({"input_id": input_id}));
        let mut state = GlobalState::new();

        match run(&node, &mut state).await {
            ExecutionResult::AwaitingInput { input_id: got } => assert_eq!(got, input_id),
            other => panic!("unexpected result: {other:?}"),
        }

        let supplied = [json!({"answer": 42})];
        match run_with_inputs(&node, &mut state, &supplied).await {
            ExecutionResult::Ok { outputs, .. } => {
                assert_eq!(outputs.len(), 1);
                assert_eq!(outputs[0].name, "external");
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[tokio::test]
    async fn await_input_node_requires_input_id() {
        let registry = NodeRegistry::with_builtins();
        let node = Node::new(NodeKind::AwaitInput);
        assert!(matches!(
            registry.build(&node),
            Err(EngineError::InvalidNodeConfig { .. })
        ));
    }

    #[tokio::test]
    async fn fail_node_reports_error() {
        let node = Node::new(NodeKind::Fail)
            .with_config(json!({"code": "boom", "message": "it broke"}));
        let mut state = GlobalState::new();

        match run(&node, &mut state).await {
            ExecutionResult::Error { code, message } => {
                assert_eq!(code, "boom");
                assert_eq!(message, "it broke");
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[tokio::test]
    async fn terminate_node_requests_full_stop() {
        let node = Node::new(NodeKind::Terminate);
        let mut state = GlobalState::new();

        match run(&node, &mut state).await {
            ExecutionResult::Ok { terminate_run, .. } => assert!(terminate_run),
            other => panic!("unexpected result: {other:?}"),
        }
    }
}
