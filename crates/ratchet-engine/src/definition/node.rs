//! Node definitions.

use jiff::Timestamp;
use ratchet_core::{NodeId, TypedValue};
use serde::{Deserialize, Serialize};

/// Closed set of node type tags.
///
/// The engine never looks inside a node's behavior; it resolves the tag
/// through the [`NodeRegistry`](crate::node::NodeRegistry) and treats the
/// returned executor as opaque. External capability providers (HTTP calls,
/// chain operations, sandboxed scripts) plug in behind the same tags by
/// registering their own builders.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[derive(strum::Display, strum::EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum NodeKind {
    /// Does nothing; useful as an entry or join point.
    NoOp,
    /// Emits the outputs listed in its config.
    Value,
    /// Writes configured entries into the workflow-global state.
    SetState,
    /// Prunes which children fire based on a global-state flag.
    Branch,
    /// Pauses the workflow until an external input arrives.
    AwaitInput,
    /// Reports a node-level error.
    Fail,
    /// Stops the whole run deliberately.
    Terminate,
}

/// A single node in a workflow definition.
///
/// `inputs` accumulate from parents as they fire (edge order preserved);
/// `outputs`, `executed`, and `executed_at` are written by the engine when
/// the node runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    /// Unique within the owning workflow.
    pub id: NodeId,
    /// Type tag resolved through the node registry.
    pub kind: NodeKind,
    /// Optional display name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Node-type-specific configuration payload.
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub config: serde_json::Value,
    /// Ordered inputs, merged in from parents as they fire.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub inputs: Vec<TypedValue>,
    /// Ordered outputs produced by execution.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub outputs: Vec<TypedValue>,
    /// Whether this node has executed in the current run.
    #[serde(default)]
    pub executed: bool,
    /// When the node executed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub executed_at: Option<Timestamp>,
    /// Node-level failure recorded by the engine; downstream edges of a
    /// failed node do not fire.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<NodeError>,
}

/// A recorded node-level failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeError {
    /// Machine-readable failure code.
    pub code: String,
    /// Human-readable detail.
    pub message: String,
}

impl Node {
    /// Creates a node of the given kind with a fresh id.
    pub fn new(kind: NodeKind) -> Self {
        Self::with_id(NodeId::new(), kind)
    }

    /// Creates a node of the given kind with an explicit id.
    pub fn with_id(id: NodeId, kind: NodeKind) -> Self {
        Self {
            id,
            kind,
            name: None,
            config: serde_json::Value::Null,
            inputs: Vec::new(),
            outputs: Vec::new(),
            executed: false,
            executed_at: None,
            error: None,
        }
    }

    /// Sets the display name.
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Sets the configuration payload.
    pub fn with_config(mut self, config: serde_json::Value) -> Self {
        self.config = config;
        self
    }

    /// Records an execution result on the node.
    pub(crate) fn mark_executed(&mut self, outputs: Vec<TypedValue>) {
        self.executed = true;
        self.executed_at = Some(Timestamp::now());
        self.outputs = outputs;
        self.error = None;
    }

    /// Records a node-level failure; the node counts as executed with no
    /// outputs.
    pub(crate) fn mark_failed(&mut self, code: String, message: String) {
        self.executed = true;
        self.executed_at = Some(Timestamp::now());
        self.outputs = Vec::new();
        self.error = Some(NodeError { code, message });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn node_kind_serializes_snake_case() {
        let json = serde_json::to_string(&NodeKind::AwaitInput).unwrap();
        assert_eq!(json, "\"await_input\"");
        assert_eq!(NodeKind::SetState.to_string(), "set_state");
    }

    #[test]
    fn node_defaults_are_clean() {
        let node = Node::new(NodeKind::NoOp).named("start");
        assert!(!node.executed);
        assert!(node.inputs.is_empty());
        assert!(node.executed_at.is_none());

        let json = serde_json::to_value(&node).unwrap();
        // Empty collections and null config are omitted on the wire.
        assert!(json.get("inputs").is_none());
        assert!(json.get("config").is_none());
    }

    #[test]
    fn mark_executed_stamps_time() {
        let mut node = Node::new(NodeKind::Value);
        node.mark_executed(vec![TypedValue::new("out", 1.0)]);
        assert!(node.executed);
        assert!(node.executed_at.is_some());
        assert_eq!(node.outputs.len(), 1);
    }
}
