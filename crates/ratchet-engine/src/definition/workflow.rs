//! Serializable workflow definition.

use std::collections::HashMap;

use jiff::Timestamp;
use ratchet_core::{GlobalState, NodeId, WorkflowId};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::edge::Edge;
use super::node::Node;

/// Advisory lock on a stored workflow.
///
/// The lock is just a field on the definition, written with compare-and-set
/// semantics by the store; `acquired_at` feeds the TTL takeover check.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowLock {
    /// Identifier of the worker holding the lock.
    pub holder: String,
    /// When the lock was taken.
    pub acquired_at: Timestamp,
}

impl WorkflowLock {
    /// Creates a lock held by `holder` as of now.
    pub fn held_by(holder: impl Into<String>) -> Self {
        Self {
            holder: holder.into(),
            acquired_at: Timestamp::now(),
        }
    }
}

/// Marker for a workflow paused on external input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpectedInput {
    /// Node waiting for input.
    pub node: NodeId,
    /// The specific input slot being waited on.
    pub input_id: Uuid,
}

impl ExpectedInput {
    /// Key under which supplied data is stored in `external_input_storage`.
    pub fn storage_key(&self) -> String {
        format!("{}/{}", self.node, self.input_id)
    }
}

/// A pre-created continuation workflow, enqueued when this one finishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkedWorkflow {
    /// The continuation's workflow id.
    pub id: WorkflowId,
    /// Delay before the continuation becomes visible to workers.
    pub execution_delay_ms: u64,
}

/// The client-supplied part of a workflow definition.
///
/// `load` turns this into a full [`WorkflowDefinition`] by attaching an id,
/// an owner, and the engine-managed bookkeeping fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoreDefinition {
    /// Optional display name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Definition schema version.
    #[serde(default = "default_version")]
    pub version: u32,
    /// Nodes of the graph.
    pub nodes: Vec<Node>,
    /// Directed edges of the graph.
    #[serde(default)]
    pub edges: Vec<Edge>,
    /// Entry node; must reference an existing node.
    pub entry: NodeId,
    /// Optional seed for the workflow-global state.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub global_state: Option<serde_json::Value>,
}

fn default_version() -> u32 {
    1
}

/// Full persisted workflow definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowDefinition {
    /// Unique workflow instance id.
    pub id: WorkflowId,
    /// Owning principal, as supplied by the front-line service.
    pub owner: String,
    /// Optional display name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Definition schema version.
    pub version: u32,
    /// Nodes of the graph.
    pub nodes: Vec<Node>,
    /// Directed edges of the graph.
    #[serde(default)]
    pub edges: Vec<Edge>,
    /// Entry node.
    pub entry: NodeId,
    /// Workflow-global scratchpad shared by all node executions.
    #[serde(default)]
    pub global_state: GlobalState,
    /// Advisory worker lock.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lock: Option<WorkflowLock>,
    /// Whether a worker is currently advancing this workflow.
    #[serde(default)]
    pub in_progress: bool,
    /// Whether the workflow has been enqueued at least once.
    #[serde(default)]
    pub is_initiated: bool,
    /// Set while the workflow is paused awaiting external input.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expecting_input_for: Option<ExpectedInput>,
    /// Externally supplied input data, keyed by `node/input_id`.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub external_input_storage: HashMap<String, Vec<serde_json::Value>>,
    /// The workflow whose completion created this one, for linked chains.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_linked: Option<WorkflowId>,
    /// Continuations enqueued when this workflow finishes.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub next_linked: Vec<LinkedWorkflow>,
}

impl WorkflowDefinition {
    /// Builds a full definition from the client-supplied core.
    pub fn from_core(id: WorkflowId, owner: impl Into<String>, core: CoreDefinition) -> Self {
        Self {
            id,
            owner: owner.into(),
            name: core.name,
            version: core.version,
            nodes: core.nodes,
            edges: core.edges,
            entry: core.entry,
            global_state: core
                .global_state
                .map(GlobalState::from_json)
                .unwrap_or_default(),
            lock: None,
            in_progress: false,
            is_initiated: false,
            expecting_input_for: None,
            external_input_storage: HashMap::new(),
            previous_linked: None,
            next_linked: Vec::new(),
        }
    }

    /// Returns the node with the given id.
    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.iter().find(|n| n.id == id)
    }

    /// Returns the node with the given id, mutably.
    pub fn node_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        self.nodes.iter_mut().find(|n| n.id == id)
    }

    /// Returns all externally supplied inputs for a node, in arrival order.
    pub fn external_inputs_for(&self, node: NodeId) -> Vec<serde_json::Value> {
        let prefix = format!("{node}/");
        let mut keys: Vec<&String> = self
            .external_input_storage
            .keys()
            .filter(|k| k.starts_with(&prefix))
            .collect();
        keys.sort();
        keys.into_iter()
            .flat_map(|k| self.external_input_storage[k].iter().cloned())
            .collect()
    }

    /// Appends an external input datum under the expected marker's key.
    pub fn push_external_input(&mut self, expected: ExpectedInput, data: serde_json::Value) {
        self.external_input_storage
            .entry(expected.storage_key())
            .or_default()
            .push(data);
    }
}
