//! Node execution contract.
//!
//! Every node kind implements [`NodeExecutor`]; the engine resolves the
//! kind tag through [`NodeRegistry`] and treats `execute` as an opaque
//! async call. No timeout is enforced at this layer; long-running node
//! implementations carry their own.

mod builtin;
mod registry;

use async_trait::async_trait;
use ratchet_core::{GlobalState, NodeId, TypedValue};
use uuid::Uuid;

pub use registry::NodeRegistry;

use crate::definition::Node;
use crate::error::EngineResult;

/// Everything a node execution may read or mutate.
pub struct NodeContext<'a> {
    /// The node being executed, inputs already merged from fired parents.
    pub node: &'a Node,
    /// The workflow-global scratchpad.
    pub state: &'a mut GlobalState,
    /// Externally supplied data for this node, in arrival order.
    pub external_inputs: &'a [serde_json::Value],
}

/// Outcome of one node execution.
#[derive(Debug, Clone, PartialEq)]
pub enum ExecutionResult {
    /// The node ran; its children may fire.
    Ok {
        /// Outputs to record on the node and merge into firing children.
        outputs: Vec<TypedValue>,
        /// Explicit child pruning; intersected with static edges. `None`
        /// fires all static children.
        next: Option<Vec<NodeId>>,
        /// Deliberate full-run stop, distinct from an error.
        terminate_run: bool,
    },
    /// Business-logic failure inside the node. Recorded on the node; no
    /// children fire; the run continues elsewhere.
    Error {
        /// Machine-readable failure code.
        code: String,
        /// Human-readable detail.
        message: String,
    },
    /// The node needs external input before it can run.
    AwaitingInput {
        /// The input slot being waited on.
        input_id: Uuid,
    },
}

impl ExecutionResult {
    /// Successful result with no outputs.
    pub fn empty() -> Self {
        Self::ok(Vec::new())
    }

    /// Successful result with the given outputs.
    pub fn ok(outputs: Vec<TypedValue>) -> Self {
        ExecutionResult::Ok {
            outputs,
            next: None,
            terminate_run: false,
        }
    }

    /// Restricts which children fire.
    pub fn with_next(self, next: Vec<NodeId>) -> Self {
        match self {
            ExecutionResult::Ok {
                outputs,
                terminate_run,
                ..
            } => ExecutionResult::Ok {
                outputs,
                next: Some(next),
                terminate_run,
            },
            other => other,
        }
    }

    /// Marks the result as a deliberate full-run stop.
    pub fn terminating(self) -> Self {
        match self {
            ExecutionResult::Ok { outputs, next, .. } => ExecutionResult::Ok {
                outputs,
                next,
                terminate_run: true,
            },
            other => other,
        }
    }
}

/// Polymorphic interface all node kinds implement.
#[async_trait]
pub trait NodeExecutor: Send + Sync {
    /// Runs the node. Side effects are entirely the node's responsibility.
    async fn execute(&self, ctx: NodeContext<'_>) -> EngineResult<ExecutionResult>;
}
