//! Serializable workflow definitions.
//!
//! A [`WorkflowDefinition`] is the persisted, JSON-friendly description of a
//! workflow: its nodes, edges, entry point, global state, and the runtime
//! flags the worker layer maintains (lock, progress markers, linked
//! continuations). The separate BFS cursor lives in
//! [`RuntimeState`](crate::RuntimeState).

mod edge;
mod node;
mod workflow;

pub use edge::Edge;
pub use node::{Node, NodeError, NodeKind};
pub use workflow::{
    CoreDefinition, ExpectedInput, LinkedWorkflow, WorkflowDefinition, WorkflowLock,
};
