#![forbid(unsafe_code)]
#![cfg_attr(docsrs, feature(doc_cfg))]
#![doc = include_str!("../README.md")]

/// Tracing target for engine stepping operations.
pub const TRACING_TARGET_ENGINE: &str = "ratchet_engine::engine";

/// Tracing target for graph compilation and validation.
pub const TRACING_TARGET_GRAPH: &str = "ratchet_engine::graph";

pub mod definition;
mod engine;
mod error;
mod graph;
pub mod node;
mod runtime;

pub use engine::{ClockResult, Workflow};
pub use error::{EngineError, EngineResult};
pub use graph::WorkflowGraph;
pub use runtime::RuntimeState;

pub mod prelude {
    //! Convenience re-exports for engine consumers.

    pub use crate::definition::{
        CoreDefinition, Edge, ExpectedInput, LinkedWorkflow, Node, NodeKind, WorkflowDefinition,
        WorkflowLock,
    };
    pub use crate::engine::{ClockResult, Workflow};
    pub use crate::error::{EngineError, EngineResult};
    pub use crate::node::{ExecutionResult, NodeContext, NodeExecutor, NodeRegistry};
    pub use crate::runtime::RuntimeState;
}
