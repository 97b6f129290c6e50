#![forbid(unsafe_code)]
#![cfg_attr(docsrs, feature(doc_cfg))]
#![doc = include_str!("../README.md")]

/// Tracing target for storage operations.
pub const TRACING_TARGET_STORE: &str = "ratchet_store::store";

/// Tracing target for the advisory lock protocol.
pub const TRACING_TARGET_LOCK: &str = "ratchet_store::lock";

mod batch;
mod error;
pub mod memory;
mod pagination;
mod runtime;
mod workflow;

pub use batch::{BatchStore, WorkflowBatch};
pub use error::{StoreError, StoreResult};
pub use pagination::{Cursor, CursorPage, CursorPagination, MAX_LIMIT};
pub use runtime::{RuntimeStore, UpdateRuntime};
pub use workflow::{UpdateWorkflow, WorkflowRecord, WorkflowStore, WorkflowSummary};

pub mod prelude {
    //! Convenience re-exports for store consumers.

    pub use crate::batch::{BatchStore, WorkflowBatch};
    pub use crate::error::{StoreError, StoreResult};
    pub use crate::memory::{MemoryBatchStore, MemoryRuntimeStore, MemoryWorkflowStore};
    pub use crate::pagination::{Cursor, CursorPage, CursorPagination};
    pub use crate::runtime::{RuntimeStore, UpdateRuntime};
    pub use crate::workflow::{UpdateWorkflow, WorkflowRecord, WorkflowStore, WorkflowSummary};
}
