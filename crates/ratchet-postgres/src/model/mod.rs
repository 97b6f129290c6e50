//! Database row models.

mod batch;
mod runtime;
mod workflow;

pub use batch::{BatchRow, NewBatchRow};
pub use runtime::{NewRuntimeRow, RuntimeRow, UpdateRuntimeRow};
pub use workflow::{NewWorkflowRow, UpdateWorkflowRow, WorkflowRow};
