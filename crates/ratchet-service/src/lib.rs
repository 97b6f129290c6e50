#![forbid(unsafe_code)]
#![cfg_attr(docsrs, feature(doc_cfg))]
#![doc = include_str!("../README.md")]

mod batch;
mod error;
mod workflow;

pub use batch::{BatchCreated, BatchService};
pub use error::{ServiceError, ServiceResult};
pub use workflow::{IntervalSchedule, WorkflowService, WorkflowSnapshot, WorkflowStatus};

/// Tracing target for workflow operations.
pub const TRACING_TARGET_WORKFLOW: &str = "ratchet_service::workflow";
/// Tracing target for batch operations.
pub const TRACING_TARGET_BATCH: &str = "ratchet_service::batch";

pub mod prelude {
    //! Commonly used types and traits.

    pub use crate::batch::{BatchCreated, BatchService};
    pub use crate::error::{ServiceError, ServiceResult};
    pub use crate::workflow::{
        IntervalSchedule, WorkflowService, WorkflowSnapshot, WorkflowStatus,
    };
}
