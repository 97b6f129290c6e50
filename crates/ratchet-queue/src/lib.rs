#![forbid(unsafe_code)]
#![cfg_attr(docsrs, feature(doc_cfg))]
#![doc = include_str!("../README.md")]

/// Tracing target for queue operations.
pub const TRACING_TARGET_QUEUE: &str = "ratchet_queue::queue";

mod error;
mod job;
mod memory;
mod queue;

pub use error::{QueueError, QueueResult};
pub use job::ScheduledJob;
pub use memory::{MemoryConsumer, MemoryQueue};
pub use queue::{Delivery, QueueConsumer, WorkflowQueue};

pub mod prelude {
    //! Convenience re-exports for queue consumers.

    pub use crate::error::{QueueError, QueueResult};
    pub use crate::job::ScheduledJob;
    pub use crate::memory::{MemoryConsumer, MemoryQueue};
    pub use crate::queue::{Delivery, QueueConsumer, WorkflowQueue};
}
