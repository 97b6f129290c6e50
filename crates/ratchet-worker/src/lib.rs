#![forbid(unsafe_code)]
#![cfg_attr(docsrs, feature(doc_cfg))]
#![doc = include_str!("../README.md")]

mod config;
mod error;
mod worker;

pub use config::WorkerConfig;
pub use error::{Result, WorkerError};
pub use worker::{WorkerContext, WorkflowWorker};

/// Tracing target for the worker loop.
pub const TRACING_TARGET_WORKER: &str = "ratchet_worker::worker";

pub mod prelude {
    //! Commonly used types and traits.

    pub use crate::config::WorkerConfig;
    pub use crate::error::{Result, WorkerError};
    pub use crate::worker::{WorkerContext, WorkflowWorker};
}
