//! In-memory store backends.
//!
//! Backed by `tokio::sync::RwLock` maps. Suitable for tests and
//! single-process deployments; every trait guarantee (atomic multi-create,
//! compare-and-set locking) holds because all writes go through one lock.

mod batch;
mod runtime;
mod workflow;

pub use batch::MemoryBatchStore;
pub use runtime::MemoryRuntimeStore;
pub use workflow::MemoryWorkflowStore;
