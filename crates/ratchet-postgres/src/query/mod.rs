//! Repository traits implemented on [`PgConnection`](crate::PgConnection).

mod batch;
mod runtime;
mod workflow;

pub use batch::BatchRepository;
pub use runtime::RuntimeRepository;
pub use workflow::WorkflowRepository;
