//! Queue traits.

use jiff::SignedDuration;
use ratchet_core::{MessageId, WorkflowId};

use crate::error::QueueResult;
use crate::job::ScheduledJob;

/// Producer side of the scheduling queue.
///
/// Delivery is at-least-once: a job stays on the queue until a consumer
/// acknowledges it, and an unacknowledged or negatively acknowledged
/// delivery comes back.
#[async_trait::async_trait]
pub trait WorkflowQueue: Send + Sync {
    /// Enqueues one step for a workflow, optionally delayed.
    async fn enqueue(
        &self,
        workflow_id: WorkflowId,
        delay: Option<SignedDuration>,
    ) -> QueueResult<MessageId>;

    /// Number of messages not yet acknowledged (pending, delayed, and
    /// in flight).
    async fn size(&self) -> QueueResult<usize>;

    /// Closes the queue: rejects further enqueues, cancels messages still
    /// waiting on their delay, and unblocks consumers.
    async fn close(&self) -> QueueResult<()>;
}

/// Consumer side of the scheduling queue.
#[async_trait::async_trait]
pub trait QueueConsumer: Send + Sync {
    /// Waits for the next deliverable job.
    ///
    /// Returns `None` once the queue is closed and drained.
    async fn next(&self) -> QueueResult<Option<Box<dyn Delivery>>>;
}

/// One in-flight delivery awaiting settlement.
///
/// A delivery dropped without settlement counts as a crash and the job is
/// redelivered.
#[async_trait::async_trait]
pub trait Delivery: Send + Sync {
    /// The delivered job.
    fn job(&self) -> &ScheduledJob;

    /// Acknowledges the job; it will not be delivered again.
    async fn ack(self: Box<Self>) -> QueueResult<()>;

    /// Negatively acknowledges the job. With `requeue` the job is
    /// redelivered; without it the job is dropped permanently.
    async fn nack(self: Box<Self>, requeue: bool) -> QueueResult<()>;
}
