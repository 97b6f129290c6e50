//! In-memory scheduling queue.
//!
//! Single-process backend with the same delivery contract as the broker
//! implementation: at-least-once, explicit settlement, delayed visibility.
//! Delayed jobs are held by timer tasks that the queue cancels on close.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use jiff::SignedDuration;
use ratchet_core::{MessageId, WorkflowId};
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

use crate::TRACING_TARGET_QUEUE;
use crate::error::{QueueError, QueueResult};
use crate::job::ScheduledJob;
use crate::queue::{Delivery, QueueConsumer, WorkflowQueue};

#[derive(Debug, Default)]
struct State {
    pending: VecDeque<ScheduledJob>,
    delayed: HashMap<MessageId, ScheduledJob>,
    in_flight: HashMap<MessageId, ScheduledJob>,
    closed: bool,
}

#[derive(Debug)]
struct Shared {
    state: Mutex<State>,
    notify: Notify,
    cancel: CancellationToken,
}

impl Shared {
    /// Moves a job back onto the tail of the pending queue.
    fn requeue(&self, job: ScheduledJob) {
        let mut state = self.lock_state();
        state.in_flight.remove(&job.id);
        state.pending.push_back(job);
        drop(state);
        self.notify.notify_one();
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, State> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

/// [`WorkflowQueue`] backend over in-process collections.
#[derive(Debug, Clone)]
pub struct MemoryQueue {
    shared: Arc<Shared>,
}

impl MemoryQueue {
    /// Creates an empty queue.
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(State::default()),
                notify: Notify::new(),
                cancel: CancellationToken::new(),
            }),
        }
    }

    /// Creates a consumer over this queue.
    pub fn consumer(&self) -> MemoryConsumer {
        MemoryConsumer {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl Default for MemoryQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl WorkflowQueue for MemoryQueue {
    async fn enqueue(
        &self,
        workflow_id: WorkflowId,
        delay: Option<SignedDuration>,
    ) -> QueueResult<MessageId> {
        let job = match delay {
            Some(delay) => ScheduledJob::new(workflow_id).after(delay),
            None => ScheduledJob::new(workflow_id),
        };
        let id = job.id;

        let mut state = self.shared.lock_state();
        if state.closed {
            return Err(QueueError::Closed);
        }

        match job.remaining_delay() {
            None => {
                state.pending.push_back(job);
                drop(state);
                self.shared.notify.notify_one();
            }
            Some(remaining) => {
                state.delayed.insert(id, job);
                drop(state);

                let shared = Arc::clone(&self.shared);
                let sleep = std::time::Duration::try_from(remaining)
                    .unwrap_or(std::time::Duration::ZERO);
                tokio::spawn(async move {
                    tokio::select! {
                        biased;
                        _ = shared.cancel.cancelled() => {}
                        _ = tokio::time::sleep(sleep) => {
                            let mut state = shared.lock_state();
                            if let Some(job) = state.delayed.remove(&id) {
                                state.pending.push_back(job);
                                drop(state);
                                shared.notify.notify_one();
                            }
                        }
                    }
                });
            }
        }

        tracing::debug!(
            target: TRACING_TARGET_QUEUE,
            workflow_id = %workflow_id,
            message_id = %id,
            delayed = delay.is_some(),
            "Enqueued workflow step"
        );
        Ok(id)
    }

    async fn size(&self) -> QueueResult<usize> {
        let state = self.shared.lock_state();
        Ok(state.pending.len() + state.delayed.len() + state.in_flight.len())
    }

    async fn close(&self) -> QueueResult<()> {
        {
            let mut state = self.shared.lock_state();
            state.closed = true;
            state.delayed.clear();
        }
        self.shared.cancel.cancel();
        self.shared.notify.notify_waiters();
        Ok(())
    }
}

/// [`QueueConsumer`] over a [`MemoryQueue`].
#[derive(Debug, Clone)]
pub struct MemoryConsumer {
    shared: Arc<Shared>,
}

#[async_trait::async_trait]
impl QueueConsumer for MemoryConsumer {
    async fn next(&self) -> QueueResult<Option<Box<dyn Delivery>>> {
        loop {
            let notified = self.shared.notify.notified();
            tokio::pin!(notified);
            // Register before checking state so a concurrent close or
            // enqueue cannot slip between the check and the await.
            notified.as_mut().enable();

            {
                let mut state = self.shared.lock_state();
                if let Some(job) = state.pending.pop_front() {
                    state.in_flight.insert(job.id, job.clone());
                    return Ok(Some(Box::new(MemoryDelivery {
                        shared: Arc::clone(&self.shared),
                        job,
                        settled: false,
                    })));
                }
                if state.closed {
                    return Ok(None);
                }
            }

            notified.await;
        }
    }
}

/// One unsettled in-memory delivery.
struct MemoryDelivery {
    shared: Arc<Shared>,
    job: ScheduledJob,
    settled: bool,
}

#[async_trait::async_trait]
impl Delivery for MemoryDelivery {
    fn job(&self) -> &ScheduledJob {
        &self.job
    }

    async fn ack(mut self: Box<Self>) -> QueueResult<()> {
        self.settled = true;
        self.shared.lock_state().in_flight.remove(&self.job.id);
        Ok(())
    }

    async fn nack(mut self: Box<Self>, requeue: bool) -> QueueResult<()> {
        self.settled = true;
        if requeue {
            self.shared.requeue(self.job.clone());
        } else {
            self.shared.lock_state().in_flight.remove(&self.job.id);
            tracing::warn!(
                target: TRACING_TARGET_QUEUE,
                workflow_id = %self.job.workflow_id,
                message_id = %self.job.id,
                "Dropped workflow step permanently"
            );
        }
        Ok(())
    }
}

impl Drop for MemoryDelivery {
    fn drop(&mut self) {
        // An unsettled delivery counts as a consumer crash.
        if !self.settled {
            self.shared.requeue(self.job.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn delivers_in_fifo_order() {
        let queue = MemoryQueue::new();
        let consumer = queue.consumer();
        let first = WorkflowId::new();
        let second = WorkflowId::new();

        queue.enqueue(first, None).await.unwrap();
        queue.enqueue(second, None).await.unwrap();

        let delivery = consumer.next().await.unwrap().unwrap();
        assert_eq!(delivery.job().workflow_id, first);
        delivery.ack().await.unwrap();

        let delivery = consumer.next().await.unwrap().unwrap();
        assert_eq!(delivery.job().workflow_id, second);
        delivery.ack().await.unwrap();

        assert_eq!(queue.size().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn nack_with_requeue_redelivers() {
        let queue = MemoryQueue::new();
        let consumer = queue.consumer();
        let id = WorkflowId::new();
        queue.enqueue(id, None).await.unwrap();

        let delivery = consumer.next().await.unwrap().unwrap();
        delivery.nack(true).await.unwrap();

        let delivery = consumer.next().await.unwrap().unwrap();
        assert_eq!(delivery.job().workflow_id, id);
        delivery.ack().await.unwrap();
        assert_eq!(queue.size().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn nack_without_requeue_drops() {
        let queue = MemoryQueue::new();
        let consumer = queue.consumer();
        queue.enqueue(WorkflowId::new(), None).await.unwrap();

        let delivery = consumer.next().await.unwrap().unwrap();
        delivery.nack(false).await.unwrap();
        assert_eq!(queue.size().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn dropped_delivery_is_redelivered() {
        let queue = MemoryQueue::new();
        let consumer = queue.consumer();
        let id = WorkflowId::new();
        queue.enqueue(id, None).await.unwrap();

        let delivery = consumer.next().await.unwrap().unwrap();
        drop(delivery);

        let delivery = consumer.next().await.unwrap().unwrap();
        assert_eq!(delivery.job().workflow_id, id);
        delivery.ack().await.unwrap();
    }

    #[tokio::test]
    async fn delayed_job_becomes_visible_after_delay() {
        let queue = MemoryQueue::new();
        let consumer = queue.consumer();
        queue
            .enqueue(WorkflowId::new(), Some(SignedDuration::from_millis(30)))
            .await
            .unwrap();

        // Not deliverable yet.
        let early = tokio::time::timeout(Duration::from_millis(5), consumer.next()).await;
        assert!(early.is_err());

        let delivery = tokio::time::timeout(Duration::from_secs(2), consumer.next())
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        delivery.ack().await.unwrap();
    }

    #[tokio::test]
    async fn close_rejects_enqueue_and_cancels_delayed() {
        let queue = MemoryQueue::new();
        let consumer = queue.consumer();
        queue
            .enqueue(WorkflowId::new(), Some(SignedDuration::from_secs(3600)))
            .await
            .unwrap();

        queue.close().await.unwrap();
        assert!(matches!(
            queue.enqueue(WorkflowId::new(), None).await,
            Err(QueueError::Closed)
        ));
        assert_eq!(queue.size().await.unwrap(), 0);
        assert!(consumer.next().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn close_drains_pending_before_ending() {
        let queue = MemoryQueue::new();
        let consumer = queue.consumer();
        let id = WorkflowId::new();
        queue.enqueue(id, None).await.unwrap();
        queue.close().await.unwrap();

        let delivery = consumer.next().await.unwrap().unwrap();
        assert_eq!(delivery.job().workflow_id, id);
        delivery.ack().await.unwrap();
        assert!(consumer.next().await.unwrap().is_none());
    }
}
