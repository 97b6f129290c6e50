//! JetStream-backed scheduling queue.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_nats::jetstream::{self, AckKind, consumer, stream};
use futures::StreamExt;
use jiff::SignedDuration;
use ratchet_core::{MessageId, WorkflowId};
use ratchet_queue::{Delivery, QueueConsumer, QueueError, QueueResult, ScheduledJob, WorkflowQueue};

use crate::TRACING_TARGET_QUEUE;
use crate::error::{Error, Result};

/// How long a pull waits for a message before the consumer loop re-checks
/// the closed flag.
const FETCH_EXPIRES: Duration = Duration::from_secs(5);

/// How long the broker waits for an acknowledgement before redelivering.
const ACK_WAIT: Duration = Duration::from_secs(300);

/// [`WorkflowQueue`] over a JetStream work-queue stream.
///
/// JetStream has no native delayed delivery, so the envelope carries its
/// earliest delivery time and consumers negatively acknowledge early
/// arrivals with the residual delay.
#[derive(Debug, Clone)]
pub struct JetStreamQueue {
    jetstream: jetstream::Context,
    stream_name: String,
    subject: String,
    closed: Arc<AtomicBool>,
}

impl JetStreamQueue {
    /// Opens the scheduling queue, creating the stream if needed.
    #[tracing::instrument(skip(jetstream), target = TRACING_TARGET_QUEUE)]
    pub async fn new(jetstream: &jetstream::Context, queue_name: &str) -> Result<Self> {
        let stream_name = stream_name(queue_name);
        let subject = step_subject(queue_name);

        let stream_config = stream::Config {
            name: stream_name.clone(),
            description: Some(format!("Ratchet scheduling queue: {queue_name}")),
            subjects: vec![subject.clone()],
            retention: stream::RetentionPolicy::WorkQueue,
            ..Default::default()
        };

        match jetstream.get_stream(&stream_name).await {
            Ok(_) => {
                tracing::debug!(
                    target: TRACING_TARGET_QUEUE,
                    stream = %stream_name,
                    "Using existing scheduling stream"
                );
            }
            Err(_) => {
                tracing::debug!(
                    target: TRACING_TARGET_QUEUE,
                    stream = %stream_name,
                    "Creating scheduling stream"
                );
                jetstream
                    .create_stream(stream_config)
                    .await
                    .map_err(|e| Error::stream(&stream_name, e.to_string()))?;
            }
        }

        Ok(Self {
            jetstream: jetstream.clone(),
            stream_name,
            subject,
            closed: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Creates a durable pull consumer over this queue.
    ///
    /// Consumers sharing a name share the work; distinct names would each
    /// see every message, so workers must pass the same `consumer_name`.
    #[tracing::instrument(skip(self), target = TRACING_TARGET_QUEUE)]
    pub async fn consumer(&self, consumer_name: &str) -> Result<JetStreamConsumer> {
        let consumer_config = consumer::pull::Config {
            name: Some(consumer_name.to_owned()),
            durable_name: Some(consumer_name.to_owned()),
            description: Some("Ratchet workflow step consumer".to_owned()),
            ack_wait: ACK_WAIT,
            ..Default::default()
        };

        let stream = self
            .jetstream
            .get_stream(&self.stream_name)
            .await
            .map_err(|e| Error::stream(&self.stream_name, e.to_string()))?;

        let consumer = stream
            .create_consumer(consumer_config)
            .await
            .map_err(|e| Error::consumer(consumer_name, e.to_string()))?;

        Ok(JetStreamConsumer {
            consumer,
            closed: Arc::clone(&self.closed),
        })
    }
}

#[async_trait::async_trait]
impl WorkflowQueue for JetStreamQueue {
    async fn enqueue(
        &self,
        workflow_id: WorkflowId,
        delay: Option<SignedDuration>,
    ) -> QueueResult<MessageId> {
        if self.closed.load(Ordering::Acquire) {
            return Err(QueueError::Closed);
        }

        let job = match delay {
            Some(delay) => ScheduledJob::new(workflow_id).after(delay),
            None => ScheduledJob::new(workflow_id),
        };
        let payload = serde_json::to_vec(&job)?;

        self.jetstream
            .publish(self.subject.clone(), payload.into())
            .await
            .map_err(|e| QueueError::backend("publish", e.to_string()))?
            .await
            .map_err(|e| QueueError::backend("publish_ack", e.to_string()))?;

        tracing::debug!(
            target: TRACING_TARGET_QUEUE,
            workflow_id = %workflow_id,
            message_id = %job.id,
            delayed = delay.is_some(),
            "Enqueued workflow step"
        );
        Ok(job.id)
    }

    async fn size(&self) -> QueueResult<usize> {
        let mut stream = self
            .jetstream
            .get_stream(&self.stream_name)
            .await
            .map_err(|e| QueueError::backend("stream_info", e.to_string()))?;
        let info = stream
            .info()
            .await
            .map_err(|e| QueueError::backend("stream_info", e.to_string()))?;
        Ok(info.state.messages as usize)
    }

    async fn close(&self) -> QueueResult<()> {
        // Messages already on the broker stay there; close only stops this
        // handle and its consumers.
        self.closed.store(true, Ordering::Release);
        Ok(())
    }
}

/// [`QueueConsumer`] over a durable JetStream pull consumer.
pub struct JetStreamConsumer {
    consumer: consumer::PullConsumer,
    closed: Arc<AtomicBool>,
}

#[async_trait::async_trait]
impl QueueConsumer for JetStreamConsumer {
    async fn next(&self) -> QueueResult<Option<Box<dyn Delivery>>> {
        loop {
            if self.closed.load(Ordering::Acquire) {
                return Ok(None);
            }

            let mut messages = self
                .consumer
                .fetch()
                .max_messages(1)
                .expires(FETCH_EXPIRES)
                .messages()
                .await
                .map_err(|e| QueueError::backend("fetch", e.to_string()))?;

            let Some(message) = messages.next().await else {
                continue;
            };
            let message = message.map_err(|e| QueueError::backend("fetch", e.to_string()))?;

            let job: ScheduledJob = match serde_json::from_slice(&message.payload) {
                Ok(job) => job,
                Err(error) => {
                    tracing::error!(
                        target: TRACING_TARGET_QUEUE,
                        error = %error,
                        "Discarding undecodable queue message"
                    );
                    // Terminate so the poison message never redelivers.
                    message.ack_with(AckKind::Term).await.ok();
                    continue;
                }
            };

            if let Some(remaining) = job.remaining_delay() {
                // Not due yet; hand it back with the residual delay.
                let delay = Duration::try_from(remaining).unwrap_or(Duration::ZERO);
                message.ack_with(AckKind::Nak(Some(delay))).await.ok();
                continue;
            }

            return Ok(Some(Box::new(JetStreamDelivery { message, job })));
        }
    }
}

/// One unsettled JetStream delivery.
///
/// Dropping without settlement lets the broker's ack-wait timer expire and
/// redeliver, which covers consumer crashes.
struct JetStreamDelivery {
    message: jetstream::Message,
    job: ScheduledJob,
}

#[async_trait::async_trait]
impl Delivery for JetStreamDelivery {
    fn job(&self) -> &ScheduledJob {
        &self.job
    }

    async fn ack(self: Box<Self>) -> QueueResult<()> {
        self.message
            .ack()
            .await
            .map_err(|e| QueueError::backend("ack", e.to_string()))
    }

    async fn nack(self: Box<Self>, requeue: bool) -> QueueResult<()> {
        let kind = if requeue {
            AckKind::Nak(None)
        } else {
            AckKind::Term
        };
        self.message
            .ack_with(kind)
            .await
            .map_err(|e| QueueError::backend("nack", e.to_string()))
    }
}

/// Stream name for a scheduling queue.
fn stream_name(queue_name: &str) -> String {
    format!("RATCHET_{}", queue_name.to_uppercase())
}

/// Subject workflow steps are published on.
fn step_subject(queue_name: &str) -> String {
    format!("ratchet.{queue_name}.steps")
}
