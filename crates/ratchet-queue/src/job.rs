//! The scheduling queue's message envelope.

use jiff::{SignedDuration, Timestamp};
use ratchet_core::{MessageId, WorkflowId};
use serde::{Deserialize, Serialize};

/// One scheduled step of a workflow.
///
/// The envelope carries only the workflow id; the worker loads the current
/// definition and cursor from the stores when the job is delivered, so a
/// redelivered message never acts on stale state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduledJob {
    /// Unique message id.
    pub id: MessageId,
    /// The workflow to advance.
    pub workflow_id: WorkflowId,
    /// When the job was enqueued.
    pub enqueued_at: Timestamp,
    /// Earliest instant the job may be delivered; brokers without native
    /// delayed delivery redeliver with the residual delay until this
    /// passes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub not_before: Option<Timestamp>,
}

impl ScheduledJob {
    /// Creates an immediately deliverable job.
    pub fn new(workflow_id: WorkflowId) -> Self {
        Self {
            id: MessageId::new(),
            workflow_id,
            enqueued_at: Timestamp::now(),
            not_before: None,
        }
    }

    /// Delays delivery by the given duration.
    pub fn after(mut self, delay: SignedDuration) -> Self {
        if delay > SignedDuration::ZERO {
            self.not_before = Some(
                Timestamp::now()
                    .saturating_add(delay)
                    .expect("adding a SignedDuration to a Timestamp is infallible"),
            );
        }
        self
    }

    /// Returns whether the job may be delivered now.
    pub fn is_ready(&self) -> bool {
        self.not_before
            .is_none_or(|not_before| Timestamp::now() >= not_before)
    }

    /// Residual delay until the job becomes deliverable.
    pub fn remaining_delay(&self) -> Option<SignedDuration> {
        let not_before = self.not_before?;
        let remaining = not_before.duration_since(Timestamp::now());
        (remaining > SignedDuration::ZERO).then_some(remaining)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_job_is_ready() {
        let job = ScheduledJob::new(WorkflowId::new());
        assert!(job.is_ready());
        assert!(job.remaining_delay().is_none());
    }

    #[test]
    fn delayed_job_reports_residual() {
        let job = ScheduledJob::new(WorkflowId::new()).after(SignedDuration::from_secs(60));
        assert!(!job.is_ready());
        assert!(job.remaining_delay().unwrap() > SignedDuration::from_secs(50));
    }

    #[test]
    fn zero_delay_is_immediate() {
        let job = ScheduledJob::new(WorkflowId::new()).after(SignedDuration::ZERO);
        assert!(job.not_before.is_none());
    }
}
