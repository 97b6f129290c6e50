//! Worker configuration.

use std::time::Duration;

use jiff::SignedDuration;
use serde::{Deserialize, Serialize};

/// Default advisory lock lifetime.
const DEFAULT_LOCK_TTL: Duration = Duration::from_secs(60);

/// Default cap on steps processed concurrently by one worker.
pub(crate) const DEFAULT_MAX_CONCURRENT_JOBS: usize = 10;

/// Worker loop configuration.
///
/// All fields are optional; accessors substitute defaults.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    /// Stable lock-holder name for this worker instance. Generated from a
    /// fresh UUID when unset.
    pub worker_id: Option<String>,
    /// Advisory lock lifetime in seconds. A crashed worker's lock becomes
    /// stealable after this long.
    pub worker_lock_ttl_secs: Option<u64>,
    /// Delay between consecutive steps of the same workflow, in
    /// milliseconds.
    pub worker_step_delay_ms: Option<u64>,
    /// Maximum steps processed concurrently by this worker instance.
    pub worker_max_concurrent_jobs: Option<usize>,
}

impl WorkerConfig {
    /// Creates a configuration with all defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the lock-holder name.
    pub fn with_worker_id(mut self, worker_id: impl Into<String>) -> Self {
        self.worker_id = Some(worker_id.into());
        self
    }

    /// Sets the advisory lock lifetime.
    pub fn with_lock_ttl_secs(mut self, secs: u64) -> Self {
        self.worker_lock_ttl_secs = Some(secs);
        self
    }

    /// Sets the inter-step delay.
    pub fn with_step_delay_ms(mut self, millis: u64) -> Self {
        self.worker_step_delay_ms = Some(millis);
        self
    }

    /// Sets the concurrency cap.
    pub fn with_max_concurrent_jobs(mut self, jobs: usize) -> Self {
        self.worker_max_concurrent_jobs = Some(jobs);
        self
    }

    /// Advisory lock lifetime.
    pub fn lock_ttl(&self) -> SignedDuration {
        self.worker_lock_ttl_secs
            .map(|secs| SignedDuration::from_secs(secs as i64))
            .unwrap_or_else(|| {
                SignedDuration::from_secs(DEFAULT_LOCK_TTL.as_secs() as i64)
            })
    }

    /// Delay applied when re-enqueueing a workflow after a non-terminal
    /// step. `None` means immediate.
    pub fn step_delay(&self) -> Option<SignedDuration> {
        match self.worker_step_delay_ms {
            None | Some(0) => None,
            Some(millis) => Some(SignedDuration::from_millis(millis as i64)),
        }
    }

    /// Concurrency cap, never below one.
    pub fn max_concurrent_jobs(&self) -> usize {
        self.worker_max_concurrent_jobs
            .unwrap_or(DEFAULT_MAX_CONCURRENT_JOBS)
            .max(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_apply_when_unset() {
        let config = WorkerConfig::new();
        assert_eq!(config.lock_ttl(), SignedDuration::from_secs(60));
        assert_eq!(config.step_delay(), None);
    }

    #[test]
    fn zero_step_delay_means_immediate() {
        let config = WorkerConfig::new().with_step_delay_ms(0);
        assert_eq!(config.step_delay(), None);

        let config = WorkerConfig::new().with_step_delay_ms(250);
        assert_eq!(config.step_delay(), Some(SignedDuration::from_millis(250)));
    }
}
