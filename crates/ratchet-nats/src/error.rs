//! Error types for NATS operations.

use std::time::Duration;

/// Result type for all NATS operations in this crate.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Unified error type for NATS operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// NATS client/connection errors.
    #[error("NATS connection error: {0}")]
    Connection(#[from] async_nats::Error),

    /// Serialization errors when sending or receiving messages.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Operation timeout.
    #[error("Operation timed out after {timeout:?}")]
    Timeout {
        /// The elapsed timeout.
        timeout: Duration,
    },

    /// Stream operation failed.
    #[error("Stream operation failed on '{stream}': {reason}")]
    Stream {
        /// The stream name.
        stream: String,
        /// Failure detail.
        reason: String,
    },

    /// Consumer operation failed.
    #[error("Consumer '{consumer}' error: {reason}")]
    Consumer {
        /// The consumer name.
        consumer: String,
        /// Failure detail.
        reason: String,
    },
}

impl Error {
    /// Creates a stream error.
    pub fn stream(stream: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Stream {
            stream: stream.into(),
            reason: reason.into(),
        }
    }

    /// Creates a consumer error.
    pub fn consumer(consumer: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Consumer {
            consumer: consumer.into(),
            reason: reason.into(),
        }
    }
}
