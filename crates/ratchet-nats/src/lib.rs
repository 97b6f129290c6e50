#![forbid(unsafe_code)]
#![cfg_attr(docsrs, feature(doc_cfg))]
#![doc = include_str!("../README.md")]

/// Tracing target for NATS connection operations.
pub const TRACING_TARGET_CONNECTION: &str = "ratchet_nats::connection";

/// Tracing target for JetStream queue operations.
pub const TRACING_TARGET_QUEUE: &str = "ratchet_nats::queue";

mod client;
mod error;
mod queue;

// Re-export async_nats types needed by consumers.
pub use async_nats::jetstream;
pub use client::{NatsClient, NatsConfig};
pub use error::{Error, Result};
pub use queue::{JetStreamConsumer, JetStreamQueue};
