//! NATS client wrapper and connection management.
//!
//! The underlying `async-nats` client multiplexes one TCP connection and is
//! `Arc`-wrapped internally, so clones are cheap and safe to share across
//! tasks.

use std::sync::Arc;
use std::time::Duration;

use async_nats::{Client, ConnectOptions, jetstream};
use serde::{Deserialize, Serialize};
use tokio::time::timeout;

use crate::error::{Error, Result};
use crate::{TRACING_TARGET_CONNECTION, queue::JetStreamQueue};

const DEFAULT_NAME: &str = "ratchet-nats";
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_PING_INTERVAL_SECS: u64 = 30;

/// Configuration for NATS connections with sensible defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NatsConfig {
    /// NATS server URL (comma-separated for clustering).
    pub nats_url: String,
    /// Authentication token.
    pub nats_token: String,
    /// Client connection name for debugging and monitoring.
    pub nats_client_name: Option<String>,
    /// Connection timeout in seconds.
    pub nats_connect_timeout: Option<u64>,
}

impl NatsConfig {
    /// Creates a configuration with a single server URL and token.
    pub fn new(server_url: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            nats_url: server_url.into(),
            nats_token: token.into(),
            nats_client_name: None,
            nats_connect_timeout: None,
        }
    }

    /// Returns the client name, using the default if not set.
    #[inline]
    pub fn name(&self) -> &str {
        self.nats_client_name.as_deref().unwrap_or(DEFAULT_NAME)
    }

    /// Returns the connection timeout.
    #[inline]
    pub fn connect_timeout(&self) -> Duration {
        self.nats_connect_timeout
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_CONNECT_TIMEOUT)
    }
}

/// NATS client wrapper with connection management.
///
/// Cheaply cloneable; clones share the same underlying connection.
#[derive(Debug, Clone)]
pub struct NatsClient {
    inner: Arc<NatsClientInner>,
}

#[derive(Debug)]
struct NatsClientInner {
    client: Client,
    jetstream: jetstream::Context,
    config: NatsConfig,
}

impl NatsClient {
    /// Connects to NATS and initializes a JetStream context.
    #[tracing::instrument(skip(config), target = TRACING_TARGET_CONNECTION)]
    pub async fn connect(config: NatsConfig) -> Result<Self> {
        let connect_opts = ConnectOptions::new()
            .name(config.name())
            .ping_interval(Duration::from_secs(DEFAULT_PING_INTERVAL_SECS))
            .token(config.nats_token.clone());

        let connect_timeout = config.connect_timeout();
        let client = timeout(
            connect_timeout,
            async_nats::connect_with_options(&config.nats_url, connect_opts),
        )
        .await
        .map_err(|_| Error::Timeout {
            timeout: connect_timeout,
        })?
        .map_err(|e| Error::Connection(Box::new(e)))?;

        let jetstream = jetstream::new(client.clone());

        let server_info = client.server_info();
        tracing::info!(
            target: TRACING_TARGET_CONNECTION,
            server_host = %server_info.host,
            server_version = %server_info.version,
            server_id = %server_info.server_id,
            "Connected to NATS"
        );

        Ok(Self {
            inner: Arc::new(NatsClientInner {
                client,
                jetstream,
                config,
            }),
        })
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &NatsConfig {
        &self.inner.config
    }

    /// Returns the JetStream context.
    #[must_use]
    pub fn jetstream(&self) -> &jetstream::Context {
        &self.inner.jetstream
    }

    /// Tests connectivity with a flush round trip.
    #[tracing::instrument(skip(self), target = TRACING_TARGET_CONNECTION)]
    pub async fn ping(&self) -> Result<Duration> {
        let start = std::time::Instant::now();
        self.inner
            .client
            .flush()
            .await
            .map_err(|e| Error::Connection(Box::new(e)))?;
        Ok(start.elapsed())
    }

    /// Opens (or creates) the named scheduling queue.
    pub async fn workflow_queue(&self, queue_name: &str) -> Result<JetStreamQueue> {
        JetStreamQueue::new(self.jetstream(), queue_name).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_defaults_apply_when_unset() {
        let config = NatsConfig::new("nats://localhost:4222", "token");
        assert_eq!(config.name(), DEFAULT_NAME);
        assert_eq!(config.connect_timeout(), DEFAULT_CONNECT_TIMEOUT);

        let config = NatsConfig {
            nats_client_name: Some("worker-7".to_owned()),
            nats_connect_timeout: Some(5),
            ..config
        };
        assert_eq!(config.name(), "worker-7");
        assert_eq!(config.connect_timeout(), Duration::from_secs(5));
    }
}
