//! Pooled database client.
//!
//! The `async-nats`-style sharing rules apply here too: the client is
//! `Arc`-wrapped internally, clones share the pool, and any number of tasks
//! may check out connections concurrently.

use std::fmt;
use std::sync::Arc;

use deadpool::managed::Pool;
use diesel_async::AsyncPgConnection;
use diesel_async::pooled_connection::AsyncDieselConnectionManager;

use super::migrate;
use crate::error::{PgError, PgResult};
use crate::{TRACING_TARGET_CONNECTION, TRACING_TARGET_MIGRATION};

/// Async diesel connection pool.
pub type ConnectionPool = Pool<AsyncDieselConnectionManager<AsyncPgConnection>>;

/// One checked-out pool connection.
pub type PooledConnection =
    deadpool::managed::Object<AsyncDieselConnectionManager<AsyncPgConnection>>;

use super::pg_config::PgConfig;

/// High-level database client managing the connection pool and migrations.
#[derive(Clone)]
pub struct PgClient {
    inner: Arc<PgClientInner>,
}

struct PgClientInner {
    pool: ConnectionPool,
    config: PgConfig,
}

impl PgClient {
    /// Creates a database client with the provided configuration.
    #[tracing::instrument(
        skip(config),
        target = TRACING_TARGET_CONNECTION,
        fields(database_url = %config.database_url_masked())
    )]
    pub fn new(config: PgConfig) -> PgResult<Self> {
        config.validate()?;
        tracing::info!(target: TRACING_TARGET_CONNECTION, "Initializing database client");

        let manager = AsyncDieselConnectionManager::new(&config.postgres_url);
        let pool = Pool::builder(manager)
            .max_size(config.postgres_max_connections as usize)
            .wait_timeout(Some(config.connection_timeout()))
            .create_timeout(Some(config.connection_timeout()))
            .recycle_timeout(Some(config.idle_timeout()))
            .runtime(deadpool::Runtime::Tokio1)
            .build()
            .map_err(|e| {
                tracing::error!(
                    target: TRACING_TARGET_CONNECTION,
                    error = %e,
                    "Failed to create connection pool"
                );
                PgError::Unexpected(format!("failed to build connection pool: {e}").into())
            })?;

        Ok(Self {
            inner: Arc::new(PgClientInner { pool, config }),
        })
    }

    /// Creates a client and applies pending migrations.
    pub async fn connect(config: PgConfig) -> PgResult<Self> {
        let client = Self::new(config)?;
        let applied = client.run_pending_migrations().await?;
        if !applied.is_empty() {
            tracing::info!(
                target: TRACING_TARGET_MIGRATION,
                migrations = applied.len(),
                "Applied pending database migrations"
            );
        }
        Ok(client)
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &PgConfig {
        &self.inner.config
    }

    /// Checks a connection out of the pool.
    pub async fn get_connection(&self) -> PgResult<PooledConnection> {
        self.inner.pool.get().await.map_err(PgError::from)
    }

    /// Applies all pending migrations, returning the applied versions.
    pub async fn run_pending_migrations(&self) -> PgResult<Vec<String>> {
        let conn = self.get_connection().await?;
        migrate::run_pending_migrations(conn).await
    }
}

impl fmt::Debug for PgClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PgClient")
            .field("config", &self.inner.config)
            .finish_non_exhaustive()
    }
}
