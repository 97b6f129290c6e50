//! Embedded migration runner.

use diesel_async::async_connection_wrapper::AsyncConnectionWrapper;
use diesel_migrations::MigrationHarness;
use tokio::task::spawn_blocking;

use super::pg_client::PooledConnection;
use crate::error::{PgError, PgResult};
use crate::{MIGRATIONS, TRACING_TARGET_MIGRATION};

/// Runs all pending migrations on the database.
///
/// The diesel migration harness is synchronous, so the pooled connection is
/// wrapped and moved onto a blocking thread for the duration.
#[tracing::instrument(skip(conn), target = TRACING_TARGET_MIGRATION)]
pub(super) async fn run_pending_migrations(conn: PooledConnection) -> PgResult<Vec<String>> {
    let mut conn: AsyncConnectionWrapper<_> = conn.into();

    let versions = spawn_blocking(move || {
        conn.run_pending_migrations(MIGRATIONS)
            .map(|versions| versions.iter().map(ToString::to_string).collect::<Vec<_>>())
    })
    .await
    .map_err(|join_error| {
        tracing::error!(
            target: TRACING_TARGET_MIGRATION,
            error = %join_error,
            "Migration task panicked"
        );
        PgError::Migration(join_error.into())
    })?
    .map_err(|err| {
        tracing::error!(
            target: TRACING_TARGET_MIGRATION,
            error = %err,
            "Database migration process failed"
        );
        PgError::Migration(err)
    })?;

    tracing::info!(
        target: TRACING_TARGET_MIGRATION,
        migrations_count = versions.len(),
        "Database migration process completed"
    );
    Ok(versions)
}
