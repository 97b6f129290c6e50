//! [`ratchet_store`] trait implementations over the connection pool.

mod batch;
mod runtime;
mod workflow;

pub use batch::PgBatchStore;
pub use runtime::PgRuntimeStore;
pub use workflow::PgWorkflowStore;

use ratchet_store::{StoreError, StoreResult};

use crate::client::{PgClient, PooledConnection};

/// Checks a connection out of the pool, mapping pool failures onto the
/// storage error vocabulary.
async fn connection(client: &PgClient) -> StoreResult<PooledConnection> {
    client
        .get_connection()
        .await
        .map_err(|err| StoreError::Backend(err.to_string()))
}
