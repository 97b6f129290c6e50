//! Connection pool management and migrations.

mod migrate;
mod pg_client;
mod pg_config;

pub use pg_client::{ConnectionPool, PgClient, PooledConnection};
pub use pg_config::PgConfig;
