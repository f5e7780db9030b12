//! Connection pool and embedded migrations for the record store.

use std::time::Duration;

use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing::{info, instrument};

use crate::DbError;

pub type DbPool = PgPool;

/// How long a pass may wait for a connection before its save fails.
const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(5);

#[instrument(skip(database_url))]
pub async fn create_pool(database_url: &str, max_connections: u32) -> Result<DbPool, DbError> {
    let pool = PgPoolOptions::new()
        .max_connections(max_connections)
        .acquire_timeout(ACQUIRE_TIMEOUT)
        .connect(database_url)
        .await?;
    info!("record store connected");
    Ok(pool)
}

/// Apply `migrations/*.sql` from the workspace root, embedded at build time.
pub async fn run_migrations(pool: &DbPool) -> Result<(), DbError> {
    let migrator = sqlx::migrate!("../../migrations");
    migrator.run(pool).await?;
    info!(migrations = migrator.iter().count(), "record store schema up to date");
    Ok(())
}
