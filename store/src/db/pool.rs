//! PostgreSQL pool setup and migrations.

use super::DbResult;
use crate::config::Config;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use std::time::Duration;

/// Type alias for the database pool.
pub type Pool = PgPool;

const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(30);

/// Open a pool sized by `config`.
pub async fn create_pool(config: &Config) -> DbResult<Pool> {
    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .acquire_timeout(ACQUIRE_TIMEOUT)
        .connect(&config.database_url)
        .await?;
    tracing::debug!(max_connections = config.max_connections, "Opened pool");
    Ok(pool)
}

/// Apply every pending migration under `migrations/`.
pub async fn run_migrations(pool: &Pool) -> DbResult<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}
