//! Database connection management

use sqlx::{Pool, Postgres};
use std::time::Duration;

use crate::config::DatabaseConfig;
use crate::utils::errors::DoorListError;

pub type DatabasePool = Pool<Postgres>;

/// Connection acquisition deadline; slow acquires indicate an exhausted
/// pool, not a slow query.
const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(30);

/// Create a connection pool and verify it answers before handing it out.
pub async fn create_pool(config: &DatabaseConfig) -> Result<DatabasePool, DoorListError> {
    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .acquire_timeout(ACQUIRE_TIMEOUT)
        .connect(&config.url)
        .await?;

    sqlx::query("SELECT 1")
        .execute(&pool)
        .await?;

    tracing::info!(
        max_connections = config.max_connections,
        "Database connection pool created"
    );
    Ok(pool)
}

/// Run database migrations
pub async fn run_migrations(pool: &DatabasePool) -> Result<(), DoorListError> {
    tracing::info!("Running database migrations...");

    sqlx::migrate!("./migrations")
        .run(pool)
        .await?;

    tracing::info!("Database migrations completed successfully");
    Ok(())
}
