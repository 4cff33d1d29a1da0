//! Postgres connection pools and migrations

use std::future::Future;
use std::time::Duration;

use sqlx::postgres::{PgPool, PgPoolOptions};
use tokio_retry::strategy::{jitter, ExponentialBackoff};
use tokio_retry::Retry;

/// Retries after the first failed connection attempt
const CONNECT_RETRIES: usize = 5;

#[derive(Debug, thiserror::Error)]
pub enum DbError {
    #[error("Database connection failed: {0}")]
    Connect(#[from] sqlx::Error),
    #[error("Migration failed: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),
}

/// Create the pool used for regular queries.
///
/// The first connection is retried with jittered exponential backoff so the
/// API and worker survive a database that comes up slightly after them.
pub async fn create_pool(database_url: &str) -> Result<PgPool, DbError> {
    let options = PgPoolOptions::new()
        .max_connections(10)
        .acquire_timeout(Duration::from_secs(5));
    let pool = connect_with_retry(options, database_url).await?;

    tracing::info!("Database pool created");
    Ok(pool)
}

/// Single-connection pool with long timeouts, used only while migrating.
/// Retried like [`create_pool`] since it is the API's first connection.
pub async fn create_migration_pool(database_url: &str) -> Result<PgPool, DbError> {
    let options = PgPoolOptions::new()
        .max_connections(1)
        .acquire_timeout(Duration::from_secs(30));
    connect_with_retry(options, database_url).await
}

async fn connect_with_retry(
    options: PgPoolOptions,
    database_url: &str,
) -> Result<PgPool, DbError> {
    let pool = retry_connect(|| options.clone().connect(database_url)).await?;
    Ok(pool)
}

/// Run `attempt` until it succeeds or the backoff schedule runs out
async fn retry_connect<T, F, Fut>(mut attempt: F) -> Result<T, sqlx::Error>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, sqlx::Error>>,
{
    let strategy = ExponentialBackoff::from_millis(100)
        .max_delay(Duration::from_secs(5))
        .map(jitter)
        .take(CONNECT_RETRIES);

    Retry::spawn(strategy, || {
        let pending = attempt();
        async move {
            pending.await.map_err(|e| {
                tracing::warn!(error = %e, "Database connection attempt failed");
                e
            })
        }
    })
    .await
}

/// Apply the embedded migrations
pub async fn run_migrations(pool: &PgPool) -> Result<(), DbError> {
    sqlx::migrate!("./migrations").run(pool).await?;
    tracing::info!("Database migrations applied");
    Ok(())
}
