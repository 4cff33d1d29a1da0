// Test code patterns:
#![cfg_attr(test, allow(clippy::unwrap_used))]

//! Tipline Background Worker
//!
//! Handles scheduled jobs including:
//! - Expiry sweep of lapsed premium accounts (every minute)
//! - Subscription invariant checks (hourly)
//! - Heartbeat (every 5 minutes)
//!
//! Schedules can be overridden with `SWEEP_CRON` and `INVARIANT_CRON`.

mod jobs;

use time::OffsetDateTime;
use tipline_shared::create_pool;
use tipline_subscriptions::{EngineConfig, SubscriptionEngine};
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::info;

const DEFAULT_SWEEP_CRON: &str = "0 * * * * *";
const DEFAULT_INVARIANT_CRON: &str = "0 0 * * * *";

fn cron_from_env(name: &str, default: &str) -> String {
    std::env::var(name)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .unwrap_or_else(|| default.to_string())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    // Load environment
    dotenvy::dotenv().ok();

    info!("Starting Tipline Worker");

    let database_url = std::env::var("DATABASE_URL")
        .map_err(|_| anyhow::anyhow!("DATABASE_URL must be set"))?;
    let pool = create_pool(&database_url).await?;
    let engine = SubscriptionEngine::from_pool(pool, EngineConfig::default());

    // Create scheduler
    let scheduler = JobScheduler::new().await?;

    // Job 1: Expiry sweep
    let sweep_cron = cron_from_env("SWEEP_CRON", DEFAULT_SWEEP_CRON);
    let sweep_engine = engine.clone();
    scheduler
        .add(Job::new_async(sweep_cron.as_str(), move |_uuid, _l| {
            let engine = sweep_engine.clone();
            Box::pin(async move {
                jobs::run_expiry_sweep(&engine, OffsetDateTime::now_utc()).await;
            })
        })?)
        .await?;
    info!(cron = %sweep_cron, "Scheduled: Expiry sweep");

    // Job 2: Invariant check
    let invariant_cron = cron_from_env("INVARIANT_CRON", DEFAULT_INVARIANT_CRON);
    let invariant_engine = engine.clone();
    scheduler
        .add(Job::new_async(invariant_cron.as_str(), move |_uuid, _l| {
            let engine = invariant_engine.clone();
            Box::pin(async move {
                jobs::run_invariant_check(&engine, OffsetDateTime::now_utc()).await;
            })
        })?)
        .await?;
    info!(cron = %invariant_cron, "Scheduled: Invariant check");

    // Job 3: Heartbeat (every 5 minutes)
    scheduler
        .add(Job::new_async("0 */5 * * * *", |_uuid, _l| {
            Box::pin(async move {
                info!("Worker heartbeat - all systems operational");
            })
        })?)
        .await?;
    info!("Scheduled: Health check heartbeat (every 5 minutes)");

    // Catch up on anything that lapsed while the worker was down
    jobs::run_expiry_sweep(&engine, OffsetDateTime::now_utc()).await;

    scheduler.start().await?;
    info!("Worker started, waiting for shutdown signal");

    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received");

    Ok(())
}
