//! Tipline API Server
//!
//! Serves registration, subscription requests, admin approval and gated
//! slip listings.

use std::net::SocketAddr;

use axum::http::{header, HeaderValue, Method};
use time::OffsetDateTime;
use tipline_api::{auth::hash_password, create_router, AppState, Config};
use tipline_shared::{create_migration_pool, create_pool, run_migrations};
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    trace::TraceLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tipline_api=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Tipline API Server v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let config = Config::from_env()?;
    tracing::info!("Configuration loaded");

    // Run migrations on a dedicated pool with longer timeouts
    tracing::info!("Running database migrations...");
    let migration_pool = create_migration_pool(&config.database_url).await?;
    run_migrations(&migration_pool).await?;
    migration_pool.close().await;
    tracing::info!("Database migrations applied");

    tracing::info!("Connecting to database...");
    let pool = create_pool(&config.database_url).await?;
    tracing::info!("Database connection established");

    // Create application state
    let state = AppState::new(pool, config.clone());

    if let Some(admin) = &config.bootstrap_admin {
        let hash = hash_password(&admin.password)
            .map_err(|e| anyhow::anyhow!("failed to hash bootstrap admin password: {e}"))?;
        let created = state
            .engine
            .accounts
            .ensure_admin(&admin.email, hash, OffsetDateTime::now_utc())
            .await?;
        if created {
            tracing::info!(email = %admin.email, "Bootstrap admin account created");
        }
    }

    // Expiry is lazy by default; a background sweep is optional
    match config.sweep_interval {
        Some(every) => {
            tokio::spawn(state.engine.sweeper.clone().run_periodic(every));
            tracing::info!(interval_secs = every.as_secs(), "Background expiry sweep task started");
        }
        None => tracing::info!("Background expiry sweep disabled, sweeping on read only"),
    }

    // Build CORS layer - restrict to allowed origins only
    let allowed_origins: Vec<HeaderValue> = config
        .allowed_origins
        .iter()
        .filter_map(|s| s.parse().ok())
        .collect();

    tracing::info!(
        allowed_origins = ?allowed_origins,
        "CORS configured with {} allowed origins",
        allowed_origins.len()
    );

    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::list(allowed_origins))
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([
            header::AUTHORIZATION,
            header::CONTENT_TYPE,
            header::ACCEPT,
            header::ORIGIN,
        ])
        .expose_headers([header::CONTENT_TYPE]);

    // Build the router
    let app = create_router(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http());

    // Parse bind address
    let addr: SocketAddr = config.bind_address.parse()?;
    tracing::info!("Starting server on {}", addr);

    // Start the server
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
