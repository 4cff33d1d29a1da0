//! Application state

use std::sync::Arc;

use sqlx::PgPool;
use tipline_subscriptions::{Store, SubscriptionEngine};

use crate::{
    auth::{AuthState, JwtManager},
    config::Config,
};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub engine: SubscriptionEngine,
    pub jwt_manager: JwtManager,
}

impl AppState {
    /// State backed by Postgres
    pub fn new(pool: PgPool, config: Config) -> Self {
        let engine = SubscriptionEngine::from_pool(pool, config.engine_config());
        Self::with_engine(engine, config)
    }

    /// State over any store, e.g. the in-memory one in tests
    pub fn with_store(store: Arc<dyn Store>, config: Config) -> Self {
        let engine = SubscriptionEngine::new(store, config.engine_config());
        Self::with_engine(engine, config)
    }

    fn with_engine(engine: SubscriptionEngine, config: Config) -> Self {
        tracing::info!(
            sweep_timeout_ms = config.sweep_timeout.as_millis() as u64,
            missing_account_policy = %config.missing_account_policy,
            "Subscription engine initialized"
        );
        Self {
            jwt_manager: JwtManager::new(&config.jwt_secret, config.jwt_expiry_hours),
            engine,
            config,
        }
    }

    /// Get auth state for middleware
    pub fn auth_state(&self) -> AuthState {
        AuthState {
            jwt_manager: self.jwt_manager.clone(),
        }
    }
}
