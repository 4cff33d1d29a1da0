//! HTTP routes

pub mod admin;
pub mod auth;
pub mod slips;
pub mod subscriptions;


use axum::{
    extract::{Request, State},
    middleware::{from_fn_with_state, Next},
    response::Response,
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};
use time::OffsetDateTime;

use crate::{
    auth::{optional_auth, require_admin, require_auth},
    state::AppState,
};

pub fn create_router(state: AppState) -> Router {
    let auth_state = state.auth_state();

    let public = Router::new()
        .route("/health", get(health))
        .route("/register", post(auth::register))
        .route("/login", post(auth::login));

    let gated = Router::new()
        .route("/slips", get(slips::list_slips))
        .layer(from_fn_with_state(auth_state.clone(), optional_auth));

    let protected = Router::new()
        .route("/profile", get(auth::profile))
        .route(
            "/subscription-requests",
            post(subscriptions::submit_request),
        )
        .layer(from_fn_with_state(state.clone(), sweep_expired))
        .layer(from_fn_with_state(auth_state.clone(), require_auth));

    let admin = Router::new()
        .route("/admin/users", get(admin::list_users))
        .route("/admin/subscription-requests", get(admin::list_requests))
        .route(
            "/admin/subscription-requests/{id}/approve",
            post(admin::approve_request),
        )
        .route(
            "/admin/subscription-requests/{id}/reject",
            post(admin::reject_request),
        )
        .route("/admin/slips", post(slips::create_slip))
        .route("/admin/slips/{id}/result", post(slips::set_game_result))
        .route("/admin/invariants", get(admin::check_invariants))
        .layer(from_fn_with_state(state.clone(), sweep_expired))
        .layer(from_fn_with_state(auth_state, require_admin));

    Router::new()
        .merge(public)
        .merge(gated)
        .merge(protected)
        .merge(admin)
        .with_state(state)
}

/// Runs the expiry sweep before the handler sees any subscription state.
/// Failures and timeouts are logged by the sweeper and never block the request.
async fn sweep_expired(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    state
        .engine
        .sweeper
        .maybe_sweep(OffsetDateTime::now_utc())
        .await;
    next.run(request).await
}

async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}
