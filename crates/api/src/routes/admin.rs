//! Admin routes
//!
//! Protected by `require_admin`; the acting admin's id is recorded as
//! `resolved_by` on every ledger decision.

use axum::{
    extract::{Path, Query, State},
    Extension, Json,
};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tipline_subscriptions::{ApprovalOutcome, InvariantCheckSummary, RequestStatus};
use uuid::Uuid;

use crate::{
    auth::AuthUser,
    error::ApiResult,
    routes::{
        auth::ProfileDto,
        subscriptions::{RequestDto, RequestResponse},
    },
    state::AppState,
};

// =============================================================================
// Request/Response Types
// =============================================================================

#[derive(Debug, Deserialize)]
pub struct ListRequestsQuery {
    pub status: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct UserListResponse {
    pub success: bool,
    pub users: Vec<ProfileDto>,
}

#[derive(Debug, Serialize)]
pub struct RequestListResponse {
    pub success: bool,
    pub requests: Vec<RequestDto>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApprovalResponse {
    pub success: bool,
    pub request_id: Uuid,
    /// None when no account matched the request's email
    pub account_id: Option<Uuid>,
    pub plan: String,
    #[serde(with = "time::serde::rfc3339::option")]
    pub expires_at: Option<OffsetDateTime>,
}

impl From<ApprovalOutcome> for ApprovalResponse {
    fn from(outcome: ApprovalOutcome) -> Self {
        Self {
            success: true,
            request_id: outcome.request_id,
            account_id: outcome.account_id,
            plan: outcome.plan,
            expires_at: outcome.expires_at,
        }
    }
}

// =============================================================================
// Handlers
// =============================================================================

/// GET /admin/users
pub async fn list_users(State(state): State<AppState>) -> ApiResult<Json<UserListResponse>> {
    let accounts = state
        .engine
        .accounts
        .list(OffsetDateTime::now_utc())
        .await?;

    Ok(Json(UserListResponse {
        success: true,
        users: accounts.iter().map(ProfileDto::from).collect(),
    }))
}

/// GET /admin/subscription-requests?status=
pub async fn list_requests(
    State(state): State<AppState>,
    Query(params): Query<ListRequestsQuery>,
) -> ApiResult<Json<RequestListResponse>> {
    let status = params
        .status
        .filter(|s| !s.is_empty())
        .map(|s| s.parse::<RequestStatus>())
        .transpose()?;
    let requests = state.engine.ledger.list(status).await?;

    Ok(Json(RequestListResponse {
        success: true,
        requests: requests.into_iter().map(RequestDto::from).collect(),
    }))
}

/// POST /admin/subscription-requests/{id}/approve
pub async fn approve_request(
    State(state): State<AppState>,
    Extension(admin): Extension<AuthUser>,
    Path(request_id): Path<Uuid>,
) -> ApiResult<Json<ApprovalResponse>> {
    let outcome = state
        .engine
        .approvals
        .approve(request_id, Some(admin.user_id), OffsetDateTime::now_utc())
        .await?;
    Ok(Json(outcome.into()))
}

/// POST /admin/subscription-requests/{id}/reject
pub async fn reject_request(
    State(state): State<AppState>,
    Extension(admin): Extension<AuthUser>,
    Path(request_id): Path<Uuid>,
) -> ApiResult<Json<RequestResponse>> {
    let request = state
        .engine
        .ledger
        .reject(request_id, Some(admin.user_id), OffsetDateTime::now_utc())
        .await?;

    Ok(Json(RequestResponse {
        success: true,
        request: request.into(),
    }))
}

/// GET /admin/invariants
pub async fn check_invariants(
    State(state): State<AppState>,
) -> ApiResult<Json<InvariantCheckSummary>> {
    let summary = state
        .engine
        .invariants
        .run_all_checks(OffsetDateTime::now_utc())
        .await?;

    if !summary.healthy {
        tracing::warn!(
            violations = summary.violations.len(),
            checks_failed = summary.checks_failed,
            "Subscription invariants violated"
        );
    }
    Ok(Json(summary))
}
