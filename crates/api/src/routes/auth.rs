//! Registration, login and profile

use axum::{extract::State, http::StatusCode, Extension, Json};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tipline_shared::Role;
use tipline_subscriptions::{plan::FREE_PLAN, UserAccount};
use uuid::Uuid;

use crate::{
    auth::{hash_password, validate_password_strength, verify_password, AuthUser},
    error::{ApiError, ApiResult},
    state::AppState,
};

// =============================================================================
// Request/Response Types
// =============================================================================

#[derive(Debug, Deserialize)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

/// An account as its owner (or an admin) sees it, after the expiry sweep
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileDto {
    pub id: Uuid,
    pub email: String,
    pub role: Role,
    pub plan: String,
    pub premium: bool,
    #[serde(with = "time::serde::rfc3339::option")]
    pub expires_at: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl From<&UserAccount> for ProfileDto {
    fn from(account: &UserAccount) -> Self {
        let state = account.state();
        Self {
            id: account.id,
            email: account.email.clone(),
            role: account.role,
            plan: state.plan().unwrap_or(FREE_PLAN).to_string(),
            premium: state.is_premium(),
            expires_at: state.expires_at(),
            created_at: account.created_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ProfileResponse {
    pub success: bool,
    pub user: ProfileDto,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub success: bool,
    pub token: String,
    pub user: ProfileDto,
}

// =============================================================================
// Handlers
// =============================================================================

/// POST /register
pub async fn register(
    State(state): State<AppState>,
    Json(body): Json<Credentials>,
) -> ApiResult<(StatusCode, Json<ProfileResponse>)> {
    validate_password_strength(&body.password).map_err(ApiError::Validation)?;

    let password = body.password;
    let hash = tokio::task::spawn_blocking(move || hash_password(&password))
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?
        .map_err(|e| ApiError::Internal(e.to_string()))?;

    let account = state
        .engine
        .accounts
        .register(&body.email, hash, Role::User, OffsetDateTime::now_utc())
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(ProfileResponse {
            success: true,
            user: ProfileDto::from(&account),
        }),
    ))
}

/// POST /login
pub async fn login(
    State(state): State<AppState>,
    Json(body): Json<Credentials>,
) -> ApiResult<Json<LoginResponse>> {
    let now = OffsetDateTime::now_utc();
    let account = state
        .engine
        .accounts
        .find_by_email(&body.email, now)
        .await?
        .ok_or(ApiError::InvalidCredentials)?;

    let password = body.password;
    let hash = account.password_hash.clone();
    let valid = tokio::task::spawn_blocking(move || verify_password(&password, &hash))
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?;
    if !valid {
        tracing::info!(account_id = %account.id, "Login failed: wrong password");
        return Err(ApiError::InvalidCredentials);
    }

    let token = state
        .jwt_manager
        .generate_access_token(account.id, account.role, now)
        .map_err(|e| ApiError::Internal(e.to_string()))?;

    tracing::info!(account_id = %account.id, role = %account.role, "Login succeeded");
    Ok(Json(LoginResponse {
        success: true,
        token,
        user: ProfileDto::from(&account),
    }))
}

/// GET /profile
pub async fn profile(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> ApiResult<Json<ProfileResponse>> {
    let account = state
        .engine
        .accounts
        .get(user.user_id, OffsetDateTime::now_utc())
        .await?;

    Ok(Json(ProfileResponse {
        success: true,
        user: ProfileDto::from(&account),
    }))
}
