//! Authentication middleware for Axum

use axum::{
    extract::{Request, State},
    http::{header::AUTHORIZATION, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;
use tipline_shared::Role;
use uuid::Uuid;

use super::jwt::JwtManager;

/// Authenticated account extracted from the bearer token
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthUser {
    pub user_id: Uuid,
    pub role: Role,
}

impl AuthUser {
    pub fn is_admin(&self) -> bool {
        self.role.is_admin()
    }
}

/// Inserted by [`optional_auth`] on every request; `None` for anonymous callers
#[derive(Debug, Clone, Copy, Default)]
pub struct Viewer(pub Option<AuthUser>);

/// State needed for authentication
#[derive(Clone)]
pub struct AuthState {
    pub jwt_manager: JwtManager,
}

fn extract_bearer_token(request: &Request) -> Option<&str> {
    request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|header| header.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

fn authenticate(auth_state: &AuthState, request: &Request) -> Result<AuthUser, AuthError> {
    let token = extract_bearer_token(request).ok_or(AuthError::MissingAuth)?;
    let claims = auth_state
        .jwt_manager
        .validate_access_token(token)
        .map_err(|e| {
            tracing::debug!(error = %e, "Bearer token rejected");
            AuthError::InvalidToken
        })?;
    Ok(AuthUser {
        user_id: claims.sub,
        role: claims.role,
    })
}

/// Middleware that requires authentication
pub async fn require_auth(
    State(auth_state): State<AuthState>,
    mut request: Request,
    next: Next,
) -> Response {
    match authenticate(&auth_state, &request) {
        Ok(auth_user) => {
            tracing::debug!(
                path = %request.uri().path(),
                user_id = %auth_user.user_id,
                role = %auth_user.role,
                "require_auth: authentication successful"
            );
            request.extensions_mut().insert(auth_user);
            next.run(request).await
        }
        Err(err) => {
            tracing::info!(path = %request.uri().path(), error = %err, "require_auth: authentication failed");
            err.into_response()
        }
    }
}

/// Middleware that requires an admin token
pub async fn require_admin(
    State(auth_state): State<AuthState>,
    mut request: Request,
    next: Next,
) -> Response {
    match authenticate(&auth_state, &request) {
        Ok(auth_user) if auth_user.is_admin() => {
            request.extensions_mut().insert(auth_user);
            next.run(request).await
        }
        Ok(auth_user) => {
            tracing::warn!(
                path = %request.uri().path(),
                user_id = %auth_user.user_id,
                "require_admin: non-admin denied"
            );
            AuthError::InsufficientPermissions.into_response()
        }
        Err(err) => {
            tracing::info!(path = %request.uri().path(), error = %err, "require_admin: authentication failed");
            // Admin routes answer 403 for any auth failure
            AuthError::InsufficientPermissions.into_response()
        }
    }
}

/// Middleware that optionally authenticates (for public endpoints that benefit from auth)
///
/// An invalid token is treated as anonymous rather than rejected.
pub async fn optional_auth(
    State(auth_state): State<AuthState>,
    mut request: Request,
    next: Next,
) -> Response {
    let viewer = authenticate(&auth_state, &request).ok();
    request.extensions_mut().insert(Viewer(viewer));
    next.run(request).await
}

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Missing authentication")]
    MissingAuth,
    #[error("Invalid or expired token")]
    InvalidToken,
    #[error("Insufficient permissions")]
    InsufficientPermissions,
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let (status, code) = match self {
            AuthError::MissingAuth => (StatusCode::UNAUTHORIZED, "unauthenticated"),
            AuthError::InvalidToken => (StatusCode::UNAUTHORIZED, "invalid_token"),
            AuthError::InsufficientPermissions => (StatusCode::FORBIDDEN, "forbidden"),
        };

        let body = Json(json!({
            "success": false,
            "error": self.to_string(),
            "code": code,
        }));

        (status, body).into_response()
    }
}
