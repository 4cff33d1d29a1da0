//! Unit tests for authentication middleware
//!
//! Tests cover:
//! - Bearer extraction (missing, malformed, expired, forged)
//! - Role-based access control on admin routes
//! - Anonymous fallback for optional auth

#[cfg(test)]
mod tests {
    use super::super::jwt::JwtManager;
    use super::super::middleware::*;
    use axum::{
        body::Body,
        http::{header::AUTHORIZATION, Request, StatusCode},
        middleware::from_fn_with_state,
        routing::get,
        Extension, Router,
    };
    use time::{Duration, OffsetDateTime};
    use tipline_shared::Role;
    use tower::ServiceExt;
    use uuid::Uuid;

    const SECRET: &str = "test-jwt-secret-key-for-testing-only";

    fn auth_state() -> AuthState {
        AuthState {
            jwt_manager: JwtManager::new(SECRET, 24),
        }
    }

    fn token(role: Role) -> String {
        auth_state()
            .jwt_manager
            .generate_access_token(Uuid::new_v4(), role, OffsetDateTime::now_utc())
            .unwrap()
    }

    fn app() -> Router {
        let state = auth_state();
        let protected = Router::new()
            .route(
                "/me",
                get(|Extension(user): Extension<AuthUser>| async move { user.role.to_string() }),
            )
            .layer(from_fn_with_state(state.clone(), require_auth));
        let admin = Router::new()
            .route("/admin", get(|| async { "ok" }))
            .layer(from_fn_with_state(state.clone(), require_admin));
        let public = Router::new()
            .route(
                "/public",
                get(|Extension(viewer): Extension<Viewer>| async move {
                    match viewer.0 {
                        Some(user) => user.role.to_string(),
                        None => "anonymous".to_string(),
                    }
                }),
            )
            .layer(from_fn_with_state(state, optional_auth));
        protected.merge(admin).merge(public)
    }

    async fn call(path: &str, bearer: Option<&str>) -> (StatusCode, String) {
        let mut request = Request::builder().uri(path);
        if let Some(bearer) = bearer {
            request = request.header(AUTHORIZATION, format!("Bearer {bearer}"));
        }
        let response = app()
            .oneshot(request.body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, String::from_utf8(body.to_vec()).unwrap())
    }

    #[tokio::test]
    async fn test_require_auth_without_token() {
        let (status, body) = call("/me", None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert!(body.contains("\"success\":false"));
    }

    #[tokio::test]
    async fn test_require_auth_with_valid_token() {
        let (status, body) = call("/me", Some(&token(Role::User))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "user");
    }

    #[tokio::test]
    async fn test_require_auth_rejects_expired_and_forged_tokens() {
        let expired = auth_state()
            .jwt_manager
            .generate_access_token(
                Uuid::new_v4(),
                Role::User,
                OffsetDateTime::now_utc() - Duration::days(3),
            )
            .unwrap();
        assert_eq!(call("/me", Some(&expired)).await.0, StatusCode::UNAUTHORIZED);

        let forged = JwtManager::new("some-other-secret-entirely-for-tests", 24)
            .generate_access_token(Uuid::new_v4(), Role::Admin, OffsetDateTime::now_utc())
            .unwrap();
        assert_eq!(call("/me", Some(&forged)).await.0, StatusCode::UNAUTHORIZED);
        assert_eq!(call("/me", Some("garbage")).await.0, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_require_admin() {
        assert_eq!(call("/admin", None).await.0, StatusCode::FORBIDDEN);
        assert_eq!(
            call("/admin", Some(&token(Role::User))).await.0,
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            call("/admin", Some(&token(Role::Admin))).await.0,
            StatusCode::OK
        );
    }

    #[tokio::test]
    async fn test_optional_auth_falls_back_to_anonymous() {
        assert_eq!(call("/public", None).await.1, "anonymous");
        assert_eq!(call("/public", Some("garbage")).await.1, "anonymous");
        assert_eq!(call("/public", Some(&token(Role::Admin))).await.1, "admin");
    }
}
