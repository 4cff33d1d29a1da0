//! Subscription request submission

use axum::{extract::State, http::StatusCode, Extension, Json};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tipline_subscriptions::{NewSubscriptionRequest, RequestStatus, SubscriptionRequest};
use uuid::Uuid;

use crate::{auth::AuthUser, error::ApiResult, state::AppState};

#[derive(Debug, Deserialize)]
pub struct SubmitRequestBody {
    pub plan: String,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestDto {
    pub id: Uuid,
    pub email: String,
    pub plan: String,
    pub phone: Option<String>,
    pub message: Option<String>,
    pub status: RequestStatus,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339::option")]
    pub resolved_at: Option<OffsetDateTime>,
    pub resolved_by: Option<Uuid>,
}

impl From<SubscriptionRequest> for RequestDto {
    fn from(r: SubscriptionRequest) -> Self {
        Self {
            id: r.id,
            email: r.email,
            plan: r.plan,
            phone: r.phone,
            message: r.message,
            status: r.status,
            created_at: r.created_at,
            resolved_at: r.resolved_at,
            resolved_by: r.resolved_by,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct RequestResponse {
    pub success: bool,
    pub request: RequestDto,
}

/// POST /subscription-requests
///
/// The request is filed under the caller's own email.
pub async fn submit_request(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Json(body): Json<SubmitRequestBody>,
) -> ApiResult<(StatusCode, Json<RequestResponse>)> {
    let now = OffsetDateTime::now_utc();
    let account = state.engine.accounts.get(user.user_id, now).await?;

    let request = state
        .engine
        .ledger
        .submit(
            NewSubscriptionRequest {
                email: account.email,
                plan: body.plan,
                phone: body.phone,
                message: body.message,
            },
            now,
        )
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(RequestResponse {
            success: true,
            request: request.into(),
        }),
    ))
}
