//! Slip listing (gated) and admin slip management

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Extension, Json,
};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tipline_shared::AccessTier;
use tipline_subscriptions::{Game, GameResult, NewSlip, Slip, SlipQuery, SlipView};
use uuid::Uuid;

use crate::{auth::Viewer, error::ApiResult, state::AppState};

#[derive(Debug, Deserialize)]
pub struct ListSlipsQuery {
    pub date: Option<String>,
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSlipBody {
    pub date: String,
    #[serde(default)]
    pub access: AccessTier,
    pub total_odds: f64,
    pub games: Vec<Game>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameResultBody {
    pub game_index: usize,
    pub result: GameResult,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SlipDto {
    pub id: Uuid,
    pub date: String,
    pub access: AccessTier,
    pub total_odds: f64,
    /// True when the viewer may not see the games
    pub locked: bool,
    pub games: Vec<Game>,
}

impl From<SlipView> for SlipDto {
    fn from(view: SlipView) -> Self {
        Self {
            id: view.id,
            date: view.date,
            access: view.access,
            total_odds: view.total_odds,
            locked: view.locked,
            games: view.games,
        }
    }
}

impl From<Slip> for SlipDto {
    fn from(slip: Slip) -> Self {
        Self {
            id: slip.id,
            date: slip.date,
            access: slip.access,
            total_odds: slip.total_odds,
            locked: false,
            games: slip.games,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct SlipListResponse {
    pub success: bool,
    pub slips: Vec<SlipDto>,
    pub total: u64,
    pub page: u32,
    pub pages: u64,
}

#[derive(Debug, Serialize)]
pub struct SlipResponse {
    pub success: bool,
    pub slip: SlipDto,
}

/// GET /slips?date=&page=&limit=
pub async fn list_slips(
    State(state): State<AppState>,
    Extension(viewer): Extension<Viewer>,
    Query(params): Query<ListSlipsQuery>,
) -> ApiResult<Json<SlipListResponse>> {
    let query = SlipQuery::new(params.date, params.page, params.limit);
    let page = state
        .engine
        .content
        .list_slips(
            viewer.0.map(|u| u.user_id),
            &query,
            OffsetDateTime::now_utc(),
        )
        .await?;

    Ok(Json(SlipListResponse {
        success: true,
        slips: page.slips.into_iter().map(SlipDto::from).collect(),
        total: page.total,
        page: page.page,
        pages: page.pages,
    }))
}

/// POST /admin/slips
pub async fn create_slip(
    State(state): State<AppState>,
    Json(body): Json<CreateSlipBody>,
) -> ApiResult<(StatusCode, Json<SlipResponse>)> {
    let slip = state
        .engine
        .content
        .create_slip(
            NewSlip {
                date: body.date,
                access: body.access,
                total_odds: body.total_odds,
                games: body.games,
            },
            OffsetDateTime::now_utc(),
        )
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(SlipResponse {
            success: true,
            slip: slip.into(),
        }),
    ))
}

/// POST /admin/slips/{id}/result
pub async fn set_game_result(
    State(state): State<AppState>,
    Path(slip_id): Path<Uuid>,
    Json(body): Json<GameResultBody>,
) -> ApiResult<Json<SlipResponse>> {
    let slip = state
        .engine
        .content
        .set_game_result(slip_id, body.game_index, body.result)
        .await?;

    Ok(Json(SlipResponse {
        success: true,
        slip: slip.into(),
    }))
}
