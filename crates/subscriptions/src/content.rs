//! Prediction slips and gated listing

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tipline_shared::AccessTier;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::access::is_visible;
use crate::error::{SubscriptionError, SubscriptionResult};
use crate::store::Store;
use crate::sweeper::ExpirySweeper;

/// Slips with fewer combined odds than this are not worth publishing
pub const MIN_TOTAL_ODDS: f64 = 2.0;
pub const DEFAULT_PAGE_SIZE: u32 = 10;
pub const MAX_PAGE_SIZE: u32 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GameResult {
    #[default]
    Pending,
    Won,
    Lost,
    Void,
}

impl fmt::Display for GameResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            GameResult::Pending => "pending",
            GameResult::Won => "won",
            GameResult::Lost => "lost",
            GameResult::Void => "void",
        };
        f.write_str(s)
    }
}

impl FromStr for GameResult {
    type Err = SubscriptionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(GameResult::Pending),
            "won" => Ok(GameResult::Won),
            "lost" => Ok(GameResult::Lost),
            "void" => Ok(GameResult::Void),
            other => Err(SubscriptionError::InvalidInput(format!(
                "unknown game result '{other}'"
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Game {
    pub home: String,
    pub away: String,
    pub odd: f64,
    #[serde(default)]
    pub over_under: Option<String>,
    #[serde(default)]
    pub result: GameResult,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Slip {
    pub id: Uuid,
    pub date: String,
    pub access: AccessTier,
    pub total_odds: f64,
    pub games: Vec<Game>,
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Clone)]
pub struct NewSlip {
    pub date: String,
    pub access: AccessTier,
    pub total_odds: f64,
    pub games: Vec<Game>,
}

impl NewSlip {
    fn validate(&self) -> SubscriptionResult<()> {
        if self.date.trim().is_empty() {
            return Err(SubscriptionError::InvalidInput("date is required".into()));
        }
        if self.games.is_empty() {
            return Err(SubscriptionError::InvalidInput(
                "a slip needs at least one game".into(),
            ));
        }
        if self.total_odds.is_nan() || self.total_odds < MIN_TOTAL_ODDS {
            return Err(SubscriptionError::InvalidInput(format!(
                "total odds must be at least {MIN_TOTAL_ODDS}"
            )));
        }
        Ok(())
    }
}

/// Filter and pagination for listing. Pages are 1-based.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlipQuery {
    pub date: Option<String>,
    pub page: u32,
    pub limit: u32,
}

impl SlipQuery {
    pub fn new(date: Option<String>, page: Option<u32>, limit: Option<u32>) -> Self {
        Self {
            date: date.filter(|d| !d.is_empty()),
            page: page.unwrap_or(1).max(1),
            limit: limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE),
        }
    }

    pub fn offset(&self) -> u64 {
        u64::from(self.page - 1) * u64::from(self.limit)
    }
}

impl Default for SlipQuery {
    fn default() -> Self {
        Self::new(None, None, None)
    }
}

/// A slip as seen by one viewer. Locked slips keep their metadata but no games.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SlipView {
    pub id: Uuid,
    pub date: String,
    pub access: AccessTier,
    pub total_odds: f64,
    pub locked: bool,
    pub games: Vec<Game>,
}

impl SlipView {
    fn gated(slip: Slip, visible: bool) -> Self {
        Self {
            id: slip.id,
            date: slip.date,
            access: slip.access,
            total_odds: slip.total_odds,
            locked: !visible,
            games: if visible { slip.games } else { Vec::new() },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SlipPage {
    pub slips: Vec<SlipView>,
    pub total: u64,
    pub page: u32,
    pub pages: u64,
}

#[derive(Clone)]
pub struct ContentService {
    store: Arc<dyn Store>,
    sweeper: ExpirySweeper,
}

impl ContentService {
    pub fn new(store: Arc<dyn Store>, sweeper: ExpirySweeper) -> Self {
        Self { store, sweeper }
    }

    pub async fn create_slip(&self, slip: NewSlip, now: OffsetDateTime) -> SubscriptionResult<Slip> {
        slip.validate()?;

        let slip = Slip {
            id: Uuid::new_v4(),
            date: slip.date.trim().to_string(),
            access: slip.access,
            total_odds: slip.total_odds,
            games: slip.games,
            created_at: now,
        };
        self.store.insert_slip(&slip).await?;

        tracing::info!(
            slip_id = %slip.id,
            date = %slip.date,
            access = %slip.access,
            games = slip.games.len(),
            "Slip created"
        );
        Ok(slip)
    }

    /// List slips for `viewer` (None = anonymous).
    ///
    /// Expired subscriptions are swept first and the viewer's state is read
    /// fresh afterwards, so premium games are never shown on a lapsed plan
    /// unless the sweep itself failed.
    pub async fn list_slips(
        &self,
        viewer: Option<Uuid>,
        query: &SlipQuery,
        now: OffsetDateTime,
    ) -> SubscriptionResult<SlipPage> {
        self.sweeper.maybe_sweep(now).await;

        let state = match viewer {
            Some(id) => self.store.find_account(id).await?.map(|a| a.state()),
            None => None,
        };

        let (slips, total) = self.store.list_slips(query).await?;
        let slips = slips
            .into_iter()
            .map(|slip| {
                let visible = is_visible(slip.access, state.as_ref());
                SlipView::gated(slip, visible)
            })
            .collect();

        Ok(SlipPage {
            slips,
            total,
            page: query.page,
            pages: total.div_ceil(u64::from(query.limit)),
        })
    }

    pub async fn set_game_result(
        &self,
        slip_id: Uuid,
        game_index: usize,
        result: GameResult,
    ) -> SubscriptionResult<Slip> {
        self.store.set_game_result(slip_id, game_index, result).await?;

        tracing::info!(
            slip_id = %slip_id,
            game_index = game_index,
            result = %result,
            "Game result recorded"
        );

        self.store
            .find_slip(slip_id)
            .await?
            .ok_or(SubscriptionError::SlipNotFound(slip_id))
    }
}
