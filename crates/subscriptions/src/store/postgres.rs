//! Postgres store

use async_trait::async_trait;
use sqlx::types::Json;
use sqlx::{FromRow, PgPool};
use time::OffsetDateTime;
use uuid::Uuid;

use super::{AccountStore, ApprovalCommit, RequestStore, SlipStore};
use crate::content::{Game, GameResult, Slip, SlipQuery};
use crate::error::{SubscriptionError, SubscriptionResult};
use crate::ledger::{RequestStatus, SubscriptionRequest};
use crate::state::{NewAccount, SubscriptionRecord, UserAccount};

const ACCOUNT_COLUMNS: &str = r#"
    id, email, password_hash, role, plan, premium, expires_at,
    subscription_version, created_at
"#;

const REQUEST_COLUMNS: &str = r#"
    id, email, plan, phone, message, status, created_at, resolved_at, resolved_by
"#;

/// Row type for users
#[derive(Debug, FromRow)]
struct AccountRow {
    id: Uuid,
    email: String,
    password_hash: String,
    role: String,
    plan: Option<String>,
    premium: bool,
    expires_at: Option<OffsetDateTime>,
    subscription_version: i64,
    created_at: OffsetDateTime,
}

impl TryFrom<AccountRow> for UserAccount {
    type Error = SubscriptionError;

    fn try_from(row: AccountRow) -> Result<Self, Self::Error> {
        let role = row.role.parse().map_err(|e| {
            SubscriptionError::StoreUnavailable(format!("corrupt users row {}: {e}", row.id))
        })?;
        Ok(UserAccount {
            id: row.id,
            email: row.email,
            password_hash: row.password_hash,
            role,
            subscription: SubscriptionRecord {
                plan: row.plan,
                premium: row.premium,
                expires_at: row.expires_at,
                version: row.subscription_version,
            },
            created_at: row.created_at,
        })
    }
}

/// Row type for subscription_requests
#[derive(Debug, FromRow)]
struct RequestRow {
    id: Uuid,
    email: String,
    plan: String,
    phone: Option<String>,
    message: Option<String>,
    status: String,
    created_at: OffsetDateTime,
    resolved_at: Option<OffsetDateTime>,
    resolved_by: Option<Uuid>,
}

impl TryFrom<RequestRow> for SubscriptionRequest {
    type Error = SubscriptionError;

    fn try_from(row: RequestRow) -> Result<Self, Self::Error> {
        Ok(SubscriptionRequest {
            id: row.id,
            email: row.email,
            plan: row.plan,
            phone: row.phone,
            message: row.message,
            status: row.status.parse()?,
            created_at: row.created_at,
            resolved_at: row.resolved_at,
            resolved_by: row.resolved_by,
        })
    }
}

/// Row type for slips
#[derive(Debug, FromRow)]
struct SlipRow {
    id: Uuid,
    date: String,
    access: String,
    total_odds: f64,
    games: Json<Vec<Game>>,
    created_at: OffsetDateTime,
}

impl TryFrom<SlipRow> for Slip {
    type Error = SubscriptionError;

    fn try_from(row: SlipRow) -> Result<Self, Self::Error> {
        let access = row.access.parse().map_err(|e| {
            SubscriptionError::StoreUnavailable(format!("corrupt slips row {}: {e}", row.id))
        })?;
        Ok(Slip {
            id: row.id,
            date: row.date,
            access,
            total_odds: row.total_odds,
            games: row.games.0,
            created_at: row.created_at,
        })
    }
}

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AccountStore for PgStore {
    async fn insert_account(
        &self,
        account: NewAccount,
        now: OffsetDateTime,
    ) -> SubscriptionResult<UserAccount> {
        let row: AccountRow = sqlx::query_as(&format!(
            r#"
            INSERT INTO users (id, email, password_hash, role, created_at)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING {ACCOUNT_COLUMNS}
            "#
        ))
        .bind(Uuid::new_v4())
        .bind(&account.email)
        .bind(&account.password_hash)
        .bind(account.role.as_str())
        .bind(now)
        .fetch_one(&self.pool)
        .await?;

        row.try_into()
    }

    async fn find_account(&self, id: Uuid) -> SubscriptionResult<Option<UserAccount>> {
        let row: Option<AccountRow> =
            sqlx::query_as(&format!("SELECT {ACCOUNT_COLUMNS} FROM users WHERE id = $1"))
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;

        row.map(UserAccount::try_from).transpose()
    }

    async fn find_account_by_email(
        &self,
        email: &str,
    ) -> SubscriptionResult<Option<UserAccount>> {
        let row: Option<AccountRow> = sqlx::query_as(&format!(
            "SELECT {ACCOUNT_COLUMNS} FROM users WHERE email = $1"
        ))
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;

        row.map(UserAccount::try_from).transpose()
    }

    async fn list_accounts(&self) -> SubscriptionResult<Vec<UserAccount>> {
        let rows: Vec<AccountRow> = sqlx::query_as(&format!(
            "SELECT {ACCOUNT_COLUMNS} FROM users ORDER BY created_at ASC"
        ))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(UserAccount::try_from).collect()
    }

    async fn demote_expired(&self, now: OffsetDateTime) -> SubscriptionResult<u64> {
        // Single statement: concurrent sweeps serialize on the row locks and
        // the second one finds nothing left to match.
        let result = sqlx::query(
            r#"
            UPDATE users
            SET premium = FALSE,
                plan = NULL,
                expires_at = NULL,
                subscription_version = subscription_version + 1
            WHERE premium = TRUE
              AND expires_at < $1
            "#,
        )
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }
}

#[async_trait]
impl RequestStore for PgStore {
    async fn insert_request(&self, request: &SubscriptionRequest) -> SubscriptionResult<()> {
        sqlx::query(
            r#"
            INSERT INTO subscription_requests (id, email, plan, phone, message, status, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(request.id)
        .bind(&request.email)
        .bind(&request.plan)
        .bind(&request.phone)
        .bind(&request.message)
        .bind(request.status.as_str())
        .bind(request.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn find_request(&self, id: Uuid) -> SubscriptionResult<Option<SubscriptionRequest>> {
        let row: Option<RequestRow> = sqlx::query_as(&format!(
            "SELECT {REQUEST_COLUMNS} FROM subscription_requests WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(SubscriptionRequest::try_from).transpose()
    }

    async fn list_requests(
        &self,
        status: Option<RequestStatus>,
    ) -> SubscriptionResult<Vec<SubscriptionRequest>> {
        let rows: Vec<RequestRow> = sqlx::query_as(&format!(
            r#"
            SELECT {REQUEST_COLUMNS}
            FROM subscription_requests
            WHERE ($1::TEXT IS NULL OR status = $1)
            ORDER BY created_at DESC
            "#
        ))
        .bind(status.map(|s| s.as_str()))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(SubscriptionRequest::try_from).collect()
    }

    async fn commit_approval(&self, commit: &ApprovalCommit) -> SubscriptionResult<bool> {
        let mut tx = self.pool.begin().await?;

        // ATOMIC CLAIM: only one approval can move the request out of pending.
        // The row lock taken here also serializes racing approvals until commit.
        let claimed = sqlx::query(
            r#"
            UPDATE subscription_requests
            SET status = 'approved',
                resolved_at = $2,
                resolved_by = $3
            WHERE id = $1
              AND status = 'pending'
            "#,
        )
        .bind(commit.request_id)
        .bind(commit.resolved_at)
        .bind(commit.resolved_by)
        .execute(&mut *tx)
        .await?;

        if claimed.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(false);
        }

        if let Some(grant) = &commit.grant {
            let updated = sqlx::query(
                r#"
                UPDATE users
                SET plan = $2,
                    premium = TRUE,
                    expires_at = $3,
                    subscription_version = subscription_version + 1
                WHERE id = $1
                "#,
            )
            .bind(grant.account_id)
            .bind(&grant.plan)
            .bind(grant.expires_at)
            .execute(&mut *tx)
            .await?;

            if updated.rows_affected() == 0 {
                tx.rollback().await?;
                return Err(SubscriptionError::AccountNotFound(
                    grant.account_id.to_string(),
                ));
            }
        }

        tx.commit().await?;
        Ok(true)
    }

    async fn reject_request(
        &self,
        id: Uuid,
        resolved_by: Option<Uuid>,
        now: OffsetDateTime,
    ) -> SubscriptionResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE subscription_requests
            SET status = 'rejected',
                resolved_at = $2,
                resolved_by = $3
            WHERE id = $1
              AND status = 'pending'
            "#,
        )
        .bind(id)
        .bind(now)
        .bind(resolved_by)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl SlipStore for PgStore {
    async fn insert_slip(&self, slip: &Slip) -> SubscriptionResult<()> {
        sqlx::query(
            r#"
            INSERT INTO slips (id, date, access, total_odds, games, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(slip.id)
        .bind(&slip.date)
        .bind(slip.access.as_str())
        .bind(slip.total_odds)
        .bind(Json(&slip.games))
        .bind(slip.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn find_slip(&self, id: Uuid) -> SubscriptionResult<Option<Slip>> {
        let row: Option<SlipRow> = sqlx::query_as(
            "SELECT id, date, access, total_odds, games, created_at FROM slips WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Slip::try_from).transpose()
    }

    async fn list_slips(&self, query: &SlipQuery) -> SubscriptionResult<(Vec<Slip>, u64)> {
        let total: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM slips WHERE ($1::TEXT IS NULL OR date = $1)")
                .bind(&query.date)
                .fetch_one(&self.pool)
                .await?;

        let rows: Vec<SlipRow> = sqlx::query_as(
            r#"
            SELECT id, date, access, total_odds, games, created_at
            FROM slips
            WHERE ($1::TEXT IS NULL OR date = $1)
            ORDER BY date DESC, created_at DESC
            LIMIT $2 OFFSET $3
            "#,
        )
        .bind(&query.date)
        .bind(i64::from(query.limit))
        .bind(i64::try_from(query.offset()).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await?;

        let slips = rows
            .into_iter()
            .map(Slip::try_from)
            .collect::<SubscriptionResult<Vec<_>>>()?;
        Ok((slips, u64::try_from(total).unwrap_or(0)))
    }

    async fn set_game_result(
        &self,
        slip_id: Uuid,
        game_index: usize,
        result: GameResult,
    ) -> SubscriptionResult<()> {
        let not_found = SubscriptionError::GameNotFound {
            slip_id,
            index: game_index,
        };
        let index = i32::try_from(game_index).map_err(|_| not_found)?;

        // In place: concurrent results on other games of the slip are kept
        let updated = sqlx::query(
            r#"
            UPDATE slips
            SET games = jsonb_set(games, ARRAY[$2::INT::TEXT, 'result'], to_jsonb($3::TEXT))
            WHERE id = $1
              AND jsonb_array_length(games) > $2::INT
            "#,
        )
        .bind(slip_id)
        .bind(index)
        .bind(result.to_string())
        .execute(&self.pool)
        .await?;

        if updated.rows_affected() > 0 {
            return Ok(());
        }

        let exists: Option<(Uuid,)> = sqlx::query_as("SELECT id FROM slips WHERE id = $1")
            .bind(slip_id)
            .fetch_optional(&self.pool)
            .await?;

        match exists {
            Some(_) => Err(SubscriptionError::GameNotFound {
                slip_id,
                index: game_index,
            }),
            None => Err(SubscriptionError::SlipNotFound(slip_id)),
        }
    }
}
