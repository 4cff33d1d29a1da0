//! In-memory store for tests and local development

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use time::OffsetDateTime;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{AccountStore, ApprovalCommit, RequestStore, SlipStore};
use crate::content::{GameResult, Slip, SlipQuery};
use crate::error::{SubscriptionError, SubscriptionResult};
use crate::ledger::{RequestStatus, SubscriptionRequest};
use crate::state::{NewAccount, SubscriptionRecord, SubscriptionState, UserAccount};

#[derive(Default)]
struct Tables {
    accounts: HashMap<Uuid, UserAccount>,
    requests: HashMap<Uuid, SubscriptionRequest>,
    slips: HashMap<Uuid, Slip>,
}

/// Store backed by maps behind one `RwLock`.
///
/// Each operation holds the write lock for its whole duration, which gives
/// the same per-operation atomicity Postgres gives per statement/transaction.
#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
    unavailable: AtomicBool,
    sweep_latency_ms: AtomicU64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every operation fail with `StoreUnavailable` until switched back
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Delay applied to `demote_expired`, for exercising sweep timeouts
    pub fn set_sweep_latency(&self, latency: Duration) {
        let millis = u64::try_from(latency.as_millis()).unwrap_or(u64::MAX);
        self.sweep_latency_ms.store(millis, Ordering::SeqCst);
    }

    /// Overwrite an account's subscription columns directly.
    ///
    /// Test fixture only: production code changes these columns through
    /// `demote_expired` and `commit_approval`.
    pub async fn seed_subscription(
        &self,
        account_id: Uuid,
        record: SubscriptionRecord,
    ) -> SubscriptionResult<()> {
        let mut tables = self.tables.write().await;
        let account = tables
            .accounts
            .get_mut(&account_id)
            .ok_or_else(|| SubscriptionError::AccountNotFound(account_id.to_string()))?;
        account.subscription = record;
        Ok(())
    }

    fn check_available(&self) -> SubscriptionResult<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(SubscriptionError::StoreUnavailable(
                "memory store marked unavailable".into(),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl AccountStore for MemoryStore {
    async fn insert_account(
        &self,
        account: NewAccount,
        now: OffsetDateTime,
    ) -> SubscriptionResult<UserAccount> {
        self.check_available()?;
        let mut tables = self.tables.write().await;
        if tables.accounts.values().any(|a| a.email == account.email) {
            return Err(SubscriptionError::EmailTaken);
        }

        let created = UserAccount {
            id: Uuid::new_v4(),
            email: account.email,
            password_hash: account.password_hash,
            role: account.role,
            subscription: SubscriptionRecord::free(),
            created_at: now,
        };
        tables.accounts.insert(created.id, created.clone());
        Ok(created)
    }

    async fn find_account(&self, id: Uuid) -> SubscriptionResult<Option<UserAccount>> {
        self.check_available()?;
        Ok(self.tables.read().await.accounts.get(&id).cloned())
    }

    async fn find_account_by_email(
        &self,
        email: &str,
    ) -> SubscriptionResult<Option<UserAccount>> {
        self.check_available()?;
        Ok(self
            .tables
            .read()
            .await
            .accounts
            .values()
            .find(|a| a.email == email)
            .cloned())
    }

    async fn list_accounts(&self) -> SubscriptionResult<Vec<UserAccount>> {
        self.check_available()?;
        let mut accounts: Vec<UserAccount> =
            self.tables.read().await.accounts.values().cloned().collect();
        accounts.sort_by_key(|a| a.created_at);
        Ok(accounts)
    }

    async fn demote_expired(&self, now: OffsetDateTime) -> SubscriptionResult<u64> {
        self.check_available()?;
        let latency = self.sweep_latency_ms.load(Ordering::SeqCst);
        if latency > 0 {
            tokio::time::sleep(Duration::from_millis(latency)).await;
        }

        let mut tables = self.tables.write().await;
        let mut demoted = 0;
        for account in tables.accounts.values_mut() {
            let record = &account.subscription;
            if record.premium && record.expires_at.is_some_and(|t| t < now) {
                account.subscription = record.advance(&SubscriptionState::Free);
                demoted += 1;
            }
        }
        Ok(demoted)
    }
}

#[async_trait]
impl RequestStore for MemoryStore {
    async fn insert_request(&self, request: &SubscriptionRequest) -> SubscriptionResult<()> {
        self.check_available()?;
        self.tables
            .write()
            .await
            .requests
            .insert(request.id, request.clone());
        Ok(())
    }

    async fn find_request(&self, id: Uuid) -> SubscriptionResult<Option<SubscriptionRequest>> {
        self.check_available()?;
        Ok(self.tables.read().await.requests.get(&id).cloned())
    }

    async fn list_requests(
        &self,
        status: Option<RequestStatus>,
    ) -> SubscriptionResult<Vec<SubscriptionRequest>> {
        self.check_available()?;
        let mut requests: Vec<SubscriptionRequest> = self
            .tables
            .read()
            .await
            .requests
            .values()
            .filter(|r| status.map_or(true, |s| r.status == s))
            .cloned()
            .collect();
        requests.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(requests)
    }

    async fn commit_approval(&self, commit: &ApprovalCommit) -> SubscriptionResult<bool> {
        self.check_available()?;
        let mut tables = self.tables.write().await;

        match tables.requests.get(&commit.request_id) {
            Some(r) if r.status == RequestStatus::Pending => {}
            _ => return Ok(false),
        }

        if let Some(grant) = &commit.grant {
            let account = tables
                .accounts
                .get_mut(&grant.account_id)
                .ok_or_else(|| SubscriptionError::AccountNotFound(grant.account_id.to_string()))?;
            account.subscription = account
                .subscription
                .advance(&SubscriptionState::ActiveUntil {
                    plan: grant.plan.clone(),
                    expires_at: grant.expires_at,
                });
        }

        if let Some(request) = tables.requests.get_mut(&commit.request_id) {
            request.status = RequestStatus::Approved;
            request.resolved_at = Some(commit.resolved_at);
            request.resolved_by = commit.resolved_by;
        }
        Ok(true)
    }

    async fn reject_request(
        &self,
        id: Uuid,
        resolved_by: Option<Uuid>,
        now: OffsetDateTime,
    ) -> SubscriptionResult<bool> {
        self.check_available()?;
        let mut tables = self.tables.write().await;
        match tables.requests.get_mut(&id) {
            Some(request) if request.status == RequestStatus::Pending => {
                request.status = RequestStatus::Rejected;
                request.resolved_at = Some(now);
                request.resolved_by = resolved_by;
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

#[async_trait]
impl SlipStore for MemoryStore {
    async fn insert_slip(&self, slip: &Slip) -> SubscriptionResult<()> {
        self.check_available()?;
        self.tables.write().await.slips.insert(slip.id, slip.clone());
        Ok(())
    }

    async fn find_slip(&self, id: Uuid) -> SubscriptionResult<Option<Slip>> {
        self.check_available()?;
        Ok(self.tables.read().await.slips.get(&id).cloned())
    }

    async fn list_slips(&self, query: &SlipQuery) -> SubscriptionResult<(Vec<Slip>, u64)> {
        self.check_available()?;
        let tables = self.tables.read().await;
        let mut matching: Vec<&Slip> = tables
            .slips
            .values()
            .filter(|s| query.date.as_ref().map_or(true, |d| &s.date == d))
            .collect();
        matching.sort_by(|a, b| {
            b.date
                .cmp(&a.date)
                .then_with(|| b.created_at.cmp(&a.created_at))
        });

        let total = matching.len() as u64;
        let offset = usize::try_from(query.offset()).unwrap_or(usize::MAX);
        let page = matching
            .into_iter()
            .skip(offset)
            .take(query.limit as usize)
            .cloned()
            .collect();
        Ok((page, total))
    }

    async fn set_game_result(
        &self,
        slip_id: Uuid,
        game_index: usize,
        result: GameResult,
    ) -> SubscriptionResult<()> {
        self.check_available()?;
        let mut tables = self.tables.write().await;
        let slip = tables
            .slips
            .get_mut(&slip_id)
            .ok_or(SubscriptionError::SlipNotFound(slip_id))?;
        let game = slip
            .games
            .get_mut(game_index)
            .ok_or(SubscriptionError::GameNotFound {
                slip_id,
                index: game_index,
            })?;
        game.result = result;
        Ok(())
    }
}
