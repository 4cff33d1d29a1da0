//! Persistence seams
//!
//! Services talk to storage only through these traits. Every method that
//! touches subscription columns is a single conditional write on the store
//! side; nothing here does read-modify-write from the client.

mod memory;
mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

use async_trait::async_trait;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::content::{GameResult, Slip, SlipQuery};
use crate::error::SubscriptionResult;
use crate::ledger::{RequestStatus, SubscriptionRequest};
use crate::state::{NewAccount, UserAccount};

/// Subscription columns to write on the approved account
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountGrant {
    pub account_id: Uuid,
    pub plan: String,
    pub expires_at: OffsetDateTime,
}

/// Everything an approval commits, applied all-or-nothing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApprovalCommit {
    pub request_id: Uuid,
    pub resolved_by: Option<Uuid>,
    pub resolved_at: OffsetDateTime,
    /// None when the request is resolved without a matching account
    pub grant: Option<AccountGrant>,
}

#[async_trait]
pub trait AccountStore: Send + Sync {
    async fn insert_account(
        &self,
        account: NewAccount,
        now: OffsetDateTime,
    ) -> SubscriptionResult<UserAccount>;

    async fn find_account(&self, id: Uuid) -> SubscriptionResult<Option<UserAccount>>;

    async fn find_account_by_email(&self, email: &str)
        -> SubscriptionResult<Option<UserAccount>>;

    /// Oldest first
    async fn list_accounts(&self) -> SubscriptionResult<Vec<UserAccount>>;

    /// Demote every premium account whose deadline is strictly before `now`,
    /// in one bulk conditional update. Returns the number of rows changed.
    async fn demote_expired(&self, now: OffsetDateTime) -> SubscriptionResult<u64>;
}

#[async_trait]
pub trait RequestStore: Send + Sync {
    async fn insert_request(&self, request: &SubscriptionRequest) -> SubscriptionResult<()>;

    async fn find_request(&self, id: Uuid) -> SubscriptionResult<Option<SubscriptionRequest>>;

    /// Newest first, optionally filtered by status
    async fn list_requests(
        &self,
        status: Option<RequestStatus>,
    ) -> SubscriptionResult<Vec<SubscriptionRequest>>;

    /// Claim the request (pending -> approved) and apply the grant atomically.
    ///
    /// Returns `false`, writing nothing, when the request was no longer
    /// pending at commit time.
    async fn commit_approval(&self, commit: &ApprovalCommit) -> SubscriptionResult<bool>;

    /// pending -> rejected. Returns `false` if the request wasn't pending.
    async fn reject_request(
        &self,
        id: Uuid,
        resolved_by: Option<Uuid>,
        now: OffsetDateTime,
    ) -> SubscriptionResult<bool>;
}

#[async_trait]
pub trait SlipStore: Send + Sync {
    async fn insert_slip(&self, slip: &Slip) -> SubscriptionResult<()>;

    async fn find_slip(&self, id: Uuid) -> SubscriptionResult<Option<Slip>>;

    /// One page sorted by date descending, plus the total matching the filter
    async fn list_slips(&self, query: &SlipQuery) -> SubscriptionResult<(Vec<Slip>, u64)>;

    /// Fails with `SlipNotFound` or `GameNotFound`
    async fn set_game_result(
        &self,
        slip_id: Uuid,
        game_index: usize,
        result: GameResult,
    ) -> SubscriptionResult<()>;
}

/// Everything the engine needs from a backend
pub trait Store: AccountStore + RequestStore + SlipStore {}

impl<T: AccountStore + RequestStore + SlipStore> Store for T {}
