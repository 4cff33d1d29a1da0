// Test code patterns (expected in test files):
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! Tipline Subscription Engine
//!
//! Manual-approval premium subscriptions for a tip distribution service.
//!
//! ## Features
//!
//! - **Request Ledger**: Users ask for a plan; requests wait for an admin
//! - **Approval Workflow**: Idempotent approve/reject with an atomic claim
//! - **Expiry Sweep**: Lazy, bulk demotion of lapsed premium accounts
//! - **Access Gate**: Premium slips are only shown to premium accounts
//! - **Invariants**: Read-only consistency checks over subscription columns
//!
//! All operations take `now` explicitly; nothing in this crate reads the
//! wall clock except the periodic sweep loop.

pub mod access;
pub mod accounts;
pub mod approval;
pub mod content;
pub mod error;
pub mod invariants;
pub mod ledger;
pub mod plan;
pub mod state;
pub mod store;
pub mod sweeper;

#[cfg(test)]
mod edge_case_tests;

use std::sync::Arc;
use std::time::Duration;

// Access
pub use access::is_visible;

// Accounts
pub use accounts::{normalize_email, AccountService};

// Approval
pub use approval::{ApprovalOutcome, ApprovalWorkflow, MissingAccountPolicy};

// Content
pub use content::{
    ContentService, Game, GameResult, NewSlip, Slip, SlipPage, SlipQuery, SlipView,
};

// Error
pub use error::{ErrorKind, SubscriptionError, SubscriptionResult};

// Invariants
pub use invariants::{
    InvariantCheckSummary, InvariantChecker, InvariantViolation, ViolationSeverity,
};

// Ledger
pub use ledger::{NewSubscriptionRequest, RequestLedger, RequestStatus, SubscriptionRequest};

// Plans and state
pub use plan::{plan_duration, Plan};
pub use state::{NewAccount, SubscriptionRecord, SubscriptionState, UserAccount};

// Store
pub use store::{MemoryStore, PgStore, Store};

// Sweeper
pub use sweeper::{ExpirySweeper, DEFAULT_SWEEP_TIMEOUT};

/// Runtime knobs for the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineConfig {
    /// Upper bound on the inline sweep before a read proceeds without it
    pub sweep_timeout: Duration,
    pub missing_account_policy: MissingAccountPolicy,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            sweep_timeout: DEFAULT_SWEEP_TIMEOUT,
            missing_account_policy: MissingAccountPolicy::default(),
        }
    }
}

/// Every service wired to one shared store
#[derive(Clone)]
pub struct SubscriptionEngine {
    pub ledger: RequestLedger,
    pub approvals: ApprovalWorkflow,
    pub sweeper: ExpirySweeper,
    pub content: ContentService,
    pub accounts: AccountService,
    pub invariants: InvariantChecker,
}

impl SubscriptionEngine {
    pub fn new(store: Arc<dyn Store>, config: EngineConfig) -> Self {
        let sweeper = ExpirySweeper::new(store.clone(), config.sweep_timeout);
        Self {
            ledger: RequestLedger::new(store.clone()),
            approvals: ApprovalWorkflow::new(store.clone(), config.missing_account_policy),
            content: ContentService::new(store.clone(), sweeper.clone()),
            accounts: AccountService::new(store.clone(), sweeper.clone()),
            invariants: InvariantChecker::new(store),
            sweeper,
        }
    }

    /// Engine backed by Postgres
    pub fn from_pool(pool: sqlx::PgPool, config: EngineConfig) -> Self {
        Self::new(Arc::new(PgStore::new(pool)), config)
    }
}
