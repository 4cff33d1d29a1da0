//! Subscription state carried on a user account
//!
//! Accounts store three loose columns (`plan`, `premium`, `expires_at`). All
//! reasoning goes through [`SubscriptionState`], which only has two shapes:
//!
//! ```text
//! Free --approve(plan, now)--> ActiveUntil(plan, now + duration(plan))
//! ActiveUntil(t) --approve(plan, now)--> ActiveUntil(plan, now + duration(plan))
//! ActiveUntil(t) --sweep(now), t < now--> Free
//! ActiveUntil(t) --sweep(now), t >= now--> ActiveUntil(t)
//! ```
//!
//! The columns themselves are only written by the sweeper and the approval
//! workflow, through the store operations named for them.

use serde::Serialize;
use tipline_shared::Role;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::plan::{is_free_plan, plan_duration};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubscriptionState {
    Free,
    ActiveUntil {
        plan: String,
        expires_at: OffsetDateTime,
    },
}

impl SubscriptionState {
    /// Activate `plan` starting at `now`. Any existing window is replaced, not extended.
    pub fn approve(&self, plan: &str, now: OffsetDateTime) -> SubscriptionState {
        SubscriptionState::ActiveUntil {
            plan: plan.to_string(),
            expires_at: now + plan_duration(plan),
        }
    }

    /// Demote to free once the deadline has strictly passed
    pub fn sweep(self, now: OffsetDateTime) -> SubscriptionState {
        match self {
            SubscriptionState::ActiveUntil { expires_at, .. } if expires_at < now => {
                SubscriptionState::Free
            }
            other => other,
        }
    }

    pub fn is_premium(&self) -> bool {
        matches!(self, SubscriptionState::ActiveUntil { .. })
    }

    pub fn plan(&self) -> Option<&str> {
        match self {
            SubscriptionState::Free => None,
            SubscriptionState::ActiveUntil { plan, .. } => Some(plan),
        }
    }

    pub fn expires_at(&self) -> Option<OffsetDateTime> {
        match self {
            SubscriptionState::Free => None,
            SubscriptionState::ActiveUntil { expires_at, .. } => Some(*expires_at),
        }
    }
}

/// The persisted subscription columns of an account
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubscriptionRecord {
    pub plan: Option<String>,
    pub premium: bool,
    pub expires_at: Option<OffsetDateTime>,
    /// Bumped by every sweep demotion and every approval
    pub version: i64,
}

impl SubscriptionRecord {
    pub fn free() -> Self {
        Self {
            plan: None,
            premium: false,
            expires_at: None,
            version: 0,
        }
    }

    /// Interpret the columns. Rows that are neither cleanly free nor cleanly
    /// active (premium without a deadline, premium on the free plan) read as
    /// `Free`; the invariant checker reports them.
    pub fn state(&self) -> SubscriptionState {
        match (&self.plan, self.premium, self.expires_at) {
            (Some(plan), true, Some(expires_at)) if !is_free_plan(Some(plan)) => {
                SubscriptionState::ActiveUntil {
                    plan: plan.clone(),
                    expires_at,
                }
            }
            _ => SubscriptionState::Free,
        }
    }

    /// Columns for `state`, one version past this record
    pub fn advance(&self, state: &SubscriptionState) -> SubscriptionRecord {
        SubscriptionRecord {
            plan: state.plan().map(str::to_string),
            premium: state.is_premium(),
            expires_at: state.expires_at(),
            version: self.version + 1,
        }
    }
}

impl Default for SubscriptionRecord {
    fn default() -> Self {
        Self::free()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct UserAccount {
    pub id: Uuid,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub role: Role,
    pub subscription: SubscriptionRecord,
    pub created_at: OffsetDateTime,
}

impl UserAccount {
    pub fn state(&self) -> SubscriptionState {
        self.subscription.state()
    }

    pub fn is_premium(&self) -> bool {
        self.state().is_premium()
    }
}

/// Input for creating an account. New accounts always start free.
#[derive(Debug, Clone)]
pub struct NewAccount {
    pub email: String,
    pub password_hash: String,
    pub role: Role,
}
