//! Approval workflow
//!
//! Turns a pending ledger entry into an active subscription on the
//! requesting account. Approving is safe to retry: a request can only leave
//! `pending` once, so a second call (or a racing one) gets `AlreadyResolved`
//! and leaves the account alone.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::error::{SubscriptionError, SubscriptionResult};
use crate::plan::is_free_plan;
use crate::state::SubscriptionState;
use crate::store::{AccountGrant, ApprovalCommit, Store};

/// What to do when no account matches the request's email
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissingAccountPolicy {
    /// Mark the request approved without granting anything
    #[default]
    ResolveWithoutGrant,
    /// Fail with `AccountNotFound` and leave the request pending
    Reject,
}

impl FromStr for MissingAccountPolicy {
    type Err = SubscriptionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "resolve" | "resolve_without_grant" => Ok(MissingAccountPolicy::ResolveWithoutGrant),
            "reject" => Ok(MissingAccountPolicy::Reject),
            other => Err(SubscriptionError::InvalidInput(format!(
                "unknown missing-account policy '{other}'"
            ))),
        }
    }
}

impl fmt::Display for MissingAccountPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MissingAccountPolicy::ResolveWithoutGrant => f.write_str("resolve"),
            MissingAccountPolicy::Reject => f.write_str("reject"),
        }
    }
}

/// Result of a successful approval
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ApprovalOutcome {
    pub request_id: Uuid,
    /// None when the request was resolved without a matching account
    pub account_id: Option<Uuid>,
    pub plan: String,
    pub expires_at: Option<OffsetDateTime>,
}

#[derive(Clone)]
pub struct ApprovalWorkflow {
    store: Arc<dyn Store>,
    missing_account: MissingAccountPolicy,
}

impl ApprovalWorkflow {
    pub fn new(store: Arc<dyn Store>, missing_account: MissingAccountPolicy) -> Self {
        Self {
            store,
            missing_account,
        }
    }

    /// Approve `request_id` at `now`, granting `now + duration(plan)`.
    ///
    /// The caller is responsible for checking that the actor is an admin.
    pub async fn approve(
        &self,
        request_id: Uuid,
        resolved_by: Option<Uuid>,
        now: OffsetDateTime,
    ) -> SubscriptionResult<ApprovalOutcome> {
        let request = self
            .store
            .find_request(request_id)
            .await?
            .ok_or(SubscriptionError::RequestNotFound(request_id))?;

        if request.status.is_resolved() {
            tracing::info!(
                request_id = %request_id,
                status = %request.status,
                "Ignoring approval of resolved request"
            );
            return Err(SubscriptionError::AlreadyResolved(request_id));
        }

        // A "free" plan would produce premium = true on the free plan
        if is_free_plan(Some(&request.plan)) {
            return Err(SubscriptionError::UnknownPlan(request.plan));
        }

        let account = self.store.find_account_by_email(&request.email).await?;
        let grant = match &account {
            Some(account) => {
                let next = account.state().approve(&request.plan, now);
                let SubscriptionState::ActiveUntil { plan, expires_at } = next else {
                    return Err(SubscriptionError::InvalidInput(format!(
                        "approval of '{}' did not activate a plan",
                        request.plan
                    )));
                };
                Some(AccountGrant {
                    account_id: account.id,
                    plan,
                    expires_at,
                })
            }
            None => match self.missing_account {
                MissingAccountPolicy::Reject => {
                    tracing::warn!(
                        request_id = %request_id,
                        email = %request.email,
                        "No account for subscription request, approval refused"
                    );
                    return Err(SubscriptionError::AccountNotFound(request.email));
                }
                MissingAccountPolicy::ResolveWithoutGrant => {
                    tracing::warn!(
                        request_id = %request_id,
                        email = %request.email,
                        "No account for subscription request, resolving without grant"
                    );
                    None
                }
            },
        };

        let commit = ApprovalCommit {
            request_id,
            resolved_by,
            resolved_at: now,
            grant: grant.clone(),
        };
        if !self.store.commit_approval(&commit).await? {
            // Lost a race with another approval or a rejection
            tracing::info!(request_id = %request_id, "Request resolved concurrently");
            return Err(SubscriptionError::AlreadyResolved(request_id));
        }

        tracing::info!(
            request_id = %request_id,
            account_id = ?grant.as_ref().map(|g| g.account_id),
            plan = %request.plan,
            expires_at = ?grant.as_ref().map(|g| g.expires_at),
            resolved_by = ?resolved_by,
            "Subscription request approved"
        );

        Ok(ApprovalOutcome {
            request_id,
            account_id: grant.as_ref().map(|g| g.account_id),
            plan: request.plan,
            expires_at: grant.map(|g| g.expires_at),
        })
    }
}
