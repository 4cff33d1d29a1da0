//! Subscription Invariants Module
//!
//! Runnable consistency checks over accounts and the request ledger. They
//! can be run after any approval or sweep (or on a schedule by the worker)
//! to confirm the subscription columns are in a valid state.
//!
//! ## Design Principles
//!
//! 1. **Non-destructive**: Checks only read, never write
//! 2. **Explanatory**: Violations include enough context to debug
//! 3. **Time-aware**: Every check is evaluated against an explicit `now`

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::error::SubscriptionResult;
use crate::ledger::RequestStatus;
use crate::plan::{is_free_plan, plan_duration};
use crate::state::UserAccount;
use crate::store::Store;

/// Result of running a single invariant check
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvariantViolation {
    /// Which invariant was violated
    pub invariant: String,
    /// Account(s) affected
    pub account_ids: Vec<Uuid>,
    /// Human-readable description of the violation
    pub description: String,
    /// Additional context for debugging
    pub context: serde_json::Value,
    /// Severity level
    pub severity: ViolationSeverity,
}

/// Severity of an invariant violation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ViolationSeverity {
    /// Critical - premium content may be exposed to the wrong accounts
    Critical,
    /// High - data inconsistency that needs attention
    High,
    /// Medium - expected to self-heal, investigate if persistent
    Medium,
    /// Low - informational
    Low,
}

impl std::fmt::Display for ViolationSeverity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ViolationSeverity::Critical => write!(f, "CRITICAL"),
            ViolationSeverity::High => write!(f, "HIGH"),
            ViolationSeverity::Medium => write!(f, "MEDIUM"),
            ViolationSeverity::Low => write!(f, "LOW"),
        }
    }
}

/// Summary of all invariant checks
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvariantCheckSummary {
    /// When the check was run
    #[serde(with = "time::serde::rfc3339")]
    pub checked_at: OffsetDateTime,
    /// Total number of checks run
    pub checks_run: usize,
    /// Number of checks that passed
    pub checks_passed: usize,
    /// Number of checks that failed
    pub checks_failed: usize,
    /// List of all violations found
    pub violations: Vec<InvariantViolation>,
    /// Overall health status
    pub healthy: bool,
}

const CHECKS: [&str; 5] = [
    "premium_has_deadline",
    "premium_has_plan",
    "premium_not_lapsed",
    "free_is_clean",
    "approved_request_granted",
];

/// Service for running subscription invariant checks
#[derive(Clone)]
pub struct InvariantChecker {
    store: Arc<dyn Store>,
}

impl InvariantChecker {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Run all invariant checks and return summary
    pub async fn run_all_checks(
        &self,
        now: OffsetDateTime,
    ) -> SubscriptionResult<InvariantCheckSummary> {
        let accounts = self.store.list_accounts().await?;
        let mut violations = Vec::new();

        violations.extend(check_premium_has_deadline(&accounts));
        violations.extend(check_premium_has_plan(&accounts));
        violations.extend(check_premium_not_lapsed(&accounts, now));
        violations.extend(check_free_is_clean(&accounts));
        violations.extend(self.check_approved_request_granted(&accounts, now).await?);

        let checks_run = CHECKS.len();
        let checks_failed = violations
            .iter()
            .map(|v| &v.invariant)
            .collect::<HashSet<_>>()
            .len();
        let checks_passed = checks_run - checks_failed;

        Ok(InvariantCheckSummary {
            checked_at: now,
            checks_run,
            checks_passed,
            checks_failed,
            healthy: violations.is_empty(),
            violations,
        })
    }

    /// Run a single invariant check by name
    pub async fn run_check(
        &self,
        name: &str,
        now: OffsetDateTime,
    ) -> SubscriptionResult<Vec<InvariantViolation>> {
        let accounts = self.store.list_accounts().await?;
        Ok(match name {
            "premium_has_deadline" => check_premium_has_deadline(&accounts),
            "premium_has_plan" => check_premium_has_plan(&accounts),
            "premium_not_lapsed" => check_premium_not_lapsed(&accounts, now),
            "free_is_clean" => check_free_is_clean(&accounts),
            "approved_request_granted" => {
                self.check_approved_request_granted(&accounts, now).await?
            }
            _ => vec![],
        })
    }

    /// Get list of all available invariant checks
    pub fn available_checks() -> Vec<&'static str> {
        CHECKS.to_vec()
    }

    /// Approved requests whose window is still open should have left the
    /// account premium. Misses come from approvals resolved without an
    /// account (email registered later, or typo'd).
    async fn check_approved_request_granted(
        &self,
        accounts: &[UserAccount],
        now: OffsetDateTime,
    ) -> SubscriptionResult<Vec<InvariantViolation>> {
        let by_email: HashMap<&str, &UserAccount> =
            accounts.iter().map(|a| (a.email.as_str(), a)).collect();
        let approved = self
            .store
            .list_requests(Some(RequestStatus::Approved))
            .await?;

        Ok(approved
            .into_iter()
            .filter_map(|request| {
                let resolved_at = request.resolved_at?;
                if resolved_at + plan_duration(&request.plan) <= now {
                    return None;
                }
                let account = by_email.get(request.email.as_str());
                if account.is_some_and(|a| a.subscription.premium) {
                    return None;
                }
                Some(InvariantViolation {
                    invariant: "approved_request_granted".to_string(),
                    account_ids: account.map(|a| vec![a.id]).unwrap_or_default(),
                    description: format!(
                        "Request {} for '{}' was approved but the account is not premium",
                        request.id, request.plan
                    ),
                    context: serde_json::json!({
                        "request_id": request.id,
                        "email": request.email,
                        "plan": request.plan,
                        "resolved_at": rfc3339(resolved_at),
                        "account_exists": account.is_some(),
                    }),
                    severity: ViolationSeverity::Low,
                })
            })
            .collect())
    }
}

/// Invariant 1a: premium accounts carry a deadline
///
/// Without one the sweep can never demote them.
fn check_premium_has_deadline(accounts: &[UserAccount]) -> Vec<InvariantViolation> {
    accounts
        .iter()
        .filter(|a| a.subscription.premium && a.subscription.expires_at.is_none())
        .map(|a| InvariantViolation {
            invariant: "premium_has_deadline".to_string(),
            account_ids: vec![a.id],
            description: format!("Account {} is premium with no expiry", a.email),
            context: serde_json::json!({
                "plan": a.subscription.plan,
                "version": a.subscription.version,
            }),
            severity: ViolationSeverity::High,
        })
        .collect()
}

/// Invariant 1b: premium accounts name a paid plan
fn check_premium_has_plan(accounts: &[UserAccount]) -> Vec<InvariantViolation> {
    accounts
        .iter()
        .filter(|a| a.subscription.premium && is_free_plan(a.subscription.plan.as_deref()))
        .map(|a| InvariantViolation {
            invariant: "premium_has_plan".to_string(),
            account_ids: vec![a.id],
            description: format!("Account {} is premium on the free plan", a.email),
            context: serde_json::json!({
                "plan": a.subscription.plan,
                "version": a.subscription.version,
            }),
            severity: ViolationSeverity::High,
        })
        .collect()
}

/// Invariant 1c: premium deadlines are in the future
///
/// Violations are expected between a deadline passing and the next sweep,
/// so this only becomes interesting when it persists.
fn check_premium_not_lapsed(
    accounts: &[UserAccount],
    now: OffsetDateTime,
) -> Vec<InvariantViolation> {
    accounts
        .iter()
        .filter(|a| {
            a.subscription.premium && a.subscription.expires_at.is_some_and(|t| t < now)
        })
        .map(|a| InvariantViolation {
            invariant: "premium_not_lapsed".to_string(),
            account_ids: vec![a.id],
            description: format!("Account {} is premium past its expiry", a.email),
            context: serde_json::json!({
                "plan": a.subscription.plan,
                "expires_at": a.subscription.expires_at.and_then(rfc3339),
            }),
            severity: ViolationSeverity::Medium,
        })
        .collect()
}

/// Timestamps in violation context use the same wire format as the API
fn rfc3339(t: OffsetDateTime) -> Option<String> {
    t.format(&Rfc3339).ok()
}

/// Invariant 2: free accounts have no deadline and no paid plan
fn check_free_is_clean(accounts: &[UserAccount]) -> Vec<InvariantViolation> {
    accounts
        .iter()
        .filter(|a| {
            !a.subscription.premium
                && (a.subscription.expires_at.is_some()
                    || !is_free_plan(a.subscription.plan.as_deref()))
        })
        .map(|a| InvariantViolation {
            invariant: "free_is_clean".to_string(),
            account_ids: vec![a.id],
            description: format!("Free account {} still carries plan data", a.email),
            context: serde_json::json!({
                "plan": a.subscription.plan,
                "expires_at": a.subscription.expires_at.and_then(rfc3339),
            }),
            severity: ViolationSeverity::High,
        })
        .collect()
}
