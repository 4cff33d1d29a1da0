//! Paid plans and the plan-to-duration table
//!
//! The duration table is a public contract: clients show "7 days" / "30 days"
//! next to each plan and rely on approval granting exactly that window.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use time::Duration;

use crate::error::SubscriptionError;

/// Name stored and displayed for accounts without an active plan
pub const FREE_PLAN: &str = "free";

pub const WEEKLY_DAYS: i64 = 7;
pub const MONTHLY_DAYS: i64 = 30;
pub const VIP_DAYS: i64 = 30;
/// Applied to any plan name the table doesn't know (legacy requests)
pub const DEFAULT_DAYS: i64 = 30;

/// A plan users can request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Plan {
    Weekly,
    Monthly,
    Vip,
}

impl Plan {
    pub const ALL: [Plan; 3] = [Plan::Weekly, Plan::Monthly, Plan::Vip];

    pub fn as_str(&self) -> &'static str {
        match self {
            Plan::Weekly => "weekly",
            Plan::Monthly => "monthly",
            Plan::Vip => "vip",
        }
    }

    pub fn duration(&self) -> Duration {
        match self {
            Plan::Weekly => Duration::days(WEEKLY_DAYS),
            Plan::Monthly => Duration::days(MONTHLY_DAYS),
            Plan::Vip => Duration::days(VIP_DAYS),
        }
    }
}

impl fmt::Display for Plan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Plan {
    type Err = SubscriptionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "weekly" => Ok(Plan::Weekly),
            "monthly" => Ok(Plan::Monthly),
            "vip" => Ok(Plan::Vip),
            other => Err(SubscriptionError::UnknownPlan(other.to_string())),
        }
    }
}

/// Entitlement length for a stored plan name.
///
/// Works on the raw string because requests created before a plan was retired
/// still have to be approvable; unknown names get [`DEFAULT_DAYS`].
pub fn plan_duration(plan: &str) -> Duration {
    plan.parse::<Plan>()
        .map(|p| p.duration())
        .unwrap_or_else(|_| Duration::days(DEFAULT_DAYS))
}

/// True for values that mean "no paid plan"
pub fn is_free_plan(plan: Option<&str>) -> bool {
    match plan {
        None => true,
        Some(p) => p.is_empty() || p == FREE_PLAN,
    }
}
