//! Subscription request ledger
//!
//! Users ask for a plan; the request sits here as `pending` until an admin
//! approves or rejects it. Resolution happens exactly once.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::error::{SubscriptionError, SubscriptionResult};
use crate::plan::Plan;
use crate::store::Store;

const MAX_PHONE_LEN: usize = 32;
const MAX_MESSAGE_LEN: usize = 1_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestStatus {
    Pending,
    Approved,
    Rejected,
}

impl RequestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestStatus::Pending => "pending",
            RequestStatus::Approved => "approved",
            RequestStatus::Rejected => "rejected",
        }
    }

    pub fn is_resolved(&self) -> bool {
        !matches!(self, RequestStatus::Pending)
    }
}

impl fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RequestStatus {
    type Err = SubscriptionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(RequestStatus::Pending),
            "approved" => Ok(RequestStatus::Approved),
            "rejected" => Ok(RequestStatus::Rejected),
            other => Err(SubscriptionError::InvalidInput(format!(
                "unknown request status '{other}'"
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubscriptionRequest {
    pub id: Uuid,
    pub email: String,
    /// Stored as text so requests for retired plans remain readable
    pub plan: String,
    pub phone: Option<String>,
    pub message: Option<String>,
    pub status: RequestStatus,
    pub created_at: OffsetDateTime,
    pub resolved_at: Option<OffsetDateTime>,
    pub resolved_by: Option<Uuid>,
}

#[derive(Debug, Clone)]
pub struct NewSubscriptionRequest {
    pub email: String,
    pub plan: String,
    pub phone: Option<String>,
    pub message: Option<String>,
}

impl NewSubscriptionRequest {
    fn validate(&self) -> SubscriptionResult<Plan> {
        let plan: Plan = self.plan.parse()?;
        if self.email.trim().is_empty() {
            return Err(SubscriptionError::InvalidInput("email is required".into()));
        }
        if self.phone.as_ref().is_some_and(|p| p.len() > MAX_PHONE_LEN) {
            return Err(SubscriptionError::InvalidInput("phone is too long".into()));
        }
        if self
            .message
            .as_ref()
            .is_some_and(|m| m.len() > MAX_MESSAGE_LEN)
        {
            return Err(SubscriptionError::InvalidInput("message is too long".into()));
        }
        Ok(plan)
    }
}

/// Reads and writes ledger entries. Approval lives in [`crate::approval`].
#[derive(Clone)]
pub struct RequestLedger {
    store: Arc<dyn Store>,
}

impl RequestLedger {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Record a new pending request. The plan must be one users can choose today.
    pub async fn submit(
        &self,
        request: NewSubscriptionRequest,
        now: OffsetDateTime,
    ) -> SubscriptionResult<SubscriptionRequest> {
        let plan = request.validate()?;

        let entry = SubscriptionRequest {
            id: Uuid::new_v4(),
            email: request.email.trim().to_lowercase(),
            plan: plan.as_str().to_string(),
            phone: request.phone,
            message: request.message,
            status: RequestStatus::Pending,
            created_at: now,
            resolved_at: None,
            resolved_by: None,
        };
        self.store.insert_request(&entry).await?;

        tracing::info!(
            request_id = %entry.id,
            email = %entry.email,
            plan = %entry.plan,
            "Subscription request submitted"
        );
        Ok(entry)
    }

    pub async fn get(&self, id: Uuid) -> SubscriptionResult<SubscriptionRequest> {
        self.store
            .find_request(id)
            .await?
            .ok_or(SubscriptionError::RequestNotFound(id))
    }

    /// Newest first
    pub async fn list(
        &self,
        status: Option<RequestStatus>,
    ) -> SubscriptionResult<Vec<SubscriptionRequest>> {
        self.store.list_requests(status).await
    }

    /// Decline a pending request. Resolved requests are left untouched.
    pub async fn reject(
        &self,
        id: Uuid,
        resolved_by: Option<Uuid>,
        now: OffsetDateTime,
    ) -> SubscriptionResult<SubscriptionRequest> {
        let request = self.get(id).await?;
        if request.status.is_resolved() {
            return Err(SubscriptionError::AlreadyResolved(id));
        }

        if !self.store.reject_request(id, resolved_by, now).await? {
            return Err(SubscriptionError::AlreadyResolved(id));
        }

        tracing::info!(request_id = %id, resolved_by = ?resolved_by, "Subscription request rejected");
        self.get(id).await
    }
}
