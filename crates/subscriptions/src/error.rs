//! Subscription error types

use thiserror::Error;
use uuid::Uuid;

pub type SubscriptionResult<T> = Result<T, SubscriptionError>;

#[derive(Debug, Error)]
pub enum SubscriptionError {
    #[error("Subscription request not found: {0}")]
    RequestNotFound(Uuid),

    #[error("No account found for {0}")]
    AccountNotFound(String),

    #[error("Slip not found: {0}")]
    SlipNotFound(Uuid),

    #[error("Game {index} not found on slip {slip_id}")]
    GameNotFound { slip_id: Uuid, index: usize },

    #[error("Subscription request {0} has already been resolved")]
    AlreadyResolved(Uuid),

    /// For embedders that enforce roles around engine calls. The engine never
    /// checks roles itself and the HTTP server rejects non-admins in its
    /// `require_admin` middleware; maps to 403.
    #[error("Operation requires an admin")]
    Unauthorized,

    #[error("Unknown plan: {0}")]
    UnknownPlan(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Email already registered")]
    EmailTaken,

    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),
}

/// Coarse classification callers use to decide how to report or retry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    AlreadyResolved,
    Unauthorized,
    Invalid,
    Conflict,
    StoreUnavailable,
}

impl SubscriptionError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            SubscriptionError::RequestNotFound(_)
            | SubscriptionError::AccountNotFound(_)
            | SubscriptionError::SlipNotFound(_)
            | SubscriptionError::GameNotFound { .. } => ErrorKind::NotFound,
            SubscriptionError::AlreadyResolved(_) => ErrorKind::AlreadyResolved,
            SubscriptionError::Unauthorized => ErrorKind::Unauthorized,
            SubscriptionError::UnknownPlan(_) | SubscriptionError::InvalidInput(_) => {
                ErrorKind::Invalid
            }
            SubscriptionError::EmailTaken => ErrorKind::Conflict,
            SubscriptionError::StoreUnavailable(_) => ErrorKind::StoreUnavailable,
        }
    }

    /// Only transient persistence failures are worth retrying
    pub fn is_retryable(&self) -> bool {
        self.kind() == ErrorKind::StoreUnavailable
    }
}

impl From<sqlx::Error> for SubscriptionError {
    fn from(err: sqlx::Error) -> Self {
        if let Some(db) = err.as_database_error() {
            if db.is_unique_violation() {
                return SubscriptionError::EmailTaken;
            }
        }
        SubscriptionError::StoreUnavailable(err.to_string())
    }
}

impl From<serde_json::Error> for SubscriptionError {
    fn from(err: serde_json::Error) -> Self {
        SubscriptionError::StoreUnavailable(format!("payload decode failed: {err}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kinds() {
        let id = Uuid::new_v4();
        assert_eq!(
            SubscriptionError::RequestNotFound(id).kind(),
            ErrorKind::NotFound
        );
        assert_eq!(
            SubscriptionError::AlreadyResolved(id).kind(),
            ErrorKind::AlreadyResolved
        );
        assert_eq!(
            SubscriptionError::UnknownPlan("daily".into()).kind(),
            ErrorKind::Invalid
        );
        assert_eq!(SubscriptionError::EmailTaken.kind(), ErrorKind::Conflict);
    }

    #[test]
    fn test_only_store_failures_are_retryable() {
        assert!(SubscriptionError::StoreUnavailable("timeout".into()).is_retryable());
        assert!(!SubscriptionError::AlreadyResolved(Uuid::new_v4()).is_retryable());
        assert!(!SubscriptionError::Unauthorized.is_retryable());
    }

    #[test]
    fn test_row_not_found_maps_to_store_unavailable() {
        let err: SubscriptionError = sqlx::Error::RowNotFound.into();
        assert!(matches!(err, SubscriptionError::StoreUnavailable(_)));
    }
}
