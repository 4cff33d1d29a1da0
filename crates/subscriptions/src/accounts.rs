//! Account lookups and registration
//!
//! Reads here always run the expiry sweep first so callers never see a
//! lapsed plan reported as active. Accounts are created free; subscription
//! columns are never written from this module.

use std::sync::Arc;
use time::OffsetDateTime;
use tipline_shared::Role;
use uuid::Uuid;

use crate::error::{SubscriptionError, SubscriptionResult};
use crate::state::{NewAccount, UserAccount};
use crate::store::Store;
use crate::sweeper::ExpirySweeper;

const MAX_EMAIL_LEN: usize = 254;

/// Lowercase and trim so lookups by request email match registrations
pub fn normalize_email(email: &str) -> SubscriptionResult<String> {
    let email = email.trim().to_lowercase();
    let valid = email.len() <= MAX_EMAIL_LEN
        && email
            .split_once('@')
            .is_some_and(|(local, domain)| !local.is_empty() && domain.contains('.'));
    if !valid {
        return Err(SubscriptionError::InvalidInput(
            "a valid email is required".into(),
        ));
    }
    Ok(email)
}

#[derive(Clone)]
pub struct AccountService {
    store: Arc<dyn Store>,
    sweeper: ExpirySweeper,
}

impl AccountService {
    pub fn new(store: Arc<dyn Store>, sweeper: ExpirySweeper) -> Self {
        Self { store, sweeper }
    }

    /// Create a free account. `password_hash` is already hashed by the caller.
    pub async fn register(
        &self,
        email: &str,
        password_hash: String,
        role: Role,
        now: OffsetDateTime,
    ) -> SubscriptionResult<UserAccount> {
        let email = normalize_email(email)?;
        let account = self
            .store
            .insert_account(
                NewAccount {
                    email,
                    password_hash,
                    role,
                },
                now,
            )
            .await?;

        tracing::info!(account_id = %account.id, role = %account.role, "Account registered");
        Ok(account)
    }

    /// Create an admin account unless the email is already registered.
    /// Returns true when an account was created.
    pub async fn ensure_admin(
        &self,
        email: &str,
        password_hash: String,
        now: OffsetDateTime,
    ) -> SubscriptionResult<bool> {
        let email = normalize_email(email)?;
        if let Some(existing) = self.store.find_account_by_email(&email).await? {
            if !existing.role.is_admin() {
                tracing::warn!(
                    account_id = %existing.id,
                    "Bootstrap admin email belongs to a non-admin account"
                );
            }
            return Ok(false);
        }

        match self.register(&email, password_hash, Role::Admin, now).await {
            Ok(_) => Ok(true),
            // Another process bootstrapped it first
            Err(SubscriptionError::EmailTaken) => Ok(false),
            Err(e) => Err(e),
        }
    }

    pub async fn find_by_email(
        &self,
        email: &str,
        now: OffsetDateTime,
    ) -> SubscriptionResult<Option<UserAccount>> {
        let email = match normalize_email(email) {
            Ok(email) => email,
            Err(_) => return Ok(None),
        };
        self.sweeper.maybe_sweep(now).await;
        self.store.find_account_by_email(&email).await
    }

    pub async fn get(&self, id: Uuid, now: OffsetDateTime) -> SubscriptionResult<UserAccount> {
        self.sweeper.maybe_sweep(now).await;
        self.store
            .find_account(id)
            .await?
            .ok_or_else(|| SubscriptionError::AccountNotFound(id.to_string()))
    }

    pub async fn list(&self, now: OffsetDateTime) -> SubscriptionResult<Vec<UserAccount>> {
        self.sweeper.maybe_sweep(now).await;
        self.store.list_accounts().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use crate::sweeper::DEFAULT_SWEEP_TIMEOUT;
    use time::macros::datetime;

    fn service() -> AccountService {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let sweeper = ExpirySweeper::new(store.clone(), DEFAULT_SWEEP_TIMEOUT);
        AccountService::new(store, sweeper)
    }

    #[test]
    fn test_normalize_email() {
        assert_eq!(
            normalize_email("  Fan@Example.COM ").unwrap(),
            "fan@example.com"
        );
        assert!(normalize_email("not-an-email").is_err());
        assert!(normalize_email("@example.com").is_err());
        assert!(normalize_email("fan@localhost").is_err());
    }

    #[tokio::test]
    async fn test_register_starts_free_and_rejects_duplicates() {
        let accounts = service();
        let now = datetime!(2024-01-01 00:00 UTC);
        let account = accounts
            .register("fan@example.com", "hash".into(), Role::User, now)
            .await
            .unwrap();
        assert!(!account.is_premium());
        assert_eq!(account.subscription.version, 0);

        let dup = accounts
            .register("FAN@example.com", "hash".into(), Role::User, now)
            .await
            .unwrap_err();
        assert!(matches!(dup, SubscriptionError::EmailTaken));
    }

    #[tokio::test]
    async fn test_ensure_admin_is_idempotent() {
        let accounts = service();
        let now = datetime!(2024-01-01 00:00 UTC);
        assert!(accounts
            .ensure_admin("admin@example.com", "hash".into(), now)
            .await
            .unwrap());
        assert!(!accounts
            .ensure_admin("admin@example.com", "other".into(), now)
            .await
            .unwrap());

        let admin = accounts
            .find_by_email("admin@example.com", now)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(admin.role, Role::Admin);
        assert_eq!(admin.password_hash, "hash");
    }

    #[tokio::test]
    async fn test_get_unknown_account() {
        let err = service()
            .get(Uuid::new_v4(), OffsetDateTime::now_utc())
            .await
            .unwrap_err();
        assert!(matches!(err, SubscriptionError::AccountNotFound(_)));
    }

    #[tokio::test]
    async fn test_find_by_malformed_email_is_none() {
        let found = service()
            .find_by_email("nobody", OffsetDateTime::now_utc())
            .await
            .unwrap();
        assert!(found.is_none());
    }
}
