// Test file - these are expected patterns in test code
#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]

//! Edge Case Tests for the Subscription Engine
//!
//! Tests boundary conditions and races in:
//! - Expiry sweep (deadline boundary, repeated and concurrent sweeps)
//! - Approval (duration table, repeated and concurrent approvals)
//! - Missing accounts and store outages
//! - Access gating across the full request lifecycle

use std::sync::Arc;

use time::macros::datetime;
use time::{Duration, OffsetDateTime};
use tipline_shared::{AccessTier, Role};
use uuid::Uuid;

use crate::ledger::{NewSubscriptionRequest, RequestStatus, SubscriptionRequest};
use crate::state::{NewAccount, SubscriptionRecord};
use crate::store::{AccountStore, MemoryStore, RequestStore};
use crate::{EngineConfig, MissingAccountPolicy, SubscriptionEngine, SubscriptionError};

const T: OffsetDateTime = datetime!(2024-01-01 00:00 UTC);

fn engine_with(store: Arc<MemoryStore>, policy: MissingAccountPolicy) -> SubscriptionEngine {
    SubscriptionEngine::new(
        store,
        EngineConfig {
            missing_account_policy: policy,
            ..EngineConfig::default()
        },
    )
}

async fn user(store: &MemoryStore, email: &str) -> Uuid {
    store
        .insert_account(
            NewAccount {
                email: email.into(),
                password_hash: "hash".into(),
                role: Role::User,
            },
            T - Duration::days(30),
        )
        .await
        .unwrap()
        .id
}

async fn premium_until(store: &MemoryStore, email: &str, expires_at: OffsetDateTime) -> Uuid {
    let id = user(store, email).await;
    store
        .seed_subscription(
            id,
            SubscriptionRecord {
                plan: Some("weekly".into()),
                premium: true,
                expires_at: Some(expires_at),
                version: 1,
            },
        )
        .await
        .unwrap();
    id
}

/// Insert a pending request directly, bypassing plan validation
async fn raw_request(store: &MemoryStore, email: &str, plan: &str) -> Uuid {
    let request = SubscriptionRequest {
        id: Uuid::new_v4(),
        email: email.into(),
        plan: plan.into(),
        phone: None,
        message: None,
        status: RequestStatus::Pending,
        created_at: T,
        resolved_at: None,
        resolved_by: None,
    };
    store.insert_request(&request).await.unwrap();
    request.id
}

#[cfg(test)]
mod sweep_tests {
    use super::*;

    // =========================================================================
    // Two sweeps in a row: same final state, second reports nothing
    // =========================================================================
    #[tokio::test]
    async fn test_repeated_sweep_is_idempotent() {
        let store = Arc::new(MemoryStore::new());
        let a = premium_until(&store, "a@example.com", T - Duration::days(1)).await;
        let b = premium_until(&store, "b@example.com", T - Duration::hours(1)).await;
        let engine = engine_with(store.clone(), MissingAccountPolicy::default());

        assert_eq!(engine.sweeper.sweep(T).await.unwrap(), 2);
        let after_first = (
            store.find_account(a).await.unwrap().unwrap().subscription,
            store.find_account(b).await.unwrap().unwrap().subscription,
        );

        let later = T + Duration::milliseconds(1);
        assert_eq!(engine.sweeper.sweep(later).await.unwrap(), 0);
        let after_second = (
            store.find_account(a).await.unwrap().unwrap().subscription,
            store.find_account(b).await.unwrap().unwrap().subscription,
        );
        assert_eq!(after_first, after_second);
    }

    // =========================================================================
    // Deadline equal to or after now is left alone
    // =========================================================================
    #[tokio::test]
    async fn test_no_demotion_at_or_before_deadline() {
        let store = Arc::new(MemoryStore::new());
        let exact = premium_until(&store, "exact@example.com", T).await;
        let future = premium_until(&store, "future@example.com", T + Duration::days(3)).await;
        let engine = engine_with(store.clone(), MissingAccountPolicy::default());

        assert_eq!(engine.sweeper.sweep(T).await.unwrap(), 0);
        for id in [exact, future] {
            let account = store.find_account(id).await.unwrap().unwrap();
            assert!(account.is_premium());
            assert_eq!(account.subscription.version, 1);
        }

        // One tick past the deadline is enough
        assert_eq!(
            engine
                .sweeper
                .sweep(T + Duration::nanoseconds(1))
                .await
                .unwrap(),
            1
        );
        assert!(!store.find_account(exact).await.unwrap().unwrap().is_premium());
    }

    // =========================================================================
    // Concurrent sweeps demote each expired account exactly once
    // =========================================================================
    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_sweeps_demote_once() {
        let store = Arc::new(MemoryStore::new());
        for i in 0..20 {
            let expires = if i % 2 == 0 {
                T - Duration::days(1)
            } else {
                T + Duration::days(1)
            };
            premium_until(&store, &format!("user{i}@example.com"), expires).await;
        }
        let engine = engine_with(store.clone(), MissingAccountPolicy::default());

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let sweeper = engine.sweeper.clone();
                tokio::spawn(async move { sweeper.sweep(T).await.unwrap() })
            })
            .collect();

        let mut total = 0;
        for handle in handles {
            total += handle.await.unwrap();
        }
        assert_eq!(total, 10);

        let accounts = store.list_accounts().await.unwrap();
        assert_eq!(accounts.iter().filter(|a| a.is_premium()).count(), 10);
        // Demoted rows moved exactly one version
        assert!(accounts
            .iter()
            .filter(|a| !a.is_premium())
            .all(|a| a.subscription.version == 2));
    }

    // =========================================================================
    // Reads still succeed when the inline sweep cannot run
    // =========================================================================
    #[tokio::test]
    async fn test_reads_survive_slow_sweep() {
        let store = Arc::new(MemoryStore::new());
        let id = premium_until(&store, "slow@example.com", T - Duration::days(1)).await;
        store.set_sweep_latency(std::time::Duration::from_millis(200));
        let engine = SubscriptionEngine::new(
            store.clone(),
            EngineConfig {
                sweep_timeout: std::time::Duration::from_millis(10),
                ..EngineConfig::default()
            },
        );

        let account = engine.accounts.get(id, T).await.unwrap();
        // Sweep did not complete, so the stale row is served as stored
        assert!(account.subscription.premium);
    }
}

#[cfg(test)]
mod approval_tests {
    use super::*;

    // =========================================================================
    // Duration table: weekly 7 days, monthly/vip/unknown 30 days
    // =========================================================================
    #[tokio::test]
    async fn test_approval_duration_table() {
        let cases = [
            ("weekly", Duration::days(7)),
            ("monthly", Duration::days(30)),
            ("vip", Duration::days(30)),
            ("unknown", Duration::days(30)),
        ];

        for (plan, duration) in cases {
            let store = Arc::new(MemoryStore::new());
            let account_id = user(&store, "fan@example.com").await;
            let request_id = raw_request(&store, "fan@example.com", plan).await;
            let engine = engine_with(store.clone(), MissingAccountPolicy::default());

            let outcome = engine.approvals.approve(request_id, None, T).await.unwrap();
            assert_eq!(outcome.expires_at, Some(T + duration), "plan {plan}");

            let account = store.find_account(account_id).await.unwrap().unwrap();
            assert_eq!(account.subscription.plan.as_deref(), Some(plan));
            assert_eq!(account.subscription.expires_at, Some(T + duration));
        }
    }

    // =========================================================================
    // Approving twice: first succeeds, second is AlreadyResolved, no change
    // =========================================================================
    #[tokio::test]
    async fn test_second_approval_changes_nothing() {
        let store = Arc::new(MemoryStore::new());
        let account_id = user(&store, "fan@example.com").await;
        let request_id = raw_request(&store, "fan@example.com", "weekly").await;
        let engine = engine_with(store.clone(), MissingAccountPolicy::default());

        engine.approvals.approve(request_id, None, T).await.unwrap();
        let before = store.find_account(account_id).await.unwrap().unwrap();

        let err = engine
            .approvals
            .approve(request_id, None, T + Duration::days(2))
            .await
            .unwrap_err();
        assert!(matches!(err, SubscriptionError::AlreadyResolved(id) if id == request_id));

        let after = store.find_account(account_id).await.unwrap().unwrap();
        assert_eq!(before.subscription, after.subscription);
    }

    // =========================================================================
    // Racing approvals of one request: exactly one wins
    // =========================================================================
    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_approvals_single_winner() {
        use tokio::sync::Barrier;

        let store = Arc::new(MemoryStore::new());
        let account_id = user(&store, "fan@example.com").await;
        let request_id = raw_request(&store, "fan@example.com", "monthly").await;
        let engine = engine_with(store.clone(), MissingAccountPolicy::default());

        let barrier = Arc::new(Barrier::new(10));
        let handles: Vec<_> = (0..10)
            .map(|i| {
                let approvals = engine.approvals.clone();
                let barrier = barrier.clone();
                tokio::spawn(async move {
                    barrier.wait().await;
                    approvals
                        .approve(request_id, None, T + Duration::seconds(i))
                        .await
                })
            })
            .collect();

        let mut wins = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => wins += 1,
                Err(SubscriptionError::AlreadyResolved(_)) => {}
                Err(e) => panic!("unexpected error: {e}"),
            }
        }
        assert_eq!(wins, 1);

        let account = store.find_account(account_id).await.unwrap().unwrap();
        assert_eq!(account.subscription.version, 1);
    }

    // =========================================================================
    // Approve then reject (and the reverse) race on the same claim
    // =========================================================================
    #[tokio::test]
    async fn test_rejected_request_cannot_be_approved() {
        let store = Arc::new(MemoryStore::new());
        let account_id = user(&store, "fan@example.com").await;
        let request_id = raw_request(&store, "fan@example.com", "vip").await;
        let engine = engine_with(store.clone(), MissingAccountPolicy::default());

        engine.ledger.reject(request_id, None, T).await.unwrap();
        let err = engine.approvals.approve(request_id, None, T).await.unwrap_err();
        assert!(matches!(err, SubscriptionError::AlreadyResolved(_)));
        assert!(!store
            .find_account(account_id)
            .await
            .unwrap()
            .unwrap()
            .is_premium());
    }

    // =========================================================================
    // Renewal replaces the window instead of stacking it
    // =========================================================================
    #[tokio::test]
    async fn test_renewal_restarts_window() {
        let store = Arc::new(MemoryStore::new());
        let account_id = premium_until(&store, "fan@example.com", T + Duration::days(5)).await;
        let request_id = raw_request(&store, "fan@example.com", "weekly").await;
        let engine = engine_with(store.clone(), MissingAccountPolicy::default());

        engine.approvals.approve(request_id, None, T).await.unwrap();
        let account = store.find_account(account_id).await.unwrap().unwrap();
        assert_eq!(account.subscription.expires_at, Some(T + Duration::days(7)));
        assert_eq!(account.subscription.version, 2);
    }

    #[tokio::test]
    async fn test_free_plan_request_is_refused() {
        let store = Arc::new(MemoryStore::new());
        user(&store, "fan@example.com").await;
        let request_id = raw_request(&store, "fan@example.com", "free").await;
        let engine = engine_with(store.clone(), MissingAccountPolicy::default());

        let err = engine.approvals.approve(request_id, None, T).await.unwrap_err();
        assert!(matches!(err, SubscriptionError::UnknownPlan(_)));
        assert_eq!(
            engine.ledger.get(request_id).await.unwrap().status,
            RequestStatus::Pending
        );
    }

    #[tokio::test]
    async fn test_unknown_request_is_not_found() {
        let engine = engine_with(Arc::new(MemoryStore::new()), MissingAccountPolicy::default());
        let err = engine
            .approvals
            .approve(Uuid::new_v4(), None, T)
            .await
            .unwrap_err();
        assert!(matches!(err, SubscriptionError::RequestNotFound(_)));
    }
}

#[cfg(test)]
mod missing_account_tests {
    use super::*;

    #[tokio::test]
    async fn test_resolve_without_grant() {
        let store = Arc::new(MemoryStore::new());
        let request_id = raw_request(&store, "ghost@example.com", "weekly").await;
        let engine = engine_with(store.clone(), MissingAccountPolicy::ResolveWithoutGrant);

        let outcome = engine.approvals.approve(request_id, None, T).await.unwrap();
        assert_eq!(outcome.account_id, None);
        assert_eq!(outcome.expires_at, None);

        let request = engine.ledger.get(request_id).await.unwrap();
        assert_eq!(request.status, RequestStatus::Approved);
        assert_eq!(request.resolved_at, Some(T));

        // An account registered afterwards does not inherit the grant
        let late = user(&store, "ghost@example.com").await;
        assert!(!store.find_account(late).await.unwrap().unwrap().is_premium());
    }

    #[tokio::test]
    async fn test_reject_policy_leaves_request_pending() {
        let store = Arc::new(MemoryStore::new());
        let request_id = raw_request(&store, "ghost@example.com", "weekly").await;
        let engine = engine_with(store.clone(), MissingAccountPolicy::Reject);

        let err = engine.approvals.approve(request_id, None, T).await.unwrap_err();
        assert!(matches!(err, SubscriptionError::AccountNotFound(_)));
        assert_eq!(
            engine.ledger.get(request_id).await.unwrap().status,
            RequestStatus::Pending
        );

        // Once the account exists the same request goes through
        user(&store, "ghost@example.com").await;
        assert!(engine
            .approvals
            .approve(request_id, None, T)
            .await
            .unwrap()
            .account_id
            .is_some());
    }

    #[tokio::test]
    async fn test_store_outage_surfaces_on_approve() {
        let store = Arc::new(MemoryStore::new());
        user(&store, "fan@example.com").await;
        let request_id = raw_request(&store, "fan@example.com", "weekly").await;
        let engine = engine_with(store.clone(), MissingAccountPolicy::default());

        store.set_unavailable(true);
        let err = engine.approvals.approve(request_id, None, T).await.unwrap_err();
        assert!(matches!(err, SubscriptionError::StoreUnavailable(_)));
        assert!(err.is_retryable());

        store.set_unavailable(false);
        assert!(engine.approvals.approve(request_id, None, T).await.is_ok());
    }
}

#[cfg(test)]
mod lifecycle_tests {
    use super::*;
    use crate::content::{Game, NewSlip, SlipQuery};

    fn slip(access: AccessTier) -> NewSlip {
        NewSlip {
            date: "2024-01-10".into(),
            access,
            total_odds: 3.5,
            games: vec![Game {
                home: "Arsenal".into(),
                away: "Chelsea".into(),
                odd: 1.85,
                over_under: Some("over 2.5".into()),
                result: Default::default(),
            }],
        }
    }

    // =========================================================================
    // Free account, weekly request approved at T, then sweeps around expiry
    // =========================================================================
    #[tokio::test]
    async fn test_weekly_lifecycle() {
        let store = Arc::new(MemoryStore::new());
        let engine = engine_with(store.clone(), MissingAccountPolicy::default());
        let account = engine
            .accounts
            .register("fan@example.com", "hash".into(), Role::User, T)
            .await
            .unwrap();
        assert!(!account.is_premium());

        let request = engine
            .ledger
            .submit(
                NewSubscriptionRequest {
                    email: "Fan@Example.com".into(),
                    plan: "weekly".into(),
                    phone: None,
                    message: Some("please".into()),
                },
                T,
            )
            .await
            .unwrap();
        assert_eq!(request.status, RequestStatus::Pending);

        // Approved at T: premium until T + 7 days
        engine.approvals.approve(request.id, None, T).await.unwrap();
        let active = store.find_account(account.id).await.unwrap().unwrap();
        assert_eq!(
            active.subscription,
            SubscriptionRecord {
                plan: Some("weekly".into()),
                premium: true,
                expires_at: Some(datetime!(2024-01-08 00:00 UTC)),
                version: 1,
            }
        );
        assert_eq!(
            engine.ledger.get(request.id).await.unwrap().status,
            RequestStatus::Approved
        );

        // Mid-window sweep changes nothing
        assert_eq!(
            engine
                .sweeper
                .sweep(datetime!(2024-01-05 00:00 UTC))
                .await
                .unwrap(),
            0
        );

        // Re-approval is refused and the account is untouched
        let err = engine
            .approvals
            .approve(request.id, None, datetime!(2024-01-05 00:00 UTC))
            .await
            .unwrap_err();
        assert!(matches!(err, SubscriptionError::AlreadyResolved(_)));
        assert_eq!(
            store.find_account(account.id).await.unwrap().unwrap().subscription,
            active.subscription
        );

        // After expiry the account is demoted on the next sweep
        assert_eq!(
            engine
                .sweeper
                .sweep(datetime!(2024-01-09 00:00 UTC))
                .await
                .unwrap(),
            1
        );
        let lapsed = store.find_account(account.id).await.unwrap().unwrap();
        assert!(!lapsed.subscription.premium);
        assert_eq!(lapsed.subscription.plan, None);
        assert_eq!(lapsed.subscription.expires_at, None);
    }

    // =========================================================================
    // Free slips always visible, premium slips only while premium
    // =========================================================================
    #[tokio::test]
    async fn test_gate_follows_expiry_without_explicit_sweep() {
        let store = Arc::new(MemoryStore::new());
        let engine = engine_with(store.clone(), MissingAccountPolicy::default());
        let viewer = premium_until(&store, "fan@example.com", T + Duration::days(7)).await;
        engine.content.create_slip(slip(AccessTier::Free), T).await.unwrap();
        engine
            .content
            .create_slip(slip(AccessTier::Premium), T)
            .await
            .unwrap();
        let query = SlipQuery::default();

        let page = engine
            .content
            .list_slips(Some(viewer), &query, T + Duration::days(1))
            .await
            .unwrap();
        assert!(page.slips.iter().all(|s| !s.locked && !s.games.is_empty()));

        // Listing after the deadline runs the sweep inline
        let page = engine
            .content
            .list_slips(Some(viewer), &query, T + Duration::days(8))
            .await
            .unwrap();
        for view in &page.slips {
            match view.access {
                AccessTier::Free => assert!(!view.locked),
                AccessTier::Premium => {
                    assert!(view.locked);
                    assert!(view.games.is_empty());
                }
            }
        }
        assert!(!store.find_account(viewer).await.unwrap().unwrap().subscription.premium);

        // Anonymous viewers see the same as free accounts
        let anonymous = engine.content.list_slips(None, &query, T).await.unwrap();
        assert_eq!(anonymous.total, 2);
        assert_eq!(anonymous.slips.iter().filter(|s| s.locked).count(), 1);
    }
}
