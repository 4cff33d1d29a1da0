//! Job bodies run by the scheduler

use time::OffsetDateTime;
use tipline_subscriptions::{InvariantCheckSummary, SubscriptionEngine, ViolationSeverity};
use tracing::{error, info, warn};

/// Sweep expired subscriptions. Returns the number demoted, or None on failure.
pub async fn run_expiry_sweep(engine: &SubscriptionEngine, now: OffsetDateTime) -> Option<u64> {
    match engine.sweeper.sweep(now).await {
        Ok(demoted) => {
            info!(demoted = demoted, "Scheduled expiry sweep complete");
            Some(demoted)
        }
        Err(e) => {
            error!(error = %e, retryable = e.is_retryable(), "Scheduled expiry sweep failed");
            None
        }
    }
}

/// Run every invariant check and log each violation at a level matching its severity
pub async fn run_invariant_check(
    engine: &SubscriptionEngine,
    now: OffsetDateTime,
) -> Option<InvariantCheckSummary> {
    let summary = match engine.invariants.run_all_checks(now).await {
        Ok(summary) => summary,
        Err(e) => {
            error!(error = %e, "Invariant check failed to run");
            return None;
        }
    };

    for violation in &summary.violations {
        match violation.severity {
            ViolationSeverity::Critical | ViolationSeverity::High => error!(
                invariant = %violation.invariant,
                severity = %violation.severity,
                accounts = ?violation.account_ids,
                "{}",
                violation.description
            ),
            ViolationSeverity::Medium => warn!(
                invariant = %violation.invariant,
                accounts = ?violation.account_ids,
                "{}",
                violation.description
            ),
            ViolationSeverity::Low => info!(
                invariant = %violation.invariant,
                accounts = ?violation.account_ids,
                "{}",
                violation.description
            ),
        }
    }

    info!(
        checks_run = summary.checks_run,
        checks_failed = summary.checks_failed,
        healthy = summary.healthy,
        "Invariant check complete"
    );
    Some(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use time::macros::datetime;
    use tipline_shared::Role;
    use tipline_subscriptions::{
        store::AccountStore, EngineConfig, MemoryStore, NewAccount, SubscriptionRecord,
    };

    async fn engine_with_lapsed_account() -> (SubscriptionEngine, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let account = store
            .insert_account(
                NewAccount {
                    email: "fan@example.com".into(),
                    password_hash: "hash".into(),
                    role: Role::User,
                },
                datetime!(2024-01-01 00:00 UTC),
            )
            .await
            .unwrap();
        store
            .seed_subscription(
                account.id,
                SubscriptionRecord {
                    plan: Some("weekly".into()),
                    premium: true,
                    expires_at: Some(datetime!(2024-01-08 00:00 UTC)),
                    version: 1,
                },
            )
            .await
            .unwrap();
        (
            SubscriptionEngine::new(store.clone(), EngineConfig::default()),
            store,
        )
    }

    #[tokio::test]
    async fn test_sweep_job_then_invariants_clean() {
        let (engine, _store) = engine_with_lapsed_account().await;
        let now = datetime!(2024-01-09 00:00 UTC);

        let before = run_invariant_check(&engine, now).await.unwrap();
        assert!(!before.healthy);
        assert_eq!(before.violations[0].invariant, "premium_not_lapsed");

        assert_eq!(run_expiry_sweep(&engine, now).await, Some(1));
        assert_eq!(run_expiry_sweep(&engine, now).await, Some(0));

        let after = run_invariant_check(&engine, now).await.unwrap();
        assert!(after.healthy);
    }

    #[tokio::test]
    async fn test_jobs_report_store_failure() {
        let (engine, store) = engine_with_lapsed_account().await;
        store.set_unavailable(true);
        let now = datetime!(2024-01-09 00:00 UTC);

        assert_eq!(run_expiry_sweep(&engine, now).await, None);
        assert!(run_invariant_check(&engine, now).await.is_none());
    }
}
