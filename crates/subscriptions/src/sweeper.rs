//! Expiry sweeper
//!
//! Demotes lapsed premium accounts back to free. There is no dedicated
//! scheduler requirement: every state-reading operation calls
//! [`ExpirySweeper::maybe_sweep`] first, and the worker can additionally run
//! [`ExpirySweeper::run_periodic`]. Both paths go through the same bulk
//! conditional update, so running them together is harmless.

use std::sync::Arc;
use std::time::Duration;

use time::OffsetDateTime;
use tokio::time::MissedTickBehavior;

use crate::error::SubscriptionResult;
use crate::store::Store;

/// How long a request is willing to wait for the inline sweep
pub const DEFAULT_SWEEP_TIMEOUT: Duration = Duration::from_millis(500);

#[derive(Clone)]
pub struct ExpirySweeper {
    store: Arc<dyn Store>,
    timeout: Duration,
}

impl ExpirySweeper {
    pub fn new(store: Arc<dyn Store>, timeout: Duration) -> Self {
        Self { store, timeout }
    }

    /// Demote every account with `premium = true` and `expires_at < now`.
    /// Idempotent: a second call at the same instant reports zero.
    pub async fn sweep(&self, now: OffsetDateTime) -> SubscriptionResult<u64> {
        let demoted = self.store.demote_expired(now).await?;
        if demoted > 0 {
            tracing::info!(demoted = demoted, now = %now, "Demoted expired subscriptions");
        } else {
            tracing::debug!(now = %now, "Expiry sweep found nothing to demote");
        }
        Ok(demoted)
    }

    /// Sweep without ever failing the caller.
    ///
    /// Errors and timeouts are logged and skipped; the next request's sweep
    /// is the retry. Returns the demotion count when the sweep completed.
    pub async fn maybe_sweep(&self, now: OffsetDateTime) -> Option<u64> {
        match tokio::time::timeout(self.timeout, self.sweep(now)).await {
            Ok(Ok(demoted)) => Some(demoted),
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "Expiry sweep failed, serving with current state");
                None
            }
            Err(_) => {
                tracing::warn!(
                    timeout_ms = self.timeout.as_millis() as u64,
                    "Expiry sweep timed out, serving with current state"
                );
                None
            }
        }
    }

    /// Background ticking variant. Never returns.
    pub async fn run_periodic(self, every: Duration) {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        tracing::info!(interval_secs = every.as_secs(), "Periodic expiry sweep started");
        loop {
            ticker.tick().await;
            self.maybe_sweep(OffsetDateTime::now_utc()).await;
        }
    }
}
