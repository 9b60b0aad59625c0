//! Background lease renewal.
//!
//! A registration stays alive only while its lease keeps being refreshed.
//! [`start_keepalive`] spawns the long-lived renewal task for one lease;
//! the registrar's periodic tick, not this task, is what detects a lost
//! registration and republishes it.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::warn;

use crate::store::CoordinationStore;

/// Start automatic keepalive for a lease.
///
/// Spawns a background task that refreshes the lease's TTL at the given
/// interval (TTL/3 is a reasonable choice) until the returned handle is
/// stopped. Renewal failures are logged and retried at the next tick; the
/// lease may still be live even when a single renewal fails.
pub fn start_keepalive(store: Arc<dyn CoordinationStore>, lease_id: u64, interval: Duration) -> LeaseKeepaliveHandle {
    let cancel = CancellationToken::new();
    let cancel_clone = cancel.clone();

    tokio::spawn(async move {
        run_keepalive_loop(store, lease_id, interval, cancel_clone).await;
    });

    LeaseKeepaliveHandle { cancel, lease_id }
}

/// Run the keepalive loop until cancelled or the lease disappears.
async fn run_keepalive_loop(
    store: Arc<dyn CoordinationStore>,
    lease_id: u64,
    interval: Duration,
    cancel: CancellationToken,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    debug!(lease_id, interval_secs = interval.as_secs(), "lease keepalive started");

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                debug!(lease_id, "lease keepalive stopped by cancel");
                break;
            }
            _ = ticker.tick() => {
                match store.lease_keepalive(lease_id).await {
                    Ok(ttl) => {
                        debug!(lease_id, ttl_seconds = ttl, "lease keepalive succeeded");
                    }
                    Err(e) => {
                        warn!(lease_id, error = %e, "lease keepalive failed");
                    }
                }
            }
        }
    }
}

/// Owner of one renewal task.
///
/// Dropping the handle does not end renewal; the task keeps refreshing the
/// lease until [`stop`](Self::stop) is called. The registrar depends on
/// this when it swaps handles between ticks.
#[derive(Debug)]
pub struct LeaseKeepaliveHandle {
    cancel: CancellationToken,
    lease_id: u64,
}

impl LeaseKeepaliveHandle {
    /// End renewal. The lease runs out after its remaining TTL and the
    /// store deletes the keys bound to it.
    pub fn stop(self) {
        self.cancel.cancel();
    }

    /// The lease this task renews.
    pub fn lease_id(&self) -> u64 {
        self.lease_id
    }

    /// Whether renewal has not been stopped yet.
    pub fn is_running(&self) -> bool {
        !self.cancel.is_cancelled()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::InMemoryStore;

    #[tokio::test(start_paused = true)]
    async fn keepalive_keeps_lease_alive_past_its_ttl() {
        let store = InMemoryStore::new();
        let lease = store.lease_grant(2).await.unwrap();
        store.put_with_lease("svc/a/1", "10.0.0.1:80", lease.lease_id).await.unwrap();

        let handle = start_keepalive(store.clone(), lease.lease_id, Duration::from_secs(1));
        assert_eq!(handle.lease_id(), lease.lease_id);

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert!(store.get("svc/a/1").await.unwrap().is_some());

        handle.stop();
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert!(store.get("svc/a/1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn handle_reports_running_state() {
        let store = InMemoryStore::new();
        let lease = store.lease_grant(60).await.unwrap();
        let handle = start_keepalive(store, lease.lease_id, Duration::from_secs(20));
        assert!(handle.is_running());
        handle.stop();
    }
}
