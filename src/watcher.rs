//! The watch-driven address-set synchronizer.
//!
//! A session takes an initial snapshot of all registrations under a
//! service's key prefix, pushes the deduplicated set to the sink, then
//! consumes the prefix's change stream, applying add/remove deltas and
//! republishing the full set after each accepted change. The snapshot and
//! subscription happen before the background task is spawned, so their
//! failures surface to the `build` caller instead of killing the process.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::warn;

use crate::error::ResolverError;
use crate::resolver::AddressSet;
use crate::resolver::AddressSink;
use crate::resolver::Target;
use crate::store::CoordinationStore;
use crate::store::WatchEvent;
use crate::store::WatchEventType;
use crate::store::WatchStream;

/// Handle to one running watch session.
///
/// Dropping the handle leaves the session running; [`close`](Self::close)
/// tears it down deterministically.
#[derive(Debug)]
pub struct WatchSession {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl WatchSession {
    /// Snapshot the prefix, push the initial state, subscribe to changes
    /// after the snapshot revision, and spawn the synchronizer loop.
    pub(crate) async fn start(
        store: Arc<dyn CoordinationStore>,
        target: &Target,
        sink: Arc<dyn AddressSink>,
    ) -> Result<Self, ResolverError> {
        let prefix = target.key_prefix();

        let snapshot = store.scan_prefix(&prefix).await.map_err(|source| ResolverError::Snapshot {
            prefix: prefix.clone(),
            source,
        })?;

        let mut set = AddressSet::new(target.endpoint.clone());
        for entry in snapshot.entries {
            set.insert(&entry.value);
        }
        sink.update_state(set.to_state());

        let events = store.watch(&prefix, snapshot.revision + 1).await?;
        debug!(prefix = %prefix, addresses = set.len(), "watch session started");

        let cancel = CancellationToken::new();
        let task = tokio::spawn(run_watch_loop(store, prefix, set, events, sink, cancel.clone()));
        Ok(Self { cancel, task })
    }

    /// Hint that the consumer wants a fresh resolution. The watch stream
    /// already keeps the set current, so this is a no-op.
    pub fn resolve_now(&self) {}

    /// Terminate the background task and release the store connection.
    /// Returns once the loop has exited.
    pub async fn close(self) {
        self.cancel.cancel();
        if let Err(e) = self.task.await {
            warn!(error = %e, "watch task did not shut down cleanly");
        }
    }
}

/// Consume the change stream until cancelled or the stream ends.
///
/// The store handle is held here so the connection lives exactly as long as
/// the loop.
async fn run_watch_loop(
    _store: Arc<dyn CoordinationStore>,
    prefix: String,
    mut set: AddressSet,
    mut events: WatchStream,
    sink: Arc<dyn AddressSink>,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                debug!(prefix = %prefix, "watch session closed");
                return;
            }
            event = events.recv() => match event {
                None => {
                    debug!(prefix = %prefix, "watch stream ended");
                    return;
                }
                Some(event) => {
                    if apply_event(&mut set, &event) {
                        sink.update_state(set.to_state());
                    }
                }
            }
        }
    }
}

/// Apply one store event to the set. Returns whether the set changed; only
/// changes are republished.
fn apply_event(set: &mut AddressSet, event: &WatchEvent) -> bool {
    match event.event_type {
        WatchEventType::Put => set.insert(&event.value),
        WatchEventType::Delete => set.remove(&event.value),
    }
}
