//! Deterministic in-memory coordination store.
//!
//! Backs the test suite and local development. Lease expiry runs off the
//! tokio clock, so tests driven with a paused runtime observe the same
//! timing the registrar and watcher see. This is not a consensus store:
//! state lives in one process and synchronization is a single mutex.

use std::collections::BTreeMap;
use std::collections::HashMap;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio::sync::mpsc;
use tokio::time::Instant;

use crate::error::ResolverError;
use crate::error::StoreError;
use crate::resolver::StoreConnector;
use crate::store::CoordinationStore;
use crate::store::KeyValue;
use crate::store::LeaseGrant;
use crate::store::ScanResult;
use crate::store::WatchEvent;
use crate::store::WatchEventType;
use crate::store::WatchStream;

/// A stored value and the lease it is bound to.
struct Entry {
    value: String,
    lease_id: u64,
}

/// A live lease and the keys attached to it.
struct LeaseRecord {
    ttl: Duration,
    deadline: Instant,
    keys: HashSet<String>,
}

/// One registered prefix watch.
struct WatcherReg {
    prefix: String,
    start_revision: u64,
    tx: mpsc::UnboundedSender<WatchEvent>,
}

#[derive(Default)]
struct Inner {
    entries: BTreeMap<String, Entry>,
    leases: HashMap<u64, LeaseRecord>,
    watchers: Vec<WatcherReg>,
    // Every dispatched event, tagged with its revision. Lets a watch
    // started at a past revision replay what it missed.
    log: Vec<(u64, WatchEvent)>,
    revision: u64,
    next_lease_id: u64,
}

impl Inner {
    /// Drop leases whose deadline has passed, deleting their keys and
    /// notifying watchers. Called lazily at the top of every operation.
    fn expire_leases(&mut self) {
        let now = Instant::now();
        let expired: Vec<u64> = self
            .leases
            .iter()
            .filter(|(_, lease)| lease.deadline <= now)
            .map(|(id, _)| *id)
            .collect();

        for lease_id in expired {
            if let Some(lease) = self.leases.remove(&lease_id) {
                for key in lease.keys {
                    if let Some(entry) = self.entries.remove(&key) {
                        self.revision += 1;
                        self.dispatch(WatchEvent {
                            event_type: WatchEventType::Delete,
                            key,
                            value: entry.value,
                        });
                    }
                }
            }
        }
    }

    /// Deliver an event to every watcher whose prefix matches, pruning
    /// watchers whose receiver has been dropped.
    fn dispatch(&mut self, event: WatchEvent) {
        let revision = self.revision;
        self.log.push((revision, event.clone()));
        self.watchers.retain(|watcher| {
            if !event.key.starts_with(&watcher.prefix) {
                return true;
            }
            if revision < watcher.start_revision {
                return true;
            }
            watcher.tx.send(event.clone()).is_ok()
        });
    }

    /// Remove an entry and detach it from its lease.
    fn remove_entry(&mut self, key: &str) -> Option<Entry> {
        let entry = self.entries.remove(key)?;
        if let Some(lease) = self.leases.get_mut(&entry.lease_id) {
            lease.keys.remove(key);
        }
        Some(entry)
    }
}

/// In-memory [`CoordinationStore`] with leases and prefix watches.
pub struct InMemoryStore {
    inner: Mutex<Inner>,
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new_inner()
    }
}

impl InMemoryStore {
    /// Create a new store wrapped in `Arc`.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::new_inner())
    }

    fn new_inner() -> Self {
        Self {
            inner: Mutex::new(Inner {
                next_lease_id: 1,
                ..Inner::default()
            }),
        }
    }

    /// Number of live keys. Test observability helper.
    pub async fn len(&self) -> usize {
        let mut inner = self.inner.lock().await;
        inner.expire_leases();
        inner.entries.len()
    }

    /// Whether the store holds no live keys.
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl CoordinationStore for InMemoryStore {
    async fn get(&self, key: &str) -> Result<Option<KeyValue>, StoreError> {
        let mut inner = self.inner.lock().await;
        inner.expire_leases();
        Ok(inner.entries.get(key).map(|entry| KeyValue {
            key: key.to_string(),
            value: entry.value.clone(),
        }))
    }

    async fn scan_prefix(&self, prefix: &str) -> Result<ScanResult, StoreError> {
        let mut inner = self.inner.lock().await;
        inner.expire_leases();
        let entries = inner
            .entries
            .range(prefix.to_string()..)
            .take_while(|(key, _)| key.starts_with(prefix))
            .map(|(key, entry)| KeyValue {
                key: key.clone(),
                value: entry.value.clone(),
            })
            .collect();
        Ok(ScanResult {
            entries,
            revision: inner.revision,
        })
    }

    async fn put_with_lease(&self, key: &str, value: &str, lease_id: u64) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().await;
        inner.expire_leases();
        if !inner.leases.contains_key(&lease_id) {
            return Err(StoreError::LeaseNotFound { lease_id });
        }

        // A rewrite under a different lease detaches the old binding.
        inner.remove_entry(key);
        inner.entries.insert(key.to_string(), Entry {
            value: value.to_string(),
            lease_id,
        });
        if let Some(lease) = inner.leases.get_mut(&lease_id) {
            lease.keys.insert(key.to_string());
        }

        inner.revision += 1;
        inner.dispatch(WatchEvent {
            event_type: WatchEventType::Put,
            key: key.to_string(),
            value: value.to_string(),
        });
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool, StoreError> {
        let mut inner = self.inner.lock().await;
        inner.expire_leases();
        match inner.remove_entry(key) {
            Some(entry) => {
                inner.revision += 1;
                inner.dispatch(WatchEvent {
                    event_type: WatchEventType::Delete,
                    key: key.to_string(),
                    value: entry.value,
                });
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn lease_grant(&self, ttl_seconds: u32) -> Result<LeaseGrant, StoreError> {
        let mut inner = self.inner.lock().await;
        inner.expire_leases();
        let lease_id = inner.next_lease_id;
        inner.next_lease_id += 1;
        let ttl = Duration::from_secs(u64::from(ttl_seconds));
        inner.leases.insert(lease_id, LeaseRecord {
            ttl,
            deadline: Instant::now() + ttl,
            keys: HashSet::new(),
        });
        Ok(LeaseGrant { lease_id, ttl_seconds })
    }

    async fn lease_keepalive(&self, lease_id: u64) -> Result<u32, StoreError> {
        let mut inner = self.inner.lock().await;
        inner.expire_leases();
        let lease = inner
            .leases
            .get_mut(&lease_id)
            .ok_or(StoreError::LeaseNotFound { lease_id })?;
        lease.deadline = Instant::now() + lease.ttl;
        Ok(lease.ttl.as_secs() as u32)
    }

    async fn lease_revoke(&self, lease_id: u64) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().await;
        inner.expire_leases();
        let lease = inner
            .leases
            .remove(&lease_id)
            .ok_or(StoreError::LeaseNotFound { lease_id })?;
        for key in lease.keys {
            if let Some(entry) = inner.entries.remove(&key) {
                inner.revision += 1;
                inner.dispatch(WatchEvent {
                    event_type: WatchEventType::Delete,
                    key,
                    value: entry.value,
                });
            }
        }
        Ok(())
    }

    async fn watch(&self, prefix: &str, start_revision: u64) -> Result<WatchStream, StoreError> {
        let mut inner = self.inner.lock().await;
        inner.expire_leases();
        let (tx, rx) = mpsc::unbounded_channel();
        // A zero start revision means "changes from now". A positive one
        // first replays logged events at or past that revision, so a change
        // landing between a snapshot and this call is still delivered.
        if start_revision > 0 {
            for (revision, event) in &inner.log {
                if *revision >= start_revision && event.key.starts_with(prefix) {
                    let _ = tx.send(event.clone());
                }
            }
        }
        inner.watchers.push(WatcherReg {
            prefix: prefix.to_string(),
            start_revision,
            tx,
        });
        Ok(rx)
    }
}

/// Connector that hands out clones of one shared [`InMemoryStore`].
///
/// Lets resolver builders in tests and local setups "connect" to the same
/// store a registrar is publishing into.
pub struct MemoryStoreConnector {
    store: Arc<InMemoryStore>,
}

impl MemoryStoreConnector {
    /// Create a connector serving the given store.
    pub fn new(store: Arc<InMemoryStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl StoreConnector for MemoryStoreConnector {
    async fn connect(&self) -> Result<Arc<dyn CoordinationStore>, ResolverError> {
        Ok(self.store.clone() as Arc<dyn CoordinationStore>)
    }
}
