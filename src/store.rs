//! The coordination-store seam.
//!
//! Defines the [`CoordinationStore`] trait the registrar and watcher are
//! written against, together with the value types that cross it. The crate
//! does not implement a distributed store; [`memory`] provides a
//! deterministic in-memory backend for tests and local development, and
//! production deployments plug in a client for their store of choice.

pub mod memory;

use async_trait::async_trait;
use serde::Deserialize;
use serde::Serialize;
use tokio::sync::mpsc;

use crate::error::StoreError;

/// A key-value entry returned by reads and scans.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyValue {
    /// Full key, e.g. `lodestar/payments/9f6b…`.
    pub key: String,
    /// Raw value payload. For registrations this is the `host:port` string.
    pub value: String,
}

/// Result of a prefix scan: the matching entries plus the store revision
/// the snapshot was taken at. Watches started at `revision + 1` observe
/// exactly the changes that happen after this snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanResult {
    /// Entries whose key starts with the scanned prefix.
    pub entries: Vec<KeyValue>,
    /// Store revision at snapshot time.
    pub revision: u64,
}

/// A granted lease.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LeaseGrant {
    /// Unique lease ID assigned by the store.
    pub lease_id: u64,
    /// Granted time-to-live in seconds.
    pub ttl_seconds: u32,
}

/// Kind of change carried by a watch event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WatchEventType {
    Put,
    Delete,
}

/// A single change under a watched prefix.
///
/// For `Delete` events `value` carries the deleted key's previous value, so
/// consumers that track values rather than keys can apply the removal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WatchEvent {
    /// Whether the key was written or removed.
    pub event_type: WatchEventType,
    /// Key the event applies to.
    pub key: String,
    /// Current value for `Put`, previous value for `Delete`.
    pub value: String,
}

/// Receiving half of a prefix watch. The stream ends when the store side
/// drops the subscription (connection closed or store shut down).
pub type WatchStream = mpsc::UnboundedReceiver<WatchEvent>;

/// Client interface to a distributed coordination store.
///
/// The store is expected to provide atomic lease grant/renew/revoke,
/// lease-bound writes, prefix range reads, and a prefix-scoped change
/// stream. Each registrar and each watch session owns its own store handle;
/// nothing in this crate shares mutable state across tasks through it.
#[async_trait]
pub trait CoordinationStore: Send + Sync + 'static {
    /// Read a single key.
    async fn get(&self, key: &str) -> Result<Option<KeyValue>, StoreError>;

    /// Read all keys under a prefix along with the snapshot revision.
    async fn scan_prefix(&self, prefix: &str) -> Result<ScanResult, StoreError>;

    /// Write a key bound to a lease. The key is deleted automatically when
    /// the lease expires or is revoked.
    async fn put_with_lease(&self, key: &str, value: &str, lease_id: u64) -> Result<(), StoreError>;

    /// Delete a key. Returns whether the key existed.
    async fn delete(&self, key: &str) -> Result<bool, StoreError>;

    /// Grant a new lease with the given TTL.
    async fn lease_grant(&self, ttl_seconds: u32) -> Result<LeaseGrant, StoreError>;

    /// Refresh a lease, resetting its deadline to TTL from now. Returns the
    /// lease TTL in seconds.
    async fn lease_keepalive(&self, lease_id: u64) -> Result<u32, StoreError>;

    /// Revoke a lease, deleting all keys bound to it.
    async fn lease_revoke(&self, lease_id: u64) -> Result<(), StoreError>;

    /// Subscribe to changes under a prefix. A `start_revision` of zero
    /// means changes from now on; a positive one must also deliver the
    /// changes that already happened at or past that revision, so history
    /// between a snapshot and the subscription is never lost.
    async fn watch(&self, prefix: &str, start_revision: u64) -> Result<WatchStream, StoreError>;
}
