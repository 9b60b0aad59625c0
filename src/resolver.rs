//! Client-side name resolution for load balancing.
//!
//! A [`ResolverBuilder`] turns a `{scheme}:///{service}` target into a
//! running [`WatchSession`](crate::watcher::WatchSession) that keeps an
//! [`AddressSet`] synchronized with the store and pushes full
//! [`ResolverState`] snapshots into an [`AddressSink`], the RPC layer's
//! load-balancing consumer.

use std::sync::Arc;

use async_trait::async_trait;

use crate::config::ResolverConfig;
use crate::error::ResolverError;
use crate::store::CoordinationStore;
use crate::watcher::WatchSession;

/// One resolved backend address as handed to the load balancer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Address {
    /// Network address, `host:port`.
    pub address: String,
    /// Logical service name the address belongs to.
    pub service_name: String,
}

/// Full address-set snapshot pushed to the sink.
///
/// Every accepted change produces a complete replacement; there is no
/// incremental protocol toward the consumer. Order within `addresses` is
/// not significant.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolverState {
    /// Current deduplicated addresses for the service.
    pub addresses: Vec<Address>,
}

/// Consumer of resolver state updates.
///
/// Updates are monotonic: a sink never observes a snapshot older than one
/// it has already observed.
pub trait AddressSink: Send + Sync {
    /// Receive a full replacement of the address set.
    fn update_state(&self, state: ResolverState);
}

/// A parsed resolver target, `{scheme}:///{service}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    /// URI scheme selecting the builder.
    pub scheme: String,
    /// Logical service name; becomes the watched key-prefix segment.
    pub endpoint: String,
}

impl Target {
    /// Parse a target URI of the form `{scheme}:///{service}`.
    pub fn parse(uri: &str) -> Result<Self, ResolverError> {
        let invalid = |reason: &str| ResolverError::InvalidTarget {
            target: uri.to_string(),
            reason: reason.to_string(),
        };

        let (scheme, endpoint) = uri.split_once(":///").ok_or_else(|| invalid("expected '{scheme}:///{service}'"))?;
        if scheme.is_empty() {
            return Err(invalid("missing scheme"));
        }
        if endpoint.is_empty() || endpoint.contains('/') {
            return Err(invalid("service name must be a single non-empty path segment"));
        }
        Ok(Self {
            scheme: scheme.to_string(),
            endpoint: endpoint.to_string(),
        })
    }

    /// The store key prefix all of this service's registrations live under.
    pub fn key_prefix(&self) -> String {
        format!("{}/{}/", self.scheme, self.endpoint)
    }
}

/// Deduplicated set of live addresses for one service.
///
/// Owned and mutated only by the watch task that holds it, so no locking.
/// Uniqueness is by address value: two registrations publishing the same
/// address collapse to one entry. Linear scans are fine at fleet sizes of
/// tens to low hundreds.
#[derive(Debug)]
pub struct AddressSet {
    service_name: String,
    addresses: Vec<Address>,
}

impl AddressSet {
    /// Create an empty set for one service.
    pub fn new(service_name: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
            addresses: Vec::new(),
        }
    }

    /// Whether the address value is already a member.
    pub fn contains(&self, address: &str) -> bool {
        self.addresses.iter().any(|a| a.address == address)
    }

    /// Add an address. Returns false (unchanged) if already present.
    pub fn insert(&mut self, address: &str) -> bool {
        if self.contains(address) {
            return false;
        }
        self.addresses.push(Address {
            address: address.to_string(),
            service_name: self.service_name.clone(),
        });
        true
    }

    /// Remove an address by value. Returns whether it was present.
    pub fn remove(&mut self, address: &str) -> bool {
        match self.addresses.iter().position(|a| a.address == address) {
            Some(index) => {
                self.addresses.swap_remove(index);
                true
            }
            None => false,
        }
    }

    /// Number of distinct addresses.
    pub fn len(&self) -> usize {
        self.addresses.len()
    }

    /// Whether the set holds no addresses.
    pub fn is_empty(&self) -> bool {
        self.addresses.is_empty()
    }

    /// Snapshot the set as a full [`ResolverState`].
    pub fn to_state(&self) -> ResolverState {
        ResolverState {
            addresses: self.addresses.clone(),
        }
    }
}

/// Factory for the store connection a watch session owns.
///
/// Each `build` call constructs its own connection from the configured
/// endpoints and credentials; sessions never share one. Connection
/// construction failures surface synchronously from `build`.
#[async_trait]
pub trait StoreConnector: Send + Sync {
    /// Construct a fresh store connection.
    async fn connect(&self) -> Result<Arc<dyn CoordinationStore>, ResolverError>;
}

/// Factory constructing watch sessions for one URI scheme.
#[async_trait]
pub trait ResolverBuilder: Send + Sync {
    /// The fixed scheme this builder answers to.
    fn scheme(&self) -> &str;

    /// Start a watch session for the target and hand updates to `sink`.
    ///
    /// Connection and initial-snapshot failures are returned here; once the
    /// session is running, its errors are logged on the background task.
    async fn build(&self, target: &Target, sink: Arc<dyn AddressSink>) -> Result<WatchSession, ResolverError>;
}

/// [`ResolverBuilder`] backed by a [`CoordinationStore`].
pub struct StoreResolverBuilder {
    scheme: String,
    connector: Arc<dyn StoreConnector>,
}

impl StoreResolverBuilder {
    /// Create a builder answering to `scheme`, connecting through
    /// `connector` on every `build`.
    pub fn new(scheme: impl Into<String>, connector: Arc<dyn StoreConnector>) -> Self {
        Self {
            scheme: scheme.into(),
            connector,
        }
    }

    /// Create a builder from resolver configuration. The connector is
    /// expected to have been constructed from the same configuration's
    /// store endpoints.
    pub fn from_config(config: &ResolverConfig, connector: Arc<dyn StoreConnector>) -> Self {
        Self::new(config.scheme.clone(), connector)
    }
}

#[async_trait]
impl ResolverBuilder for StoreResolverBuilder {
    fn scheme(&self) -> &str {
        &self.scheme
    }

    async fn build(&self, target: &Target, sink: Arc<dyn AddressSink>) -> Result<WatchSession, ResolverError> {
        if target.scheme != self.scheme {
            return Err(ResolverError::InvalidTarget {
                target: format!("{}:///{}", target.scheme, target.endpoint),
                reason: format!("builder answers to scheme '{}'", self.scheme),
            });
        }
        let store = self.connector.connect().await?;
        WatchSession::start(store, target, sink).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn target_parses_scheme_and_service() {
        let target = Target::parse("lodestar:///payments").unwrap();
        assert_eq!(target.scheme, "lodestar");
        assert_eq!(target.endpoint, "payments");
        assert_eq!(target.key_prefix(), "lodestar/payments/");
    }

    #[test]
    fn target_rejects_malformed_uris() {
        for uri in [
            "payments",
            "lodestar://payments",
            ":///payments",
            "lodestar:///",
            "lodestar:///payments/extra",
        ] {
            assert!(matches!(Target::parse(uri), Err(ResolverError::InvalidTarget { .. })), "accepted {uri}");
        }
    }

    #[test]
    fn address_set_dedups_by_value() {
        let mut set = AddressSet::new("payments");
        assert!(set.insert("10.0.0.1:80"));
        assert!(!set.insert("10.0.0.1:80"));
        assert_eq!(set.len(), 1);
        assert!(set.contains("10.0.0.1:80"));
    }

    #[test]
    fn address_set_remove_reports_membership() {
        let mut set = AddressSet::new("payments");
        set.insert("10.0.0.1:80");
        set.insert("10.0.0.2:80");
        assert!(set.remove("10.0.0.1:80"));
        assert!(!set.remove("10.0.0.1:80"));
        assert_eq!(set.len(), 1);
        assert!(set.contains("10.0.0.2:80"));
    }

    #[test]
    fn address_set_remove_keeps_remaining_members() {
        let mut set = AddressSet::new("payments");
        for address in ["10.0.0.1:80", "10.0.0.2:80", "10.0.0.3:80"] {
            set.insert(address);
        }
        set.remove("10.0.0.2:80");
        assert!(set.contains("10.0.0.1:80"));
        assert!(set.contains("10.0.0.3:80"));
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn state_snapshot_carries_service_name() {
        let mut set = AddressSet::new("payments");
        set.insert("10.0.0.1:80");
        let state = set.to_state();
        assert_eq!(state.addresses.len(), 1);
        assert_eq!(state.addresses[0].service_name, "payments");
        assert_eq!(state.addresses[0].address, "10.0.0.1:80");
    }
}
