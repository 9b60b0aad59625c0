//! Registrar and resolver configuration.
//!
//! Plain serde-backed structs with sensible defaults. Store endpoint and
//! credential fields are carried here and handed to whichever
//! [`StoreConnector`](crate::resolver::StoreConnector) the deployment uses;
//! the in-memory backend ignores them.

use std::time::Duration;

use serde::Deserialize;
use serde::Serialize;

/// Default values for configuration
mod defaults {
    pub fn scheme() -> String {
        "lodestar".to_string()
    }

    pub fn renew_interval_secs() -> u64 {
        3
    }

    pub fn lease_ttl_seconds() -> u32 {
        6
    }
}

/// Probe interval of the external health-check registrar variant.
///
/// The agent-catalog registrar (TCP-check based liveness) is not implemented
/// here, but its timing contract is shared with callers of the
/// [`Registrar`](crate::registrar::Registrar) trait, so the constants live
/// alongside the lease-based configuration.
pub const HEALTH_CHECK_INTERVAL_SECS: u64 = 5;

/// Timeout for a single health check of the agent-catalog variant.
pub const HEALTH_CHECK_TIMEOUT_SECS: u64 = 3;

/// How long the agent-catalog variant leaves a critical instance registered
/// before removing it.
pub const DEREGISTER_CRITICAL_AFTER_SECS: u64 = 60;

/// Configuration for a [`LeaseRegistrar`](crate::registrar::LeaseRegistrar).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistrarConfig {
    /// Logical service name shared by all interchangeable instances.
    pub service_name: String,
    /// This instance's reachable address as `host:port`.
    pub service_address: String,
    /// URI scheme the service is published under. Must match the scheme of
    /// the resolver builder clients use for discovery.
    #[serde(default = "defaults::scheme")]
    pub scheme: String,
    /// Seconds between registration-presence checks.
    #[serde(default = "defaults::renew_interval_secs")]
    pub renew_interval_secs: u64,
    /// Lease time-to-live in seconds. Should exceed the renew interval so a
    /// single missed tick does not drop the registration.
    #[serde(default = "defaults::lease_ttl_seconds")]
    pub lease_ttl_seconds: u32,
}

impl RegistrarConfig {
    /// Create a configuration with default scheme and timing.
    pub fn new(service_name: impl Into<String>, service_address: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
            service_address: service_address.into(),
            scheme: defaults::scheme(),
            renew_interval_secs: defaults::renew_interval_secs(),
            lease_ttl_seconds: defaults::lease_ttl_seconds(),
        }
    }

    /// The presence-check interval as a [`Duration`].
    pub fn renew_interval(&self) -> Duration {
        Duration::from_secs(self.renew_interval_secs)
    }
}

/// Endpoints and credentials for constructing a store connection.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreEndpoints {
    /// Store endpoint addresses.
    #[serde(default)]
    pub endpoints: Vec<String>,
    /// Optional username for store authentication.
    #[serde(default)]
    pub username: Option<String>,
    /// Optional password for store authentication.
    #[serde(default)]
    pub password: Option<String>,
}

/// Configuration for the client-side resolver builder.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolverConfig {
    /// URI scheme this builder answers to.
    #[serde(default = "defaults::scheme")]
    pub scheme: String,
    /// Store connection parameters for watch sessions.
    #[serde(default)]
    pub store: StoreEndpoints,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            scheme: defaults::scheme(),
            store: StoreEndpoints::default(),
        }
    }
}
