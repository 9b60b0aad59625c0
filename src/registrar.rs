//! Instance registration against the coordination store.
//!
//! A [`LeaseRegistrar`] owns one instance's registration lifecycle: it
//! publishes `(key, address)` under an expiring lease and runs a periodic
//! loop that checks the registration is still present, republishing under a
//! fresh lease when it is not. Crashed or partitioned instances disappear
//! on their own once the lease runs out.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::debug;
use tracing::info;
use tracing::warn;
use uuid::Uuid;

use crate::config::RegistrarConfig;
use crate::error::RegistrarError;
use crate::lease::LeaseKeepaliveHandle;
use crate::lease::start_keepalive;
use crate::store::CoordinationStore;

/// Capability set shared by all registrar variants.
///
/// The lease-based [`LeaseRegistrar`] implements it here; an agent-catalog
/// variant (health-check based liveness) satisfies the same contract
/// elsewhere. Callers that start and stop a service instance depend only on
/// this trait.
#[async_trait]
pub trait Registrar: Send + Sync {
    /// Start keeping this instance's registration alive. Returns after the
    /// background loop is scheduled; it does not block on store traffic.
    async fn register(&self) -> Result<(), RegistrarError>;

    /// Stop the keep-alive loop and remove this instance's registration.
    ///
    /// The stop signal and the delete are not atomic. A loop iteration that
    /// has already read its own key when the delete lands republishes once
    /// more; the key then lingers until the loop observes the stop signal
    /// and the orphaned lease runs out, at most one tick plus one lease
    /// TTL. Callers that need the key gone immediately should delete it
    /// again after the loop has stopped.
    async fn deregister(&self) -> Result<(), RegistrarError>;

    /// Logical service name this instance belongs to.
    fn service_name(&self) -> &str;

    /// This instance's published network address.
    fn service_address(&self) -> &str;
}

/// Lease-based registrar over a [`CoordinationStore`].
pub struct LeaseRegistrar {
    store: Arc<dyn CoordinationStore>,
    service_name: String,
    service_address: String,
    registration_key: String,
    renew_interval: Duration,
    lease_ttl_seconds: u32,
    stop_tx: mpsc::Sender<()>,
    // Taken by the loop task on register(); None afterwards.
    stop_rx: Mutex<Option<mpsc::Receiver<()>>>,
}

impl LeaseRegistrar {
    /// Create a registrar for one service instance.
    ///
    /// Validates the configured address and draws a random instance ID; the
    /// registration key is `{scheme}/{service_name}/{instance_id}`. Setup
    /// errors are fatal and returned here, before any loop is started.
    pub fn new(config: RegistrarConfig, store: Arc<dyn CoordinationStore>) -> Result<Self, RegistrarError> {
        parse_host_port(&config.service_address)?;

        let instance_id = Uuid::new_v4();
        let registration_key = format!("{}/{}/{}", config.scheme, config.service_name, instance_id);

        // Capacity one: a single deregister is observed even if the loop is
        // mid-tick when it arrives.
        let (stop_tx, stop_rx) = mpsc::channel(1);
        let renew_interval = config.renew_interval();

        Ok(Self {
            store,
            service_name: config.service_name,
            service_address: config.service_address,
            registration_key,
            renew_interval,
            lease_ttl_seconds: config.lease_ttl_seconds,
            stop_tx,
            stop_rx: Mutex::new(Some(stop_rx)),
        })
    }

    /// The full store key this instance registers under.
    pub fn registration_key(&self) -> &str {
        &self.registration_key
    }
}

#[async_trait]
impl Registrar for LeaseRegistrar {
    async fn register(&self) -> Result<(), RegistrarError> {
        let stop_rx = self
            .stop_rx
            .lock()
            .await
            .take()
            .ok_or(RegistrarError::AlreadyRegistered)?;

        let store = self.store.clone();
        let key = self.registration_key.clone();
        let address = self.service_address.clone();
        let interval = self.renew_interval;
        let ttl_seconds = self.lease_ttl_seconds;

        info!(key = %key, address = %address, "registration loop starting");
        tokio::spawn(async move {
            run_registration_loop(store, key, address, ttl_seconds, interval, stop_rx).await;
        });
        Ok(())
    }

    async fn deregister(&self) -> Result<(), RegistrarError> {
        // Non-blocking handoff; a second concurrent call finds the slot full
        // and still proceeds to the delete.
        let _ = self.stop_tx.try_send(());
        self.store.delete(&self.registration_key).await?;
        info!(key = %self.registration_key, "instance deregistered");
        Ok(())
    }

    fn service_name(&self) -> &str {
        &self.service_name
    }

    fn service_address(&self) -> &str {
        &self.service_address
    }
}

/// Periodic registration check.
///
/// Each iteration reads the instance's own key and republishes it when
/// absent; store errors are logged and retried next tick so transient
/// unavailability self-heals. The loop exits only through the stop signal.
async fn run_registration_loop(
    store: Arc<dyn CoordinationStore>,
    key: String,
    address: String,
    ttl_seconds: u32,
    interval: Duration,
    mut stop_rx: mpsc::Receiver<()>,
) {
    // First check runs immediately; the ticker paces the rest.
    let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    let mut keepalive: Option<LeaseKeepaliveHandle> = None;

    loop {
        match store.get(&key).await {
            Err(e) => {
                warn!(key = %key, error = %e, "registration check failed");
            }
            Ok(Some(_)) => {}
            Ok(None) => match publish(&store, &key, &address, ttl_seconds).await {
                Ok(handle) => {
                    if let Some(old) = keepalive.take() {
                        old.stop();
                    }
                    info!(key = %key, lease_id = handle.lease_id(), "registration published");
                    keepalive = Some(handle);
                }
                Err(e) => {
                    warn!(key = %key, error = %e, "failed to publish registration");
                }
            },
        }

        tokio::select! {
            _ = ticker.tick() => {}
            _ = stop_rx.recv() => {
                if let Some(handle) = keepalive.take() {
                    handle.stop();
                }
                debug!(key = %key, "registration loop stopped");
                return;
            }
        }
    }
}

/// Acquire a fresh lease, write the registration under it, and start the
/// continuous renewal task for the new lease.
async fn publish(
    store: &Arc<dyn CoordinationStore>,
    key: &str,
    address: &str,
    ttl_seconds: u32,
) -> Result<LeaseKeepaliveHandle, RegistrarError> {
    let lease = store.lease_grant(ttl_seconds).await?;
    store.put_with_lease(key, address, lease.lease_id).await?;

    let renew_every = Duration::from_secs(u64::from(ttl_seconds / 3).max(1));
    Ok(start_keepalive(store.clone(), lease.lease_id, renew_every))
}

/// Validate a `host:port` service address.
fn parse_host_port(address: &str) -> Result<(&str, u16), RegistrarError> {
    let invalid = |reason: &str| RegistrarError::InvalidAddress {
        address: address.to_string(),
        reason: reason.to_string(),
    };

    let (host, port) = address.rsplit_once(':').ok_or_else(|| invalid("missing port"))?;
    if host.is_empty() {
        return Err(invalid("missing host"));
    }
    let port: u16 = port.parse().map_err(|_| invalid("port is not a number in 0..=65535"))?;
    Ok((host, port))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::InMemoryStore;

    fn config() -> RegistrarConfig {
        RegistrarConfig::new("payments", "10.0.0.1:7000")
    }

    #[test]
    fn parse_host_port_accepts_valid_addresses() {
        assert_eq!(parse_host_port("10.0.0.1:7000").unwrap(), ("10.0.0.1", 7000));
        assert_eq!(parse_host_port("node-3.internal:80").unwrap(), ("node-3.internal", 80));
    }

    #[test]
    fn parse_host_port_rejects_malformed_addresses() {
        assert!(matches!(
            parse_host_port("localhost"),
            Err(RegistrarError::InvalidAddress { .. })
        ));
        assert!(matches!(parse_host_port(":7000"), Err(RegistrarError::InvalidAddress { .. })));
        assert!(matches!(
            parse_host_port("10.0.0.1:http"),
            Err(RegistrarError::InvalidAddress { .. })
        ));
        assert!(matches!(
            parse_host_port("10.0.0.1:99999"),
            Err(RegistrarError::InvalidAddress { .. })
        ));
    }

    #[test]
    fn new_rejects_invalid_address() {
        let store = InMemoryStore::new();
        let config = RegistrarConfig::new("payments", "no-port");
        let err = LeaseRegistrar::new(config, store).err().unwrap();
        assert!(matches!(err, RegistrarError::InvalidAddress { .. }));
    }

    #[tokio::test]
    async fn registration_key_embeds_scheme_and_service() {
        let store = InMemoryStore::new();
        let registrar = LeaseRegistrar::new(config(), store).unwrap();
        assert!(registrar.registration_key().starts_with("lodestar/payments/"));
        assert_eq!(registrar.service_name(), "payments");
        assert_eq!(registrar.service_address(), "10.0.0.1:7000");
    }

    #[tokio::test]
    async fn distinct_instances_get_distinct_keys() {
        let store = InMemoryStore::new();
        let a = LeaseRegistrar::new(config(), store.clone()).unwrap();
        let b = LeaseRegistrar::new(config(), store).unwrap();
        assert_ne!(a.registration_key(), b.registration_key());
    }

    #[tokio::test(start_paused = true)]
    async fn second_register_call_fails() {
        let store = InMemoryStore::new();
        let registrar = LeaseRegistrar::new(config(), store).unwrap();
        registrar.register().await.unwrap();
        let err = registrar.register().await.unwrap_err();
        assert!(matches!(err, RegistrarError::AlreadyRegistered));
        registrar.deregister().await.unwrap();
    }
}
