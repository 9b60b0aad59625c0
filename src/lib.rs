//! Lease-based service registration and watch-driven discovery.
//!
//! A fleet of interchangeable service instances publishes reachability to a
//! shared coordination store; RPC clients discover and continuously track
//! the live address set for client-side load balancing.
//!
//! Server side, a [`LeaseRegistrar`] keeps one instance's `(key, address)`
//! registration alive under an expiring lease, so crashed or partitioned
//! instances disappear automatically. Client side, a
//! [`ResolverBuilder`] constructs a [`WatchSession`] that snapshots a
//! service's key prefix, then applies the store's change stream to a
//! deduplicated [`AddressSet`], pushing full [`ResolverState`] replacements
//! into the load balancer's [`AddressSink`].
//!
//! The store itself is a seam: anything implementing [`CoordinationStore`]
//! (lease grant/renew, lease-bound writes, prefix reads, prefix watches)
//! plugs in. [`store::memory::InMemoryStore`] is a deterministic backend
//! for tests and local development.
//!
//! ## Usage
//!
//! ```ignore
//! use std::sync::Arc;
//!
//! use lodestar::LeaseRegistrar;
//! use lodestar::Registrar;
//! use lodestar::RegistrarConfig;
//! use lodestar::SchemeRegistry;
//! use lodestar::StoreResolverBuilder;
//!
//! // Server process: publish this instance.
//! let registrar = LeaseRegistrar::new(
//!     RegistrarConfig::new("payments", "10.0.0.1:7000"),
//!     store.clone(),
//! )?;
//! registrar.register().await?;
//! // ... serve traffic ...
//! registrar.deregister().await?;
//!
//! // Client process: track the live instance set.
//! let registry = SchemeRegistry::new();
//! registry.register(Arc::new(StoreResolverBuilder::new("lodestar", connector)))?;
//! let session = registry.build("lodestar:///payments", balancer_sink).await?;
//! // ... balancer receives ResolverState updates ...
//! session.close().await;
//! ```

pub mod config;
pub mod error;
pub mod lease;
pub mod registrar;
pub mod registry;
pub mod resolver;
pub mod store;
pub mod watcher;

pub use config::RegistrarConfig;
pub use config::ResolverConfig;
pub use config::StoreEndpoints;
pub use error::RegistrarError;
pub use error::ResolverError;
pub use error::StoreError;
pub use lease::LeaseKeepaliveHandle;
pub use lease::start_keepalive;
pub use registrar::LeaseRegistrar;
pub use registrar::Registrar;
pub use registry::SchemeRegistry;
pub use resolver::Address;
pub use resolver::AddressSet;
pub use resolver::AddressSink;
pub use resolver::ResolverBuilder;
pub use resolver::ResolverState;
pub use resolver::StoreConnector;
pub use resolver::StoreResolverBuilder;
pub use resolver::Target;
pub use store::CoordinationStore;
pub use store::KeyValue;
pub use store::LeaseGrant;
pub use store::ScanResult;
pub use store::WatchEvent;
pub use store::WatchEventType;
pub use store::WatchStream;
pub use watcher::WatchSession;
