//! Error types for registration and discovery operations.
//!
//! Errors that have a synchronous caller (setup, deregistration, builder
//! construction) are returned through these enums. Errors that occur on a
//! background task with no caller to report to are logged and absorbed at
//! the point they occur.

use thiserror::Error;

/// Errors surfaced by a [`CoordinationStore`](crate::store::CoordinationStore)
/// implementation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// Backend failed (network/storage/etc).
    #[error("store operation failed: {reason}")]
    Backend {
        /// Description of the backend failure.
        reason: String,
    },
    /// The referenced lease does not exist or has already expired.
    #[error("lease {lease_id} not found")]
    LeaseNotFound {
        /// Lease ID the caller attempted to use.
        lease_id: u64,
    },
    /// The store connection was closed while an operation was in flight.
    #[error("store connection closed")]
    ConnectionClosed,
}

/// Errors surfaced by [`Registrar`](crate::registrar::Registrar) operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistrarError {
    /// The configured service address is not a valid `host:port` pair.
    #[error("invalid service address '{address}': {reason}")]
    InvalidAddress {
        /// Address string that failed validation.
        address: String,
        /// Why the address was rejected.
        reason: String,
    },
    /// `register` was called on a registrar whose loop is already running.
    #[error("registrar already started")]
    AlreadyRegistered,
    /// A store operation invoked on behalf of the caller failed.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Errors surfaced by resolver construction and the scheme registry.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolverError {
    /// A builder is already registered for this scheme.
    #[error("scheme '{scheme}' already has a registered builder")]
    DuplicateScheme {
        /// Scheme that was registered twice.
        scheme: String,
    },
    /// No builder is registered for the target's scheme.
    #[error("no resolver builder registered for scheme '{scheme}'")]
    UnknownScheme {
        /// Scheme the caller asked for.
        scheme: String,
    },
    /// The target URI does not have the `{scheme}:///{service}` shape.
    #[error("invalid target '{target}': {reason}")]
    InvalidTarget {
        /// Target URI that failed to parse.
        target: String,
        /// Why the target was rejected.
        reason: String,
    },
    /// Constructing the store connection for a watch session failed.
    #[error("store connection failed: {reason}")]
    Connect {
        /// Description of the connection failure.
        reason: String,
    },
    /// The initial prefix snapshot failed, so no watch session was started.
    #[error("initial snapshot of '{prefix}' failed: {source}")]
    Snapshot {
        /// Key prefix the snapshot targeted.
        prefix: String,
        /// Underlying store failure.
        source: StoreError,
    },
    /// A store operation invoked on behalf of the caller failed.
    #[error(transparent)]
    Store(#[from] StoreError),
}
