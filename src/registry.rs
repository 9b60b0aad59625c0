//! Scheme-to-builder registry.
//!
//! Instead of a process-wide global, the mapping from URI scheme to
//! [`ResolverBuilder`] is an explicit object handed to client construction.
//! Registering a second builder for a scheme is an error, not a silent
//! overwrite.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::RwLock;

use tracing::debug;

use crate::error::ResolverError;
use crate::resolver::AddressSink;
use crate::resolver::ResolverBuilder;
use crate::resolver::Target;
use crate::watcher::WatchSession;

/// Registry of resolver builders keyed by scheme.
///
/// Thread-safe; readers proceed concurrently, registration takes exclusive
/// access.
#[derive(Default)]
pub struct SchemeRegistry {
    builders: RwLock<HashMap<String, Arc<dyn ResolverBuilder>>>,
}

impl SchemeRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a builder under its scheme.
    ///
    /// Fails with [`ResolverError::DuplicateScheme`] if the scheme is
    /// already taken.
    pub fn register(&self, builder: Arc<dyn ResolverBuilder>) -> Result<(), ResolverError> {
        let scheme = builder.scheme().to_string();
        let mut builders = self.builders.write().unwrap_or_else(|poisoned| poisoned.into_inner());
        if builders.contains_key(&scheme) {
            return Err(ResolverError::DuplicateScheme { scheme });
        }
        debug!(scheme = %scheme, "resolver builder registered");
        builders.insert(scheme, builder);
        Ok(())
    }

    /// Look up the builder for a scheme.
    pub fn lookup(&self, scheme: &str) -> Option<Arc<dyn ResolverBuilder>> {
        let builders = self.builders.read().unwrap_or_else(|poisoned| poisoned.into_inner());
        builders.get(scheme).cloned()
    }

    /// Registered schemes, in no particular order.
    pub fn schemes(&self) -> Vec<String> {
        let builders = self.builders.read().unwrap_or_else(|poisoned| poisoned.into_inner());
        builders.keys().cloned().collect()
    }

    /// Parse a target URI, dispatch to its scheme's builder, and start a
    /// watch session pushing updates into `sink`.
    pub async fn build(&self, uri: &str, sink: Arc<dyn AddressSink>) -> Result<WatchSession, ResolverError> {
        let target = Target::parse(uri)?;
        let builder = self.lookup(&target.scheme).ok_or_else(|| ResolverError::UnknownScheme {
            scheme: target.scheme.clone(),
        })?;
        builder.build(&target, sink).await
    }
}
