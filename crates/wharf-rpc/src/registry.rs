//! Registry clients — the discovery backend boundary.

use std::sync::Mutex;
use tracing::info;
use wharf_types::{Url, WharfResult};

/// A configuration/discovery backend client.
///
/// Selected adaptively from the `registry` parameter of a registry address.
/// Real backends (coordination services and the like) live outside this
/// workspace; they only need to satisfy this contract.
pub trait RegistryClient: Send + Sync {
    /// Advertise a provider address.
    fn register(&self, url: &Url) -> WharfResult<()>;
    /// Withdraw a previously advertised address.
    fn unregister(&self, url: &Url) -> WharfResult<()>;
    /// Addresses currently advertised for a service key.
    fn lookup(&self, service_key: &str) -> Vec<Url>;
}

/// In-memory registry, the default (`memory`) backend. Used by tests and
/// single-process deployments.
#[derive(Default)]
pub struct MemoryRegistry {
    registered: Mutex<Vec<Url>>,
}

impl MemoryRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }
}

impl RegistryClient for MemoryRegistry {
    fn register(&self, url: &Url) -> WharfResult<()> {
        let mut registered = self.registered.lock().unwrap_or_else(|e| e.into_inner());
        if !registered.contains(url) {
            registered.push(url.clone());
        }
        info!(url = %url, "Registered provider address");
        Ok(())
    }

    fn unregister(&self, url: &Url) -> WharfResult<()> {
        let mut registered = self.registered.lock().unwrap_or_else(|e| e.into_inner());
        registered.retain(|u| u != url);
        info!(url = %url, "Unregistered provider address");
        Ok(())
    }

    fn lookup(&self, service_key: &str) -> Vec<Url> {
        let registered = self.registered.lock().unwrap_or_else(|e| e.into_inner());
        registered
            .iter()
            .filter(|u| u.service_key() == service_key)
            .cloned()
            .collect()
    }
}
