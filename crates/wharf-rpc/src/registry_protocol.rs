//! The registry-aware transport.
//!
//! Addresses with the `registry` scheme carry the real provider address
//! percent-encoded under the `export` parameter. Exporting through this
//! transport registers the provider address with the backend named by the
//! registry address, then re-enters adaptive `Protocol` dispatch with the
//! provider address — so the provider's own scheme picks the transport
//! that actually listens. That mid-chain scheme swap is the contract this
//! module exists for.

use crate::invoker::{DelegateInvoker, Invoker};
use crate::protocol::{Exporter, Protocol};
use crate::registry::RegistryClient;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{info, warn};
use wharf_extension::ExtensionHub;
use wharf_types::{keys, Url, WharfError, WharfResult};

/// Transport for the `registry` scheme.
pub struct RegistryProtocol {
    hub: Arc<ExtensionHub>,
}

impl RegistryProtocol {
    /// A registry-aware transport resolving its collaborators from `hub`.
    pub fn new(hub: Arc<ExtensionHub>) -> Self {
        Self { hub }
    }
}

impl Protocol for RegistryProtocol {
    fn default_port(&self) -> u16 {
        9090
    }

    fn export(&self, invoker: Arc<dyn Invoker>) -> WharfResult<Box<dyn Exporter>> {
        let registry_url = invoker.url().clone();
        let provider_url = registry_url
            .parameter_url(keys::EXPORT_KEY)?
            .ok_or_else(|| {
                WharfError::Registry(format!(
                    "registry address '{registry_url}' carries no '{}' parameter",
                    keys::EXPORT_KEY
                ))
            })?;

        let client = self
            .hub
            .loader::<dyn RegistryClient>()
            .adaptive()
            .select(&registry_url)?;

        let should_register = registry_url.bool_parameter(keys::REGISTER_KEY, true)
            && provider_url.bool_parameter(keys::REGISTER_KEY, true);
        if should_register {
            client.register(&provider_url)?;
            info!(
                provider = %provider_url,
                registry = %registry_url.address(),
                "Registered provider address"
            );
        }

        // Scheme swap: the inner transport is chosen by the provider
        // address, not the registry address.
        let protocol = self
            .hub
            .loader::<dyn Protocol>()
            .adaptive()
            .select(&provider_url)?;
        let rebound = Arc::new(DelegateInvoker::new(invoker, provider_url.clone()));
        let inner = protocol.export(rebound)?;

        Ok(Box::new(RegistryExporter {
            client,
            provider_url,
            inner,
            registered: AtomicBool::new(should_register),
            torn_down: AtomicBool::new(false),
        }))
    }
}

struct RegistryExporter {
    client: Arc<dyn RegistryClient>,
    provider_url: Url,
    inner: Box<dyn Exporter>,
    registered: AtomicBool,
    torn_down: AtomicBool,
}

impl Exporter for RegistryExporter {
    fn url(&self) -> &Url {
        &self.provider_url
    }

    fn unexport(&self) -> WharfResult<()> {
        if self.torn_down.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        if self.registered.swap(false, Ordering::SeqCst) {
            if let Err(e) = self.client.unregister(&self.provider_url) {
                // The inner listener must still come down.
                warn!(url = %self.provider_url, error = %e, "Failed to unregister provider address");
            }
        }
        self.inner.unexport()
    }
}
