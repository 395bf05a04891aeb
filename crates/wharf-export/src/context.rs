//! The shared export context.

use crate::events::{ExportEvent, ExportObserver};
use crate::scheduler::DelayScheduler;
use dashmap::DashMap;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;
use wharf_extension::ExtensionHub;
use wharf_rpc::{
    Configurator, InjvmProtocol, LoggingProtocol, MemoryMetadataService, MemoryRegistry,
    MetadataService, PassthroughProxyFactory, Protocol, ProxyFactory, RegistryClient,
    RegistryProtocol,
};
use wharf_types::service;
use wharf_types::{keys, ServiceDescriptor, ServiceInterface, WharfResult};

/// Process-owned state shared by every [`ServiceExport`](crate::ServiceExport):
/// the extension hub (with the built-in registrations), the service
/// repository, the delayed-export scheduler, the random-port cache, and the
/// lifecycle observers.
///
/// Created once at bootstrap and passed by `Arc`; there is no global state.
pub struct ExportContext {
    hub: Arc<ExtensionHub>,
    injvm: Arc<InjvmProtocol>,
    repository: DashMap<String, Arc<ServiceDescriptor>>,
    random_ports: Mutex<HashMap<String, u16>>,
    scheduler: DelayScheduler,
    observers: RwLock<Vec<Arc<dyn ExportObserver>>>,
}

impl ExportContext {
    /// Create a context with the built-in extensions registered: the
    /// `injvm` and `registry` transports (decorated by the logging
    /// wrapper), the `passthrough` proxy factory, the `memory` registry
    /// client, and the `local` metadata service.
    pub fn new() -> Arc<Self> {
        let hub = ExtensionHub::new();
        let injvm = Arc::new(InjvmProtocol::new());
        register_defaults(&hub, &injvm)
            .expect("built-in extension registration cannot collide on a fresh hub");
        Arc::new(Self {
            hub,
            injvm,
            repository: DashMap::new(),
            random_ports: Mutex::new(HashMap::new()),
            scheduler: DelayScheduler::new(),
            observers: RwLock::new(Vec::new()),
        })
    }

    /// The extension hub.
    pub fn hub(&self) -> &Arc<ExtensionHub> {
        &self.hub
    }

    /// The in-process transport, for same-process callers to look up
    /// locally exported services.
    pub fn injvm(&self) -> &Arc<InjvmProtocol> {
        &self.injvm
    }

    /// The descriptor for an interface+group+version triple, created on
    /// first use and shared across repeated exports of the same triple.
    pub fn register_service(
        &self,
        interface: &ServiceInterface,
        group: Option<&str>,
        version: Option<&str>,
    ) -> Arc<ServiceDescriptor> {
        let key = service::service_key(&interface.name, group, version);
        self.repository
            .entry(key)
            .or_insert_with(|| {
                Arc::new(ServiceDescriptor::new(
                    interface.clone(),
                    group.map(str::to_string),
                    version.map(str::to_string),
                ))
            })
            .clone()
    }

    /// Look up a registered service descriptor.
    pub fn service(&self, service_key: &str) -> Option<Arc<ServiceDescriptor>> {
        self.repository.get(service_key).map(|e| e.value().clone())
    }

    /// The shared protocol-name → chosen-ephemeral-port cache.
    pub fn random_ports(&self) -> &Mutex<HashMap<String, u16>> {
        &self.random_ports
    }

    /// Register a lifecycle observer.
    pub fn add_observer(&self, observer: Arc<dyn ExportObserver>) {
        self.observers
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .push(observer);
    }

    pub(crate) fn notify(&self, event: &ExportEvent) {
        let observers = self
            .observers
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone();
        for observer in observers {
            observer.on_event(event);
        }
    }

    pub(crate) fn schedule(&self, delay: Duration, job: impl FnOnce() + Send + 'static) {
        self.scheduler.schedule(delay, job);
    }
}

fn register_defaults(hub: &Arc<ExtensionHub>, injvm: &Arc<InjvmProtocol>) -> WharfResult<()> {
    let protocols = hub.loader::<dyn Protocol>();
    protocols.declare_adaptive(&[keys::PROTOCOL_SELECTOR_KEY], Some(keys::LOCAL_PROTOCOL));
    protocols.register_wrapper(100, |inner| Arc::new(LoggingProtocol::new(inner)) as Arc<dyn Protocol>);
    let injvm = injvm.clone();
    protocols.register(keys::LOCAL_PROTOCOL, move |_| {
        Ok(injvm.clone() as Arc<dyn Protocol>)
    })?;
    protocols.register(keys::REGISTRY_PROTOCOL, |hub| {
        Ok(Arc::new(RegistryProtocol::new(hub.clone())) as Arc<dyn Protocol>)
    })?;

    let proxies = hub.loader::<dyn ProxyFactory>();
    proxies.declare_adaptive(&[keys::PROXY_KEY], Some("passthrough"));
    proxies.register("passthrough", |_| {
        Ok(Arc::new(PassthroughProxyFactory) as Arc<dyn ProxyFactory>)
    })?;

    let registries = hub.loader::<dyn RegistryClient>();
    registries.declare_adaptive(&[keys::REGISTRY_KEY], Some("memory"));
    registries.register("memory", |_| {
        Ok(Arc::new(MemoryRegistry::new()) as Arc<dyn RegistryClient>)
    })?;

    let metadata = hub.loader::<dyn MetadataService>();
    metadata.register(keys::DEFAULT_METADATA_STORAGE_TYPE, |_| {
        Ok(Arc::new(MemoryMetadataService::new()) as Arc<dyn MetadataService>)
    })?;

    // No configurators are registered by default; the pipeline probes for
    // them by scheme.
    let _ = hub.loader::<dyn Configurator>();

    Ok(())
}
