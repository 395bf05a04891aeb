//! The per-service export pipeline.

use crate::context::ExportContext;
use crate::events::ExportEvent;
use crate::net;
use chrono::Utc;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, OnceLock, Weak};
use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;
use wharf_rpc::{
    Configurator, Exporter, Invoker, MetadataInvoker, MetadataService, Protocol, ProxyFactory,
    ServiceRef,
};
use wharf_types::config::{
    ExportConfig, MethodConfig, ParameterSource, ProtocolConfig, RegistryConfig,
};
use wharf_types::{keys, service, ServiceDescriptor, ServiceInterface, Url, WharfError, WharfResult};

/// Lifecycle state of one service export.
///
/// `Exported` and `Unexported` are sticky: once unexported, a service never
/// re-enters `Exported` without a new pipeline run on a new
/// [`ServiceExport`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    /// Built but never exported.
    Unconfigured,
    /// Live; exporters are retained.
    Exported,
    /// Torn down.
    Unexported,
}

/// One service's export pipeline and bookkeeping.
///
/// `export()` and `unexport()` are self-serializing (one monitor-style
/// guard per service instance) and idempotent; concurrent calls block
/// rather than interleave.
pub struct ServiceExport {
    context: Arc<ExportContext>,
    config: ExportConfig,
    service: ServiceRef,
    weak_self: Weak<ServiceExport>,
    descriptor: OnceLock<Arc<ServiceDescriptor>>,
    export_lock: Mutex<()>,
    exported: AtomicBool,
    unexported: AtomicBool,
    exporters: Mutex<Vec<Box<dyn Exporter>>>,
    urls: Mutex<Vec<Url>>,
}

impl ServiceExport {
    /// Build an export pipeline for one service implementation.
    pub fn new(context: Arc<ExportContext>, config: ExportConfig, service: ServiceRef) -> Arc<Self> {
        Arc::new_cyclic(|weak| Self {
            context,
            config,
            service,
            weak_self: weak.clone(),
            descriptor: OnceLock::new(),
            export_lock: Mutex::new(()),
            exported: AtomicBool::new(false),
            unexported: AtomicBool::new(false),
            exporters: Mutex::new(Vec::new()),
            urls: Mutex::new(Vec::new()),
        })
    }

    /// The export configuration.
    pub fn config(&self) -> &ExportConfig {
        &self.config
    }

    /// The unique service key (`[group/]interface[:version]`).
    pub fn service_key(&self) -> String {
        service::service_key(
            &self.config.interface.name,
            self.config.group.as_deref(),
            self.config.version.as_deref(),
        )
    }

    /// Current lifecycle state.
    pub fn state(&self) -> LifecycleState {
        if self.unexported.load(Ordering::SeqCst) {
            LifecycleState::Unexported
        } else if self.exported.load(Ordering::SeqCst) {
            LifecycleState::Exported
        } else {
            LifecycleState::Unconfigured
        }
    }

    /// Whether the service has been exported.
    pub fn is_exported(&self) -> bool {
        self.exported.load(Ordering::SeqCst)
    }

    /// Whether the service has been unexported.
    pub fn is_unexported(&self) -> bool {
        self.unexported.load(Ordering::SeqCst)
    }

    /// The per-protocol addresses built by the pipeline, recorded even when
    /// scope gating skipped the actual export.
    pub fn exported_urls(&self) -> Vec<Url> {
        self.urls.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Number of live exporters retained for this service.
    pub fn exporter_count(&self) -> usize {
        self.exporters.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Run the export pipeline.
    ///
    /// A no-op when the configuration disables export or the service is
    /// already exported; an error once the service has been unexported.
    /// With a configured delay the remaining steps run later on the shared
    /// scheduler and this call returns after validation.
    pub fn export(&self) -> WharfResult<()> {
        let guard = self.export_lock.lock().unwrap_or_else(|e| e.into_inner());
        if !self.should_export() {
            debug!(service = %self.service_key(), "Export disabled by configuration");
            return Ok(());
        }
        if self.exported.load(Ordering::SeqCst) {
            return Ok(());
        }
        if self.unexported.load(Ordering::SeqCst) {
            return Err(WharfError::InvalidState {
                service: self.service_key(),
                state: "unexported".to_string(),
                operation: "export".to_string(),
            });
        }
        self.validate()?;

        let delay = self
            .config
            .delay_ms
            .or_else(|| self.config.provider.as_ref().and_then(|p| p.delay_ms))
            .unwrap_or(0);
        if delay > 0 {
            info!(service = %self.service_key(), delay_ms = delay, "Scheduling delayed export");
            let service = self
                .weak_self
                .upgrade()
                .expect("a service export is always Arc-owned");
            self.context.schedule(Duration::from_millis(delay), move || {
                if let Err(e) = service.export_delayed() {
                    warn!(service = %service.service_key(), error = %e, "Delayed export failed");
                }
            });
            return Ok(());
        }

        let event = self.do_export()?;
        drop(guard);
        self.context.notify(&event);
        Ok(())
    }

    /// Tear down every retained exporter, tolerating individual failures,
    /// and mark the service unexported. A no-op when never exported or
    /// already unexported; safe under concurrent calls.
    pub fn unexport(&self) {
        let guard = self.export_lock.lock().unwrap_or_else(|e| e.into_inner());
        if !self.exported.load(Ordering::SeqCst) || self.unexported.load(Ordering::SeqCst) {
            return;
        }
        let drained: Vec<Box<dyn Exporter>> = {
            let mut exporters = self.exporters.lock().unwrap_or_else(|e| e.into_inner());
            exporters.drain(..).collect()
        };
        for exporter in &drained {
            if let Err(e) = exporter.unexport() {
                warn!(url = %exporter.url(), error = %e, "Unexpected error while unexporting, continuing");
            }
        }
        self.unexported.store(true, Ordering::SeqCst);
        info!(service = %self.service_key(), "Service unexported");
        let event = ExportEvent::Unexported {
            service_key: self.service_key(),
        };
        drop(guard);
        self.context.notify(&event);
    }

    fn should_export(&self) -> bool {
        self.config
            .export
            .or_else(|| self.config.provider.as_ref().and_then(|p| p.export))
            .unwrap_or(true)
    }

    fn export_delayed(&self) -> WharfResult<()> {
        let guard = self.export_lock.lock().unwrap_or_else(|e| e.into_inner());
        // The service may have been exported again or torn down while the
        // delay was pending.
        if self.exported.load(Ordering::SeqCst) || self.unexported.load(Ordering::SeqCst) {
            return Ok(());
        }
        let event = self.do_export()?;
        drop(guard);
        self.context.notify(&event);
        Ok(())
    }

    /// Step 1: configuration completion and validation. Fatal errors abort
    /// the export before any exporter is produced.
    fn validate(&self) -> WharfResult<()> {
        let interface = &self.config.interface;
        if interface.name.is_empty() {
            return Err(WharfError::InvalidConfig(
                "service interface must not be empty".to_string(),
            ));
        }
        if !self.config.generic {
            for method in &self.config.methods {
                if interface.method(&method.name).is_none() {
                    return Err(WharfError::InvalidConfig(format!(
                        "method '{}' is not declared on interface '{}'",
                        method.name, interface.name
                    )));
                }
            }
        }
        for stub in [self.config.local.as_ref(), self.config.stub.as_ref()]
            .into_iter()
            .flatten()
        {
            if !stub.implements.iter().any(|i| i == &interface.name) {
                return Err(WharfError::InvalidConfig(format!(
                    "the local implementation class {} does not implement interface {}",
                    stub.class_name, interface.name
                )));
            }
        }
        if !self.only_in_process() {
            for registry in &self.config.registries {
                registry.to_url()?;
            }
        }
        Ok(())
    }

    fn only_in_process(&self) -> bool {
        let protocols = self.effective_protocols();
        protocols.len() == 1 && protocols[0].name.eq_ignore_ascii_case(keys::LOCAL_PROTOCOL)
    }

    fn effective_protocols(&self) -> Vec<ProtocolConfig> {
        if self.config.protocols.is_empty() {
            vec![ProtocolConfig::new(keys::LOCAL_PROTOCOL)]
        } else {
            self.config.protocols.clone()
        }
    }

    fn do_export(&self) -> WharfResult<ExportEvent> {
        let descriptor = self
            .descriptor
            .get_or_init(|| {
                self.context.register_service(
                    &self.config.interface,
                    self.config.group.as_deref(),
                    self.config.version.as_deref(),
                )
            })
            .clone();
        // Mark exported up front so a partial failure can still be torn
        // down through unexport().
        self.exported.store(true, Ordering::SeqCst);
        let registry_urls = self.load_registry_urls()?;
        for protocol in self.effective_protocols() {
            self.export_for_protocol(&descriptor, &protocol, &registry_urls)?;
        }
        info!(service = %self.service_key(), "Service exported");
        Ok(ExportEvent::Exported {
            service_key: self.service_key(),
            urls: self.exported_urls(),
        })
    }

    fn load_registry_urls(&self) -> WharfResult<Vec<Url>> {
        self.config.registries.iter().map(RegistryConfig::to_url).collect()
    }

    /// Steps 3–9 for one protocol configuration.
    fn export_for_protocol(
        &self,
        descriptor: &Arc<ServiceDescriptor>,
        protocol_cfg: &ProtocolConfig,
        registry_urls: &[Url],
    ) -> WharfResult<()> {
        let name = if protocol_cfg.name.is_empty() {
            keys::LOCAL_PROTOCOL
        } else {
            protocol_cfg.name.as_str()
        };

        // Parameter overlays, lowest precedence first.
        let mut map = BTreeMap::new();
        map.insert(keys::SIDE_KEY.to_string(), keys::PROVIDER_SIDE.to_string());
        append_runtime_parameters(&mut map);
        if let Some(application) = &self.config.application {
            application.append_parameters(&mut map);
        }
        if let Some(module) = &self.config.module {
            module.append_parameters(&mut map);
        }
        if let Some(provider) = &self.config.provider {
            provider.append_parameters(&mut map);
        }
        protocol_cfg.append_parameters(&mut map);
        self.config.append_parameters(&mut map);
        append_method_parameters(&mut map, &self.config.methods, &self.config.interface)?;

        if self.config.generic {
            map.insert(keys::GENERIC_KEY.to_string(), "true".to_string());
            map.insert(keys::METHODS_KEY.to_string(), keys::ANY_VALUE.to_string());
        } else {
            if let Some(version) = self.config.version.as_deref().filter(|v| !v.is_empty()) {
                map.insert(keys::REVISION_KEY.to_string(), version.to_string());
            }
            let methods = self.config.interface.method_names();
            if methods.is_empty() {
                warn!(
                    interface = %self.config.interface.name,
                    "No method found on the service interface, exporting with a wildcard method list"
                );
                map.insert(keys::METHODS_KEY.to_string(), keys::ANY_VALUE.to_string());
            } else {
                map.insert(keys::METHODS_KEY.to_string(), methods.join(","));
            }
        }
        if let Some(token) = self.effective_token() {
            map.insert(keys::TOKEN_KEY.to_string(), token);
        }

        descriptor.attach_parameters(&map);

        // Step 4: deterministic host/port resolution.
        let provider = self.config.provider.as_ref();
        let host =
            net::find_configured_host(name, protocol_cfg, provider, registry_urls, &mut map)?;
        let default_port = self
            .context
            .hub()
            .loader::<dyn Protocol>()
            .get(name)?
            .default_port();
        let port = net::find_configured_port(
            name,
            protocol_cfg,
            provider,
            default_port,
            self.context.random_ports(),
            &mut map,
        )?;
        let mut url = Url::new(name, host, port, self.effective_path(protocol_cfg), map);

        // Step 5: scheme-keyed configurator hook.
        let configurators = self.context.hub().loader::<dyn Configurator>();
        if configurators.has_extension(url.scheme()) {
            url = configurators.get(url.scheme())?.configure(url)?;
        }

        // Step 6: scope gating. `none` skips export entirely but the
        // address is still recorded for introspection.
        let scope = url.parameter(keys::SCOPE_KEY).map(str::to_string);
        let scope_is = |value: &str| scope.as_deref().is_some_and(|s| s.eq_ignore_ascii_case(value));
        if !scope_is(keys::SCOPE_NONE) {
            if !scope_is(keys::SCOPE_REMOTE) {
                self.export_local(descriptor, &url)?;
            }
            if !scope_is(keys::SCOPE_LOCAL) {
                self.export_remote(descriptor, &mut url, registry_urls)?;
                self.publish_metadata(&url);
            }
        }
        self.urls.lock().unwrap_or_else(|e| e.into_inner()).push(url);
        Ok(())
    }

    /// Step 7: remote fan-out over the configured registries, or one direct
    /// export when none are configured. A failing registry export aborts
    /// the remaining fan-out for this protocol.
    fn export_remote(
        &self,
        descriptor: &Arc<ServiceDescriptor>,
        url: &mut Url,
        registry_urls: &[Url],
    ) -> WharfResult<()> {
        let hub = self.context.hub();
        if registry_urls.is_empty() {
            info!(service = %self.service_key(), url = %url, "Exporting service directly (no registries configured)");
            let proxy_factory = hub.loader::<dyn ProxyFactory>().adaptive().select(url)?;
            let invoker =
                proxy_factory.get_invoker(self.service.clone(), &self.config.interface, url)?;
            let invoker: Arc<dyn Invoker> =
                Arc::new(MetadataInvoker::new(invoker, descriptor.clone()));
            let protocol = hub.loader::<dyn Protocol>().adaptive().select(invoker.url())?;
            let exporter = protocol.export(invoker)?;
            self.exporters
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .push(exporter);
            return Ok(());
        }

        for registry_url in registry_urls {
            // An in-process protocol has nothing to advertise.
            if url.scheme().eq_ignore_ascii_case(keys::LOCAL_PROTOCOL) {
                continue;
            }
            if let Some(dynamic) = registry_url.parameter(keys::DYNAMIC_KEY) {
                *url = url.with_parameter_if_absent(keys::DYNAMIC_KEY, dynamic);
            }
            if let Some(monitor) = &self.config.monitor {
                let monitor_url = monitor.to_url()?;
                *url = url.with_parameter_if_absent(keys::MONITOR_KEY, monitor_url.to_string());
            }
            if url.bool_parameter(keys::REGISTER_KEY, true) {
                info!(
                    service = %self.service_key(),
                    url = %url,
                    registry = %registry_url.address(),
                    "Registering service with registry"
                );
            } else {
                info!(service = %self.service_key(), url = %url, "Exporting service without registration");
            }

            let mut registry_url = registry_url.clone();
            // A custom proxy strategy on the export address must drive the
            // invoker built for the registry address too.
            if let Some(proxy) = url.parameter(keys::PROXY_KEY) {
                registry_url = registry_url.with_parameter(keys::PROXY_KEY, proxy);
            }
            let registry_url = registry_url.with_parameter(keys::EXPORT_KEY, url.to_string());

            let proxy_factory = hub
                .loader::<dyn ProxyFactory>()
                .adaptive()
                .select(&registry_url)?;
            let invoker = proxy_factory.get_invoker(
                self.service.clone(),
                &self.config.interface,
                &registry_url,
            )?;
            let invoker: Arc<dyn Invoker> =
                Arc::new(MetadataInvoker::new(invoker, descriptor.clone()));
            let protocol = hub.loader::<dyn Protocol>().adaptive().select(invoker.url())?;
            let exporter = protocol.export(invoker)?;
            self.exporters
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .push(exporter);
        }
        Ok(())
    }

    /// Step 8: the always-on in-process export for same-process callers.
    fn export_local(&self, descriptor: &Arc<ServiceDescriptor>, url: &Url) -> WharfResult<()> {
        if url.scheme().eq_ignore_ascii_case(keys::LOCAL_PROTOCOL) {
            // The direct export path already placed it in-process.
            return Ok(());
        }
        let local = url
            .with_scheme(keys::LOCAL_PROTOCOL)
            .with_host(keys::LOCALHOST)
            .with_port(0);
        let hub = self.context.hub();
        let proxy_factory = hub.loader::<dyn ProxyFactory>().adaptive().select(&local)?;
        let invoker =
            proxy_factory.get_invoker(self.service.clone(), &self.config.interface, &local)?;
        let invoker: Arc<dyn Invoker> = Arc::new(MetadataInvoker::new(invoker, descriptor.clone()));
        let protocol = hub.loader::<dyn Protocol>().adaptive().select(&local)?;
        let exporter = protocol.export(invoker)?;
        self.exporters
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(exporter);
        info!(service = %self.service_key(), url = %local, "Exported service to the in-process table");
        Ok(())
    }

    /// Step 9: best-effort service-definition publication.
    fn publish_metadata(&self, url: &Url) {
        let loader = self.context.hub().loader::<dyn MetadataService>();
        let metadata_type = url.parameter_or(keys::METADATA_KEY, keys::DEFAULT_METADATA_STORAGE_TYPE);
        if !loader.has_extension(metadata_type) {
            debug!(metadata_type, "No metadata service registered, skipping publication");
            return;
        }
        let published = loader
            .get(metadata_type)
            .and_then(|metadata| metadata.publish_service_definition(url));
        if let Err(e) = published {
            warn!(error = %e, "Failed to publish the service definition");
        }
    }

    fn effective_token(&self) -> Option<String> {
        let token = self
            .config
            .token
            .clone()
            .or_else(|| self.config.provider.as_ref().and_then(|p| p.token.clone()))?;
        if token.is_empty() {
            return None;
        }
        if token == "true" || token == "default" {
            Some(Uuid::new_v4().to_string())
        } else {
            Some(token)
        }
    }

    fn effective_path(&self, protocol: &ProtocolConfig) -> String {
        let base = self
            .config
            .path
            .clone()
            .filter(|p| !p.is_empty())
            .unwrap_or_else(|| self.config.interface.name.clone());
        match protocol.context_path.as_deref().filter(|c| !c.is_empty()) {
            Some(context_path) => format!("{}/{}", context_path.trim_matches('/'), base),
            None => base,
        }
    }
}

/// Runtime facts every export address carries.
fn append_runtime_parameters(map: &mut BTreeMap<String, String>) {
    map.insert(
        keys::WHARF_VERSION_KEY.to_string(),
        env!("CARGO_PKG_VERSION").to_string(),
    );
    map.insert(keys::PID_KEY.to_string(), std::process::id().to_string());
    map.insert(
        keys::TIMESTAMP_KEY.to_string(),
        Utc::now().timestamp_millis().to_string(),
    );
}

/// Per-method and per-argument overlays: method parameters are prefixed
/// with the method name, `retry=false` normalizes to `retries=0`, and
/// argument overrides are cross-validated against the declared interface
/// signature.
fn append_method_parameters(
    map: &mut BTreeMap<String, String>,
    methods: &[MethodConfig],
    interface: &ServiceInterface,
) -> WharfResult<()> {
    for method in methods {
        method.append_parameters(map);
        let retry_key = format!("{}.retry", method.name);
        if map.get(&retry_key).map(String::as_str) == Some("false") {
            map.remove(&retry_key);
            map.insert(format!("{}.retries", method.name), "0".to_string());
        }

        for argument in &method.arguments {
            match (argument.type_name.as_deref(), argument.index) {
                (Some(declared), Some(index)) => {
                    let signature = interface.method(&method.name).ok_or_else(|| {
                        WharfError::InvalidConfig(format!(
                            "method '{}' is not declared on interface '{}'",
                            method.name, interface.name
                        ))
                    })?;
                    let actual = signature.param_types.get(index).map(String::as_str);
                    if actual != Some(declared) {
                        return Err(WharfError::ArgumentConfigMismatch {
                            method: method.name.clone(),
                            index,
                            declared: declared.to_string(),
                            actual: actual.unwrap_or("<missing>").to_string(),
                        });
                    }
                    argument.append_parameters_at(map, &method.name, index);
                }
                (Some(declared), None) => {
                    let signature = interface.method(&method.name).ok_or_else(|| {
                        WharfError::InvalidConfig(format!(
                            "method '{}' is not declared on interface '{}'",
                            method.name, interface.name
                        ))
                    })?;
                    for (position, param_type) in signature.param_types.iter().enumerate() {
                        if param_type == declared {
                            argument.append_parameters_at(map, &method.name, position);
                        }
                    }
                }
                (None, Some(index)) => argument.append_parameters_at(map, &method.name, index),
                (None, None) => {
                    return Err(WharfError::ArgumentConfigIncomplete {
                        method: method.name.clone(),
                    })
                }
            }
        }
    }
    Ok(())
}
