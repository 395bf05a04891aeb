//! Declarative export configuration.
//!
//! These structs are the typed form of everything a caller can say about a
//! service export: the application/module it belongs to, provider-wide
//! defaults, the protocols and registries to export over, and per-method /
//! per-argument overrides. The pipeline flattens them into one parameter
//! map by applying [`ParameterSource::append_parameters`] overlays in a
//! documented order, lowest precedence first.

use crate::error::{WharfError, WharfResult};
use crate::keys;
use crate::service::ServiceInterface;
use crate::url::Url;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A configuration layer that contributes entries to the flat parameter
/// map. Later overlays overwrite earlier ones.
pub trait ParameterSource {
    /// Append this layer's parameters.
    fn append_parameters(&self, map: &mut BTreeMap<String, String>);
}

fn put_opt(map: &mut BTreeMap<String, String>, key: &str, value: Option<&str>) {
    if let Some(value) = value.filter(|v| !v.is_empty()) {
        map.insert(key.to_string(), value.to_string());
    }
}

/// Application-level metadata.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ApplicationConfig {
    /// Application name.
    pub name: String,
    /// Owner contact.
    #[serde(default)]
    pub owner: Option<String>,
    /// Organization name.
    #[serde(default)]
    pub organization: Option<String>,
    /// Free-form parameters.
    #[serde(default)]
    pub parameters: BTreeMap<String, String>,
}

impl ParameterSource for ApplicationConfig {
    fn append_parameters(&self, map: &mut BTreeMap<String, String>) {
        map.extend(self.parameters.clone());
        put_opt(map, "application", Some(&self.name));
        put_opt(map, "owner", self.owner.as_deref());
        put_opt(map, "organization", self.organization.as_deref());
    }
}

/// Module-level metadata.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ModuleConfig {
    /// Module name.
    pub name: String,
    /// Free-form parameters.
    #[serde(default)]
    pub parameters: BTreeMap<String, String>,
}

impl ParameterSource for ModuleConfig {
    fn append_parameters(&self, map: &mut BTreeMap<String, String>) {
        map.extend(self.parameters.clone());
        put_opt(map, "module", Some(&self.name));
    }
}

/// Provider-wide defaults shared by every service the provider exports.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Default bind host.
    #[serde(default)]
    pub host: Option<String>,
    /// Default bind port.
    #[serde(default)]
    pub port: Option<u16>,
    /// Default security token (`"true"`/`"default"` means "generate").
    #[serde(default)]
    pub token: Option<String>,
    /// Default export delay in milliseconds.
    #[serde(default)]
    pub delay_ms: Option<u64>,
    /// Default export guard; `false` disables export for services that do
    /// not set their own flag.
    #[serde(default)]
    pub export: Option<bool>,
    /// Free-form parameters.
    #[serde(default)]
    pub parameters: BTreeMap<String, String>,
}

impl ParameterSource for ProviderConfig {
    fn append_parameters(&self, map: &mut BTreeMap<String, String>) {
        map.extend(self.parameters.clone());
    }
}

/// One protocol a service exports over.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProtocolConfig {
    /// Extension name of the transport (`injvm`, `demo`, ...).
    pub name: String,
    /// Host override for this protocol.
    #[serde(default)]
    pub host: Option<String>,
    /// Port override for this protocol; 0 or absent means "resolve".
    #[serde(default)]
    pub port: Option<u16>,
    /// Context path prefixed to the service path.
    #[serde(default)]
    pub context_path: Option<String>,
    /// Free-form parameters.
    #[serde(default)]
    pub parameters: BTreeMap<String, String>,
}

impl ProtocolConfig {
    /// A protocol config with just a name.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }
}

impl ParameterSource for ProtocolConfig {
    fn append_parameters(&self, map: &mut BTreeMap<String, String>) {
        map.extend(self.parameters.clone());
    }
}

/// One configuration/discovery backend to publish exports to.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RegistryConfig {
    /// Backend address. Either a full `registry://` address or a
    /// backend-scheme address such as `memory://127.0.0.1:2181`.
    pub address: String,
    /// Whether registrations are dynamic (dropped when the provider goes
    /// away).
    #[serde(default)]
    pub dynamic: Option<bool>,
    /// Free-form parameters merged onto the registry address.
    #[serde(default)]
    pub parameters: BTreeMap<String, String>,
}

impl RegistryConfig {
    /// A registry config with just an address.
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            ..Self::default()
        }
    }

    /// Translate into the canonical `registry://` address: the backend name
    /// moves into the `registry` parameter, the scheme becomes `registry`.
    pub fn to_url(&self) -> WharfResult<Url> {
        let parsed = Url::parse(&self.address)?;
        let mut url = if parsed.scheme() == keys::REGISTRY_PROTOCOL {
            parsed
        } else {
            let backend = parsed.scheme().to_string();
            parsed
                .with_scheme(keys::REGISTRY_PROTOCOL)
                .with_parameter_if_absent(keys::REGISTRY_KEY, backend)
        };
        if url.path().is_empty() {
            url = url.with_path(keys::REGISTRY_SERVICE_PATH);
        }
        url = url.with_parameters(self.parameters.clone());
        if let Some(dynamic) = self.dynamic {
            url = url.with_parameter(keys::DYNAMIC_KEY, dynamic.to_string());
        }
        Ok(url)
    }
}

/// Monitor backend to attach to exported addresses.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MonitorConfig {
    /// Monitor address.
    pub address: String,
    /// Free-form parameters merged onto the monitor address.
    #[serde(default)]
    pub parameters: BTreeMap<String, String>,
}

impl MonitorConfig {
    /// Parse into a monitor address.
    pub fn to_url(&self) -> WharfResult<Url> {
        Ok(Url::parse(&self.address)?.with_parameters(self.parameters.clone()))
    }
}

/// Per-method export overrides.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MethodConfig {
    /// Method name; must exist on the declared interface.
    pub name: String,
    /// Legacy retry switch; `false` normalizes to `<name>.retries=0`.
    #[serde(default)]
    pub retry: Option<bool>,
    /// Retry count override.
    #[serde(default)]
    pub retries: Option<u32>,
    /// Timeout override in milliseconds.
    #[serde(default)]
    pub timeout_ms: Option<u64>,
    /// Free-form parameters, prefixed with the method name.
    #[serde(default)]
    pub parameters: BTreeMap<String, String>,
    /// Per-argument overrides.
    #[serde(default)]
    pub arguments: Vec<ArgumentConfig>,
}

impl ParameterSource for MethodConfig {
    fn append_parameters(&self, map: &mut BTreeMap<String, String>) {
        for (k, v) in &self.parameters {
            map.insert(format!("{}.{}", self.name, k), v.clone());
        }
        if let Some(retry) = self.retry {
            map.insert(format!("{}.retry", self.name), retry.to_string());
        }
        if let Some(retries) = self.retries {
            map.insert(format!("{}.retries", self.name), retries.to_string());
        }
        if let Some(timeout) = self.timeout_ms {
            map.insert(format!("{}.timeout", self.name), timeout.to_string());
        }
    }
}

/// Per-argument export overrides, matched against the interface method
/// signature by index, by type, or both.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ArgumentConfig {
    /// Parameter position on the method.
    #[serde(default)]
    pub index: Option<usize>,
    /// Fully qualified parameter type name.
    #[serde(default, rename = "type")]
    pub type_name: Option<String>,
    /// Whether the argument is a callback.
    #[serde(default)]
    pub callback: Option<bool>,
    /// Free-form parameters, prefixed with `<method>.<index>`.
    #[serde(default)]
    pub parameters: BTreeMap<String, String>,
}

impl ArgumentConfig {
    /// Append this argument's parameters under `<method>.<index>.`.
    pub fn append_parameters_at(
        &self,
        map: &mut BTreeMap<String, String>,
        method: &str,
        index: usize,
    ) {
        for (k, v) in &self.parameters {
            map.insert(format!("{method}.{index}.{k}"), v.clone());
        }
        if let Some(callback) = self.callback {
            map.insert(format!("{method}.{index}.callback"), callback.to_string());
        }
    }
}

/// A declared local/stub implementation, validated against the service
/// interface at export time.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StubConfig {
    /// Implementation type name, used in error messages.
    pub class_name: String,
    /// Interfaces the implementation declares.
    #[serde(default)]
    pub implements: Vec<String>,
}

/// Everything a caller can say about one service export.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportConfig {
    /// The declared service interface. Mandatory.
    pub interface: ServiceInterface,
    /// Service group.
    #[serde(default)]
    pub group: Option<String>,
    /// Service version.
    #[serde(default)]
    pub version: Option<String>,
    /// Publication path; defaults to the interface name.
    #[serde(default)]
    pub path: Option<String>,
    /// Export scope: `none`, `local`, `remote`, or unset for both.
    #[serde(default)]
    pub scope: Option<String>,
    /// Export guard; `false` disables export.
    #[serde(default)]
    pub export: Option<bool>,
    /// Export delay in milliseconds; unset inherits the provider delay.
    #[serde(default)]
    pub delay_ms: Option<u64>,
    /// Security token (`"true"`/`"default"` means "generate"); unset
    /// inherits the provider token.
    #[serde(default)]
    pub token: Option<String>,
    /// Generic (schema-free) export: methods are not enumerated.
    #[serde(default)]
    pub generic: bool,
    /// Metadata storage type for service-definition publication.
    #[serde(default)]
    pub metadata_type: Option<String>,
    /// Declared local implementation.
    #[serde(default)]
    pub local: Option<StubConfig>,
    /// Declared stub implementation.
    #[serde(default)]
    pub stub: Option<StubConfig>,
    /// Per-method overrides.
    #[serde(default)]
    pub methods: Vec<MethodConfig>,
    /// Free-form service parameters.
    #[serde(default)]
    pub parameters: BTreeMap<String, String>,
    /// Owning application.
    #[serde(default)]
    pub application: Option<ApplicationConfig>,
    /// Owning module.
    #[serde(default)]
    pub module: Option<ModuleConfig>,
    /// Provider-wide defaults.
    #[serde(default)]
    pub provider: Option<ProviderConfig>,
    /// Protocols to export over; empty defaults to a single `injvm`.
    #[serde(default)]
    pub protocols: Vec<ProtocolConfig>,
    /// Registries to publish to.
    #[serde(default)]
    pub registries: Vec<RegistryConfig>,
    /// Monitor backend.
    #[serde(default)]
    pub monitor: Option<MonitorConfig>,
}

impl ExportConfig {
    /// A config with just an interface declaration.
    pub fn new(interface: ServiceInterface) -> Self {
        Self {
            interface,
            group: None,
            version: None,
            path: None,
            scope: None,
            export: None,
            delay_ms: None,
            token: None,
            generic: false,
            metadata_type: None,
            local: None,
            stub: None,
            methods: Vec::new(),
            parameters: BTreeMap::new(),
            application: None,
            module: None,
            provider: None,
            protocols: Vec::new(),
            registries: Vec::new(),
            monitor: None,
        }
    }

    /// Load from a TOML document.
    pub fn from_toml_str(input: &str) -> WharfResult<Self> {
        toml::from_str(input).map_err(|e| WharfError::InvalidConfig(e.to_string()))
    }
}

impl ParameterSource for ExportConfig {
    fn append_parameters(&self, map: &mut BTreeMap<String, String>) {
        map.extend(self.parameters.clone());
        put_opt(map, keys::INTERFACE_KEY, Some(&self.interface.name));
        put_opt(map, keys::GROUP_KEY, self.group.as_deref());
        put_opt(map, keys::VERSION_KEY, self.version.as_deref());
        put_opt(map, keys::SCOPE_KEY, self.scope.as_deref());
        put_opt(map, keys::METADATA_KEY, self.metadata_type.as_deref());
    }
}
