//! Service identity: declared interfaces, method signatures, and the
//! per-triple service descriptor.
//!
//! There is no runtime reflection here — a service declares its interface
//! and method signatures explicitly, and the export pipeline enumerates and
//! validates against that declaration.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Mutex;

/// One method on a service interface.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MethodSignature {
    /// Method name.
    pub name: String,
    /// Fully qualified parameter type names, in declaration order.
    #[serde(default)]
    pub param_types: Vec<String>,
    /// Fully qualified return type name.
    #[serde(default)]
    pub return_type: Option<String>,
}

impl MethodSignature {
    /// Create a signature from a name and parameter types.
    pub fn new(name: impl Into<String>, param_types: &[&str]) -> Self {
        Self {
            name: name.into(),
            param_types: param_types.iter().map(|t| t.to_string()).collect(),
            return_type: None,
        }
    }
}

/// A declared service interface: identity plus method signatures.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceInterface {
    /// Fully qualified interface name (e.g. `demo.Echo`).
    pub name: String,
    /// Declared methods. An empty list is legal but unusual.
    #[serde(default)]
    pub methods: Vec<MethodSignature>,
}

impl ServiceInterface {
    /// Create an interface declaration.
    pub fn new(name: impl Into<String>, methods: Vec<MethodSignature>) -> Self {
        Self {
            name: name.into(),
            methods,
        }
    }

    /// Find a declared method by name.
    pub fn method(&self, name: &str) -> Option<&MethodSignature> {
        self.methods.iter().find(|m| m.name == name)
    }

    /// All declared method names, in declaration order.
    pub fn method_names(&self) -> Vec<&str> {
        self.methods.iter().map(|m| m.name.as_str()).collect()
    }
}

/// Build the unique service key: `[group/]name[:version]`.
pub fn service_key(name: &str, group: Option<&str>, version: Option<&str>) -> String {
    let mut key = String::new();
    if let Some(group) = group.filter(|g| !g.is_empty()) {
        key.push_str(group);
        key.push('/');
    }
    key.push_str(name);
    if let Some(version) = version.filter(|v| !v.is_empty()) {
        key.push(':');
        key.push_str(version);
    }
    key
}

/// Descriptor for one distinct interface+group+version triple.
///
/// Created once at export time and shared across repeated exports of the
/// same triple; the final export parameters are attached to it after the
/// per-protocol address is built.
#[derive(Debug)]
pub struct ServiceDescriptor {
    interface: ServiceInterface,
    group: Option<String>,
    version: Option<String>,
    key: String,
    attachments: Mutex<BTreeMap<String, String>>,
}

impl ServiceDescriptor {
    /// Create a descriptor for an interface+group+version triple.
    pub fn new(
        interface: ServiceInterface,
        group: Option<String>,
        version: Option<String>,
    ) -> Self {
        let key = service_key(&interface.name, group.as_deref(), version.as_deref());
        Self {
            interface,
            group,
            version,
            key,
            attachments: Mutex::new(BTreeMap::new()),
        }
    }

    /// The declared interface.
    pub fn interface(&self) -> &ServiceInterface {
        &self.interface
    }

    /// The service group.
    pub fn group(&self) -> Option<&str> {
        self.group.as_deref()
    }

    /// The service version.
    pub fn version(&self) -> Option<&str> {
        self.version.as_deref()
    }

    /// The unique service key.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Merge export parameters into the descriptor's attachments.
    pub fn attach_parameters(&self, params: &BTreeMap<String, String>) {
        let mut attachments = self.attachments.lock().unwrap_or_else(|e| e.into_inner());
        attachments.extend(params.iter().map(|(k, v)| (k.clone(), v.clone())));
    }

    /// Snapshot of the attachments.
    pub fn attachments(&self) -> BTreeMap<String, String> {
        self.attachments
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}
