//! Well-known parameter keys, values, and scheme names.
//!
//! Every component communicates through [`crate::Url`] parameters; these
//! constants are the shared vocabulary.

/// Which side of a call an address describes.
pub const SIDE_KEY: &str = "side";
/// The provider side.
pub const PROVIDER_SIDE: &str = "provider";

/// Comma-separated method names exposed by a service.
pub const METHODS_KEY: &str = "methods";
/// Wildcard marker ("any method", "any value").
pub const ANY_VALUE: &str = "*";

/// Export visibility: `none`, `local`, or `remote` (unset means both).
pub const SCOPE_KEY: &str = "scope";
/// Skip export entirely.
pub const SCOPE_NONE: &str = "none";
/// In-process export only.
pub const SCOPE_LOCAL: &str = "local";
/// Network/registry export only.
pub const SCOPE_REMOTE: &str = "remote";

/// Service group.
pub const GROUP_KEY: &str = "group";
/// Service version.
pub const VERSION_KEY: &str = "version";
/// Fully qualified interface name.
pub const INTERFACE_KEY: &str = "interface";
/// Interface revision.
pub const REVISION_KEY: &str = "revision";
/// Generic (schema-free) service marker.
pub const GENERIC_KEY: &str = "generic";

/// Whether a registration is dynamic (removed when the provider goes away).
pub const DYNAMIC_KEY: &str = "dynamic";
/// The percent-encoded provider address embedded in a registry address.
pub const EXPORT_KEY: &str = "export";
/// Proxy-strategy override.
pub const PROXY_KEY: &str = "proxy";
/// Security token.
pub const TOKEN_KEY: &str = "token";
/// The percent-encoded monitor address attached to an export address.
pub const MONITOR_KEY: &str = "monitor";
/// Whether the address should be registered (default true).
pub const REGISTER_KEY: &str = "register";
/// Registry backend name carried on a registry address.
pub const REGISTRY_KEY: &str = "registry";

/// Metadata storage type selector.
pub const METADATA_KEY: &str = "metadata-type";
/// Default metadata storage type.
pub const DEFAULT_METADATA_STORAGE_TYPE: &str = "local";
/// Remote metadata storage type.
pub const REMOTE_METADATA_STORAGE_TYPE: &str = "remote";

/// Host the listener actually binds.
pub const BIND_IP_KEY: &str = "bind.ip";
/// Port the listener actually binds.
pub const BIND_PORT_KEY: &str = "bind.port";
/// Set when the bind host was auto-discovered rather than configured.
pub const ANYHOST_KEY: &str = "anyhost";

/// Framework release version runtime parameter.
pub const WHARF_VERSION_KEY: &str = "wharf";
/// Provider process id runtime parameter.
pub const PID_KEY: &str = "pid";
/// Export timestamp (epoch millis) runtime parameter.
pub const TIMESTAMP_KEY: &str = "timestamp";

/// Adaptive candidate key that reads the address scheme.
pub const PROTOCOL_SELECTOR_KEY: &str = "protocol";

/// The in-process transport scheme.
pub const LOCAL_PROTOCOL: &str = "injvm";
/// The registry-aware transport scheme.
pub const REGISTRY_PROTOCOL: &str = "registry";
/// Default path for registry addresses.
pub const REGISTRY_SERVICE_PATH: &str = "wharf.registry";
/// Registry backend that cannot be probed over TCP.
pub const MULTICAST: &str = "multicast";

/// Loopback host used for local exports.
pub const LOCALHOST: &str = "127.0.0.1";
/// The wildcard bind host.
pub const ANYHOST_VALUE: &str = "0.0.0.0";

/// Environment override for the bind host (optionally protocol-prefixed).
pub const WHARF_IP_TO_BIND: &str = "WHARF_IP_TO_BIND";
/// Environment override for the bind port (optionally protocol-prefixed).
pub const WHARF_PORT_TO_BIND: &str = "WHARF_PORT_TO_BIND";
/// Environment override for the advertised host.
pub const WHARF_IP_TO_REGISTRY: &str = "WHARF_IP_TO_REGISTRY";
/// Environment override for the advertised port.
pub const WHARF_PORT_TO_REGISTRY: &str = "WHARF_PORT_TO_REGISTRY";
