//! Host and port resolution for export addresses.
//!
//! Both chains are deterministic priority lists with multiple fallback
//! sources (see the doc on each function). The host/port a listener binds
//! and the host/port advertised to registries are resolved independently;
//! the advertised value defaults to the bind value.

use std::collections::{BTreeMap, HashMap};
use std::net::{TcpListener, TcpStream, ToSocketAddrs, UdpSocket};
use std::sync::Mutex;
use std::time::Duration;
use tracing::{debug, info, warn};
use wharf_types::config::{ProtocolConfig, ProviderConfig};
use wharf_types::{keys, Url, WharfError, WharfResult};

/// Hosts that cannot be advertised: empty, localhost, wildcard, loopback.
pub fn is_invalid_local_host(host: &str) -> bool {
    host.is_empty()
        || host.eq_ignore_ascii_case("localhost")
        || host == keys::ANYHOST_VALUE
        || host.starts_with("127.")
}

/// Read a protocol-prefixed environment override, falling back to the plain
/// key: `DEMO_WHARF_IP_TO_BIND` before `WHARF_IP_TO_BIND`.
fn env_override(protocol: &str, key: &str) -> Option<String> {
    let prefixed = format!("{}_{}", protocol.to_uppercase(), key);
    std::env::var(prefixed)
        .ok()
        .filter(|v| !v.is_empty())
        .or_else(|| std::env::var(key).ok().filter(|v| !v.is_empty()))
}

/// Resolve the bind host and the advertised host for one protocol.
///
/// Bind priority: protocol-prefixed env override → plain env override →
/// protocol config host → provider host → DNS lookup of the local hostname
/// → a one-second TCP probe against each non-multicast registry address →
/// best-guess local interface → loopback. An explicit env override that
/// fails validity checks is a fatal configuration error.
///
/// Records `bind.ip` and `anyhost` in `map`; returns the advertised host,
/// which defaults to the bind host unless overridden through
/// `WHARF_IP_TO_REGISTRY`.
pub fn find_configured_host(
    name: &str,
    protocol: &ProtocolConfig,
    provider: Option<&ProviderConfig>,
    registries: &[Url],
    map: &mut BTreeMap<String, String>,
) -> WharfResult<String> {
    let mut anyhost = false;

    let mut host_to_bind = env_override(name, keys::WHARF_IP_TO_BIND);
    if let Some(host) = &host_to_bind {
        if is_invalid_local_host(host) {
            return Err(WharfError::InvalidConfig(format!(
                "invalid bind host '{host}' from property {}",
                keys::WHARF_IP_TO_BIND
            )));
        }
    }

    if host_to_bind.is_none() {
        host_to_bind = protocol
            .host
            .clone()
            .filter(|h| !h.is_empty())
            .or_else(|| {
                provider
                    .and_then(|p| p.host.clone())
                    .filter(|h| !h.is_empty())
            });
        if host_to_bind.as_deref().map_or(true, is_invalid_local_host) {
            anyhost = true;
            info!("No valid bind host configured, trying to discover one");
            let mut discovered = local_dns_host();
            if discovered.as_deref().map_or(true, is_invalid_local_host) {
                discovered = probe_registry_host(registries).or(discovered);
            }
            if discovered.as_deref().map_or(true, is_invalid_local_host) {
                discovered = Some(best_guess_local_host());
            }
            host_to_bind = discovered;
        }
    }
    let host_to_bind = host_to_bind.unwrap_or_else(|| keys::LOCALHOST.to_string());

    map.insert(keys::BIND_IP_KEY.to_string(), host_to_bind.clone());
    map.insert(keys::ANYHOST_KEY.to_string(), anyhost.to_string());

    // The advertised host is resolved independently of the bind host.
    match env_override(name, keys::WHARF_IP_TO_REGISTRY) {
        Some(host) if is_invalid_local_host(&host) => Err(WharfError::InvalidConfig(format!(
            "invalid advertised host '{host}' from property {}",
            keys::WHARF_IP_TO_REGISTRY
        ))),
        Some(host) => Ok(host),
        None => Ok(host_to_bind),
    }
}

/// DNS resolution of the local hostname, when the environment names one.
fn local_dns_host() -> Option<String> {
    let hostname = std::env::var("HOSTNAME").ok().filter(|h| !h.is_empty())?;
    let addrs = (hostname.as_str(), 0u16).to_socket_addrs().ok()?;
    let host = addrs
        .filter(|a| a.is_ipv4())
        .map(|a| a.ip().to_string())
        .next();
    debug!(
        hostname = %hostname,
        host = host.as_deref().unwrap_or(""),
        "Resolved local hostname through DNS"
    );
    host
}

/// Learn the locally routable interface by connecting to a registry.
fn probe_registry_host(registries: &[Url]) -> Option<String> {
    for registry in registries {
        // Multicast backends cannot be reached over a plain socket.
        if registry
            .parameter(keys::REGISTRY_KEY)
            .is_some_and(|r| r.eq_ignore_ascii_case(keys::MULTICAST))
        {
            continue;
        }
        let target = registry.address();
        let Ok(addrs) = target.to_socket_addrs() else {
            continue;
        };
        for addr in addrs {
            match TcpStream::connect_timeout(&addr, Duration::from_secs(1)) {
                Ok(stream) => {
                    if let Ok(local) = stream.local_addr() {
                        let host = local.ip().to_string();
                        debug!(registry = %target, host, "Learned bind host from registry probe");
                        return Some(host);
                    }
                }
                Err(e) => warn!(registry = %target, error = %e, "Registry probe failed"),
            }
        }
    }
    None
}

/// Ask the OS which interface outbound traffic would leave through. The
/// connected UDP socket never sends anything.
fn best_guess_local_host() -> String {
    let guess = UdpSocket::bind((keys::ANYHOST_VALUE, 0)).and_then(|socket| {
        socket.connect(("8.8.8.8", 53))?;
        socket.local_addr()
    });
    match guess {
        Ok(addr) => {
            let host = addr.ip().to_string();
            if is_invalid_local_host(&host) {
                keys::LOCALHOST.to_string()
            } else {
                host
            }
        }
        Err(_) => keys::LOCALHOST.to_string(),
    }
}

/// Resolve the bind port and the advertised port for one protocol.
///
/// Bind priority: protocol-prefixed env override → plain env override →
/// protocol config port → provider port → transport default port → the
/// process-wide cache of previously chosen ephemeral ports for this
/// protocol name → a freshly probed OS port, cached for later exports of
/// the same protocol. The cache read and write happen under one lock so
/// two concurrent exports cannot race to the same ephemeral port.
///
/// Records `bind.port` in `map`; returns the advertised port, which
/// defaults to the bind port unless overridden through
/// `WHARF_PORT_TO_REGISTRY`.
pub fn find_configured_port(
    name: &str,
    protocol: &ProtocolConfig,
    provider: Option<&ProviderConfig>,
    default_port: u16,
    random_ports: &Mutex<HashMap<String, u16>>,
    map: &mut BTreeMap<String, String>,
) -> WharfResult<u16> {
    let mut port_to_bind = parse_port_override(env_override(name, keys::WHARF_PORT_TO_BIND))?;
    if port_to_bind.is_none() {
        port_to_bind = protocol
            .port
            .filter(|p| *p > 0)
            .or_else(|| provider.and_then(|p| p.port).filter(|p| *p > 0))
            .or((default_port > 0).then_some(default_port));
    }
    let port_to_bind = match port_to_bind {
        Some(port) => port,
        None => {
            let mut cache = random_ports.lock().unwrap_or_else(|e| e.into_inner());
            match cache.get(name) {
                Some(port) => *port,
                None => {
                    let probed = available_port(default_port)?;
                    cache.insert(name.to_string(), probed);
                    warn!(protocol = name, port = probed, "Using a random available port");
                    probed
                }
            }
        }
    };

    map.insert(keys::BIND_PORT_KEY.to_string(), port_to_bind.to_string());

    match parse_port_override(env_override(name, keys::WHARF_PORT_TO_REGISTRY))? {
        Some(port) => Ok(port),
        None => Ok(port_to_bind),
    }
}

fn parse_port_override(value: Option<String>) -> WharfResult<Option<u16>> {
    match value {
        None => Ok(None),
        Some(raw) => match raw.parse::<u16>() {
            Ok(port) if port > 0 => Ok(Some(port)),
            _ => Err(WharfError::InvalidConfig(format!(
                "invalid port override '{raw}'"
            ))),
        },
    }
}

/// Find a bindable port, preferring `preferred` and scanning upward from
/// it; with no preference, take an OS-assigned ephemeral port.
pub fn available_port(preferred: u16) -> WharfResult<u16> {
    if preferred > 0 {
        let end = preferred.saturating_add(1024);
        for port in preferred..=end {
            if TcpListener::bind((keys::ANYHOST_VALUE, port)).is_ok() {
                return Ok(port);
            }
        }
    }
    let listener = TcpListener::bind((keys::ANYHOST_VALUE, 0))?;
    Ok(listener.local_addr()?.port())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_local_hosts() {
        assert!(is_invalid_local_host(""));
        assert!(is_invalid_local_host("localhost"));
        assert!(is_invalid_local_host("LOCALHOST"));
        assert!(is_invalid_local_host("0.0.0.0"));
        assert!(is_invalid_local_host("127.0.0.1"));
        assert!(is_invalid_local_host("127.1.2.3"));
        assert!(!is_invalid_local_host("10.0.0.5"));
        assert!(!is_invalid_local_host("192.168.1.20"));
    }

    #[test]
    fn test_configured_host_wins() {
        let protocol = ProtocolConfig {
            name: "demo".to_string(),
            host: Some("10.0.0.5".to_string()),
            ..Default::default()
        };
        let mut map = BTreeMap::new();
        let host = find_configured_host("demo", &protocol, None, &[], &mut map).unwrap();
        assert_eq!(host, "10.0.0.5");
        assert_eq!(map.get("bind.ip").map(String::as_str), Some("10.0.0.5"));
        assert_eq!(map.get("anyhost").map(String::as_str), Some("false"));
    }

    #[test]
    fn test_provider_host_backs_up_protocol_host() {
        let protocol = ProtocolConfig::new("demo");
        let provider = ProviderConfig {
            host: Some("192.168.1.20".to_string()),
            ..Default::default()
        };
        let mut map = BTreeMap::new();
        let host =
            find_configured_host("demo", &protocol, Some(&provider), &[], &mut map).unwrap();
        assert_eq!(host, "192.168.1.20");
    }

    #[test]
    fn test_invalid_configured_host_falls_through_to_discovery() {
        let protocol = ProtocolConfig {
            name: "demo".to_string(),
            host: Some("127.0.0.1".to_string()),
            ..Default::default()
        };
        let mut map = BTreeMap::new();
        let host = find_configured_host("demo", &protocol, None, &[], &mut map).unwrap();
        // Whatever discovery produced, the chain flagged it as auto-found.
        assert!(!host.is_empty());
        assert_eq!(map.get("anyhost").map(String::as_str), Some("true"));
    }

    #[test]
    fn test_invalid_env_host_is_fatal() {
        std::env::set_var("HOSTCHECKA_WHARF_IP_TO_BIND", "localhost");
        let protocol = ProtocolConfig::new("hostchecka");
        let mut map = BTreeMap::new();
        let result = find_configured_host("hostchecka", &protocol, None, &[], &mut map);
        std::env::remove_var("HOSTCHECKA_WHARF_IP_TO_BIND");
        assert!(matches!(result, Err(WharfError::InvalidConfig(_))));
    }

    #[test]
    fn test_env_host_override_wins() {
        std::env::set_var("HOSTCHECKB_WHARF_IP_TO_BIND", "10.9.9.9");
        let protocol = ProtocolConfig {
            name: "hostcheckb".to_string(),
            host: Some("10.0.0.5".to_string()),
            ..Default::default()
        };
        let mut map = BTreeMap::new();
        let host = find_configured_host("hostcheckb", &protocol, None, &[], &mut map).unwrap();
        std::env::remove_var("HOSTCHECKB_WHARF_IP_TO_BIND");
        assert_eq!(host, "10.9.9.9");
        assert_eq!(map.get("bind.ip").map(String::as_str), Some("10.9.9.9"));
    }

    #[test]
    fn test_port_priority_chain() {
        let random_ports = Mutex::new(HashMap::new());
        let mut map = BTreeMap::new();
        let protocol = ProtocolConfig {
            name: "demo".to_string(),
            port: Some(9000),
            ..Default::default()
        };
        let port =
            find_configured_port("demo", &protocol, None, 7000, &random_ports, &mut map).unwrap();
        assert_eq!(port, 9000);
        assert_eq!(map.get("bind.port").map(String::as_str), Some("9000"));

        // No configured port: the transport default applies.
        let mut map = BTreeMap::new();
        let protocol = ProtocolConfig::new("demo");
        let port =
            find_configured_port("demo", &protocol, None, 7000, &random_ports, &mut map).unwrap();
        assert_eq!(port, 7000);
    }

    #[test]
    fn test_probed_port_is_cached_per_protocol() {
        let random_ports = Mutex::new(HashMap::new());
        let protocol = ProtocolConfig::new("probed");
        let mut map = BTreeMap::new();
        let first =
            find_configured_port("probed", &protocol, None, 0, &random_ports, &mut map).unwrap();
        assert!(first > 0);
        let mut map = BTreeMap::new();
        let second =
            find_configured_port("probed", &protocol, None, 0, &random_ports, &mut map).unwrap();
        assert_eq!(first, second);
        // A different protocol name gets its own cache entry.
        let mut map = BTreeMap::new();
        find_configured_port(
            "probedother",
            &ProtocolConfig::new("probedother"),
            None,
            0,
            &random_ports,
            &mut map,
        )
        .unwrap();
        let cache = random_ports.lock().unwrap();
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_invalid_env_port_is_fatal() {
        std::env::set_var("PORTCHECKA_WHARF_PORT_TO_BIND", "not-a-port");
        let random_ports = Mutex::new(HashMap::new());
        let mut map = BTreeMap::new();
        let result = find_configured_port(
            "portchecka",
            &ProtocolConfig::new("portchecka"),
            None,
            0,
            &random_ports,
            &mut map,
        );
        std::env::remove_var("PORTCHECKA_WHARF_PORT_TO_BIND");
        assert!(matches!(result, Err(WharfError::InvalidConfig(_))));
    }

    #[test]
    fn test_advertised_port_defaults_to_bind_port() {
        std::env::set_var("PORTCHECKB_WHARF_PORT_TO_REGISTRY", "9100");
        let random_ports = Mutex::new(HashMap::new());
        let mut map = BTreeMap::new();
        let protocol = ProtocolConfig {
            name: "portcheckb".to_string(),
            port: Some(9000),
            ..Default::default()
        };
        let advertised = find_configured_port(
            "portcheckb",
            &protocol,
            None,
            0,
            &random_ports,
            &mut map,
        )
        .unwrap();
        std::env::remove_var("PORTCHECKB_WHARF_PORT_TO_REGISTRY");
        assert_eq!(advertised, 9100);
        assert_eq!(map.get("bind.port").map(String::as_str), Some("9000"));
    }

    #[test]
    fn test_available_port_scans_upward() {
        // Hold a listener so the preferred port is taken.
        let holder = TcpListener::bind(("0.0.0.0", 0)).unwrap();
        let taken = holder.local_addr().unwrap().port();
        let found = available_port(taken).unwrap();
        assert!(found >= taken);
        assert_ne!(found, taken);
    }
}
