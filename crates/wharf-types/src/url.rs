//! The Wharf address value.
//!
//! A [`Url`] is an immutable, self-describing endpoint descriptor —
//! `scheme://host:port/path?key=value&...` — used both as a network address
//! and as a generic typed configuration carrier. It is the universal
//! currency between the extension hub, the transports, the registries, and
//! the export pipeline, and it doubles as the selector for adaptive
//! dispatch.
//!
//! All "mutations" return a new value. Equality and hashing are structural,
//! and the string form round-trips losslessly for any parameter map,
//! including parameters whose value is itself a full `Url` string.

use crate::error::{WharfError, WharfResult};
use crate::keys;
use crate::service;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Immutable scheme/host/port/path/parameters address value.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Url {
    scheme: String,
    host: String,
    port: u16,
    path: String,
    params: BTreeMap<String, String>,
}

impl Url {
    /// Create an address from its parts. The path keeps no leading slash.
    pub fn new(
        scheme: impl Into<String>,
        host: impl Into<String>,
        port: u16,
        path: impl Into<String>,
        params: BTreeMap<String, String>,
    ) -> Self {
        let path: String = path.into();
        Self {
            scheme: scheme.into(),
            host: host.into(),
            port,
            path: path.trim_start_matches('/').to_string(),
            params,
        }
    }

    /// Parse the external string form.
    ///
    /// Parameter values are percent-decoded; a decoded value may itself be a
    /// nested `Url` string (see [`Url::parameter_url`]).
    pub fn parse(input: &str) -> WharfResult<Self> {
        let parsed = url::Url::parse(input).map_err(|e| WharfError::InvalidAddress {
            input: input.to_string(),
            reason: e.to_string(),
        })?;
        if parsed.cannot_be_a_base() {
            return Err(WharfError::InvalidAddress {
                input: input.to_string(),
                reason: "missing '//' authority".to_string(),
            });
        }
        let mut params = BTreeMap::new();
        for (k, v) in parsed.query_pairs() {
            params.insert(k.into_owned(), v.into_owned());
        }
        Ok(Self {
            scheme: parsed.scheme().to_string(),
            host: parsed.host_str().unwrap_or("").to_string(),
            port: parsed.port().unwrap_or(0),
            path: parsed.path().trim_start_matches('/').to_string(),
            params,
        })
    }

    /// The scheme (transport or registry protocol name).
    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    /// The host, empty when the address has no authority.
    pub fn host(&self) -> &str {
        &self.host
    }

    /// The port; 0 means "unset".
    pub fn port(&self) -> u16 {
        self.port
    }

    /// The path with no leading slash.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// The full parameter map.
    pub fn parameters(&self) -> &BTreeMap<String, String> {
        &self.params
    }

    /// `host:port`.
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Look up a parameter.
    pub fn parameter(&self, key: &str) -> Option<&str> {
        self.params.get(key).map(String::as_str)
    }

    /// Look up a parameter, falling back to a default.
    pub fn parameter_or<'a>(&'a self, key: &str, default: &'a str) -> &'a str {
        self.parameter(key).unwrap_or(default)
    }

    /// Look up a boolean parameter ("true"/"false"), falling back to a
    /// default for absent or unparsable values.
    pub fn bool_parameter(&self, key: &str, default: bool) -> bool {
        self.parameter(key)
            .and_then(|v| v.parse::<bool>().ok())
            .unwrap_or(default)
    }

    /// Parse a parameter value as a nested address.
    ///
    /// The value was percent-decoded once during [`Url::parse`], so it is a
    /// plain `Url` string here.
    pub fn parameter_url(&self, key: &str) -> WharfResult<Option<Url>> {
        self.parameter(key).map(Url::parse).transpose()
    }

    /// Look up a method-scoped parameter (`"<method>.<key>"`).
    pub fn method_parameter(&self, method: &str, key: &str) -> Option<&str> {
        self.parameter(&format!("{method}.{key}"))
    }

    /// The accessor adaptive dispatch resolves candidate keys through: the
    /// well-known key `protocol` reads the scheme, every other key reads the
    /// parameter map. Empty values count as absent.
    pub fn selector_value(&self, key: &str) -> Option<&str> {
        let value = if key == keys::PROTOCOL_SELECTOR_KEY {
            Some(self.scheme.as_str())
        } else {
            self.parameter(key)
        };
        value.filter(|v| !v.is_empty())
    }

    /// The service key (`[group/]path_or_interface[:version]`) this address
    /// describes.
    pub fn service_key(&self) -> String {
        let name = self.parameter(keys::INTERFACE_KEY).unwrap_or(&self.path);
        service::service_key(name, self.parameter(keys::GROUP_KEY), self.parameter(keys::VERSION_KEY))
    }

    /// A copy with a different scheme.
    pub fn with_scheme(&self, scheme: impl Into<String>) -> Self {
        let mut next = self.clone();
        next.scheme = scheme.into();
        next
    }

    /// A copy with a different host.
    pub fn with_host(&self, host: impl Into<String>) -> Self {
        let mut next = self.clone();
        next.host = host.into();
        next
    }

    /// A copy with a different port.
    pub fn with_port(&self, port: u16) -> Self {
        let mut next = self.clone();
        next.port = port;
        next
    }

    /// A copy with a different path.
    pub fn with_path(&self, path: impl Into<String>) -> Self {
        let path: String = path.into();
        let mut next = self.clone();
        next.path = path.trim_start_matches('/').to_string();
        next
    }

    /// A copy with one parameter set.
    pub fn with_parameter(&self, key: impl Into<String>, value: impl Into<String>) -> Self {
        let mut next = self.clone();
        next.params.insert(key.into(), value.into());
        next
    }

    /// A copy with one parameter set, unless the key is already present.
    pub fn with_parameter_if_absent(
        &self,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        let key = key.into();
        if self.params.contains_key(&key) {
            return self.clone();
        }
        self.with_parameter(key, value)
    }

    /// A copy with every entry of `extra` set.
    pub fn with_parameters<I, K, V>(&self, extra: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let mut next = self.clone();
        for (k, v) in extra {
            next.params.insert(k.into(), v.into());
        }
        next
    }

    /// A copy without the given parameter.
    pub fn without_parameter(&self, key: &str) -> Self {
        let mut next = self.clone();
        next.params.remove(key);
        next
    }
}

impl fmt::Display for Url {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://", self.scheme)?;
        if !self.host.is_empty() {
            f.write_str(&self.host)?;
            if self.port > 0 {
                write!(f, ":{}", self.port)?;
            }
        }
        write!(f, "/{}", self.path)?;
        if !self.params.is_empty() {
            let mut query = url::form_urlencoded::Serializer::new(String::new());
            for (k, v) in &self.params {
                query.append_pair(k, v);
            }
            write!(f, "?{}", query.finish())?;
        }
        Ok(())
    }
}

impl FromStr for Url {
    type Err = WharfError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Url::parse(s)
    }
}
