//! Per-call extension resolution from an address value.

use crate::loader::ExtensionLoader;
use std::sync::Arc;
use wharf_types::{Url, WharfError, WharfResult};

/// Resolves which named implementation of a capability a call should use,
/// from the [`Url`] the call carries.
///
/// The capability's [`AdaptiveSpec`](crate::AdaptiveSpec) lists candidate
/// parameter keys in order; the first non-empty value names the extension,
/// and the declared default applies when none match. The same call site can
/// switch transports, proxy strategies, or registries purely by varying a
/// string in the address.
pub struct AdaptiveExtension<T: ?Sized + Send + Sync + 'static> {
    loader: Arc<ExtensionLoader<T>>,
}

impl<T: ?Sized + Send + Sync + 'static> AdaptiveExtension<T> {
    pub(crate) fn new(loader: Arc<ExtensionLoader<T>>) -> Self {
        Self { loader }
    }

    /// Resolve and return the implementation for `url`.
    pub fn select(&self, url: &Url) -> WharfResult<Arc<T>> {
        let spec = self.loader.adaptive_spec().ok_or_else(|| {
            WharfError::InvalidConfig(format!(
                "capability '{}' has no adaptive declaration",
                self.loader.capability()
            ))
        })?;

        let mut name = None;
        let mut source = "default".to_string();
        for key in &spec.keys {
            if let Some(value) = url.selector_value(key) {
                name = Some(value.to_string());
                source = format!("parameter '{key}'");
                break;
            }
        }
        let name = match name.or_else(|| spec.default_name.clone()) {
            Some(name) => name,
            None => {
                return Err(WharfError::AdaptiveResolution {
                    capability: self.loader.capability().to_string(),
                    name: "<unset>".to_string(),
                    origin: source,
                })
            }
        };

        self.loader.get(&name).map_err(|e| match e {
            WharfError::ExtensionNotFound { capability, name } => {
                WharfError::AdaptiveResolution {
                    capability,
                    name,
                    origin: source,
                }
            }
            other => other,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hub::ExtensionHub;
    use std::collections::BTreeMap;

    trait Pick: Send + Sync {
        fn id(&self) -> &'static str;
    }

    struct Named(&'static str);
    impl Pick for Named {
        fn id(&self) -> &'static str {
            self.0
        }
    }

    fn url_with(params: &[(&str, &str)]) -> Url {
        let map: BTreeMap<String, String> = params
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Url::new("demo", "127.0.0.1", 9000, "Echo", map)
    }

    fn adaptive() -> Arc<AdaptiveExtension<dyn Pick>> {
        let hub = ExtensionHub::new();
        let loader = hub.loader::<dyn Pick>();
        loader.declare_adaptive(&["p1", "p2"], Some("d"));
        loader
            .register("d", |_| Ok(Arc::new(Named("d")) as Arc<dyn Pick>))
            .unwrap();
        loader
            .register("foo", |_| Ok(Arc::new(Named("foo")) as Arc<dyn Pick>))
            .unwrap();
        loader
            .register("bar", |_| Ok(Arc::new(Named("bar")) as Arc<dyn Pick>))
            .unwrap();
        loader.adaptive()
    }

    #[test]
    fn test_second_key_resolves() {
        let adaptive = adaptive();
        let url = url_with(&[("p2", "foo")]);
        assert_eq!(adaptive.select(&url).unwrap().id(), "foo");
    }

    #[test]
    fn test_key_order_wins() {
        let adaptive = adaptive();
        let url = url_with(&[("p1", "bar"), ("p2", "foo")]);
        assert_eq!(adaptive.select(&url).unwrap().id(), "bar");
    }

    #[test]
    fn test_default_when_no_key_present() {
        let adaptive = adaptive();
        assert_eq!(adaptive.select(&url_with(&[])).unwrap().id(), "d");
        // Empty values count as absent.
        let url = url_with(&[("p1", ""), ("p2", "")]);
        assert_eq!(adaptive.select(&url).unwrap().id(), "d");
    }

    #[test]
    fn test_unregistered_resolved_name_fails() {
        let adaptive = adaptive();
        let url = url_with(&[("p1", "nope")]);
        assert!(matches!(
            adaptive.select(&url),
            Err(WharfError::AdaptiveResolution { name, .. }) if name == "nope"
        ));
    }

    #[test]
    fn test_scheme_selector() {
        let hub = ExtensionHub::new();
        let loader = hub.loader::<dyn Pick>();
        loader.declare_adaptive(&["protocol"], None);
        loader
            .register("demo", |_| Ok(Arc::new(Named("demo")) as Arc<dyn Pick>))
            .unwrap();
        let adaptive = loader.adaptive();
        assert_eq!(adaptive.select(&url_with(&[])).unwrap().id(), "demo");
    }

    #[test]
    fn test_adaptive_proxy_is_cached() {
        let hub = ExtensionHub::new();
        let loader = hub.loader::<dyn Pick>();
        loader.declare_adaptive(&["p1"], None);
        let first = loader.adaptive();
        let second = loader.adaptive();
        assert!(Arc::ptr_eq(&first, &second));
    }
}
