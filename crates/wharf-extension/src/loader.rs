//! Per-capability extension loading, caching, and wrapper chaining.

use crate::adaptive::AdaptiveExtension;
use crate::hub::ExtensionHub;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, OnceLock, RwLock, Weak};
use tracing::debug;
use wharf_types::{WharfError, WharfResult};

/// Factory for one named implementation. The hub is passed in so a factory
/// can resolve the other extensions it depends on at construction.
pub type ExtensionFactory<T> =
    Arc<dyn Fn(&Arc<ExtensionHub>) -> WharfResult<Arc<T>> + Send + Sync>;

type WrapperFn<T> = Arc<dyn Fn(Arc<T>) -> Arc<T> + Send + Sync>;

struct WrapperEntry<T: ?Sized> {
    priority: i32,
    seq: usize,
    wrap: WrapperFn<T>,
}

/// The static dispatch table for adaptive resolution: candidate `Url`
/// parameter keys consulted in order, and the name used when none match.
#[derive(Debug, Clone)]
pub struct AdaptiveSpec {
    /// Candidate parameter keys, highest priority first. The well-known key
    /// `protocol` reads the address scheme.
    pub keys: Vec<String>,
    /// Fallback extension name.
    pub default_name: Option<String>,
}

/// Owns the named implementations of one capability.
///
/// Instances are constructed lazily on first [`get`](Self::get), wrapped
/// with every registered wrapper in ascending priority order (registration
/// order breaks ties), cached as process-scoped singletons, and never
/// evicted. Wrappers must therefore be registered before the first `get`
/// of the capability.
pub struct ExtensionLoader<T: ?Sized + Send + Sync + 'static> {
    capability: String,
    hub: Weak<ExtensionHub>,
    weak_self: Weak<ExtensionLoader<T>>,
    factories: RwLock<HashMap<String, ExtensionFactory<T>>>,
    wrappers: RwLock<Vec<WrapperEntry<T>>>,
    cache: RwLock<HashMap<String, Arc<T>>>,
    build_lock: Mutex<()>,
    adaptive_spec: RwLock<Option<AdaptiveSpec>>,
    adaptive: OnceLock<Arc<AdaptiveExtension<T>>>,
}

impl<T: ?Sized + Send + Sync + 'static> ExtensionLoader<T> {
    pub(crate) fn new_arc(hub: Weak<ExtensionHub>) -> Arc<Self> {
        Arc::new_cyclic(|weak| Self {
            capability: short_type_name::<T>(),
            hub,
            weak_self: weak.clone(),
            factories: RwLock::new(HashMap::new()),
            wrappers: RwLock::new(Vec::new()),
            cache: RwLock::new(HashMap::new()),
            build_lock: Mutex::new(()),
            adaptive_spec: RwLock::new(None),
            adaptive: OnceLock::new(),
        })
    }

    /// Human-readable capability name, used in errors.
    pub fn capability(&self) -> &str {
        &self.capability
    }

    /// Register a named implementation. Names are lowercase and unique per
    /// capability; a duplicate fails with
    /// [`WharfError::DuplicateExtension`].
    pub fn register<F>(&self, name: &str, factory: F) -> WharfResult<()>
    where
        F: Fn(&Arc<ExtensionHub>) -> WharfResult<Arc<T>> + Send + Sync + 'static,
    {
        self.validate_name(name)?;
        let mut factories = self.factories.write().unwrap_or_else(|e| e.into_inner());
        if factories.contains_key(name) {
            return Err(WharfError::DuplicateExtension {
                capability: self.capability.clone(),
                name: name.to_string(),
            });
        }
        factories.insert(name.to_string(), Arc::new(factory));
        Ok(())
    }

    /// Register a named implementation, replacing any existing factory.
    ///
    /// Replacement only affects names that have not been instantiated yet;
    /// cached singletons are never evicted.
    pub fn register_or_replace<F>(&self, name: &str, factory: F) -> WharfResult<()>
    where
        F: Fn(&Arc<ExtensionHub>) -> WharfResult<Arc<T>> + Send + Sync + 'static,
    {
        self.validate_name(name)?;
        self.factories
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(name.to_string(), Arc::new(factory));
        Ok(())
    }

    /// Register a wrapper decorator, applied around every plain instance of
    /// this capability. Wrappers compose in ascending priority order: the
    /// lowest priority wraps first (innermost).
    pub fn register_wrapper<W>(&self, priority: i32, wrap: W)
    where
        W: Fn(Arc<T>) -> Arc<T> + Send + Sync + 'static,
    {
        let mut wrappers = self.wrappers.write().unwrap_or_else(|e| e.into_inner());
        let seq = wrappers.len();
        wrappers.push(WrapperEntry {
            priority,
            seq,
            wrap: Arc::new(wrap),
        });
    }

    /// Existence probe, for optional pipeline steps.
    pub fn has_extension(&self, name: &str) -> bool {
        self.factories
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .contains_key(name)
    }

    /// All registered names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .factories
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .keys()
            .cloned()
            .collect();
        names.sort();
        names
    }

    /// The cached singleton for `name`, constructed (and wrapped) on first
    /// use. Concurrent first access runs exactly one builder per name.
    ///
    /// A factory may resolve extensions of *other* capabilities through the
    /// hub; constructing a not-yet-built extension of the same capability
    /// from inside a factory is not supported (one build lock per loader).
    pub fn get(&self, name: &str) -> WharfResult<Arc<T>> {
        if let Some(hit) = self
            .cache
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(name)
        {
            return Ok(hit.clone());
        }
        let _build = self.build_lock.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(hit) = self
            .cache
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(name)
        {
            return Ok(hit.clone());
        }

        let factory = self
            .factories
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(name)
            .cloned()
            .ok_or_else(|| WharfError::ExtensionNotFound {
                capability: self.capability.clone(),
                name: name.to_string(),
            })?;
        let hub = self.hub.upgrade().ok_or_else(|| {
            WharfError::InvalidConfig("extension hub was dropped".to_string())
        })?;
        let mut instance = factory(&hub)?;

        let mut order: Vec<(i32, usize)> = {
            let wrappers = self.wrappers.read().unwrap_or_else(|e| e.into_inner());
            wrappers.iter().map(|w| (w.priority, w.seq)).collect()
        };
        order.sort();
        for (_, seq) in order {
            let wrap = {
                let wrappers = self.wrappers.read().unwrap_or_else(|e| e.into_inner());
                wrappers[seq].wrap.clone()
            };
            instance = wrap(instance);
        }
        debug!(capability = %self.capability, name, "Built extension singleton");

        self.cache
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(name.to_string(), instance.clone());
        Ok(instance)
    }

    /// Declare the adaptive dispatch table for this capability.
    pub fn declare_adaptive(&self, keys: &[&str], default_name: Option<&str>) {
        let mut spec = self.adaptive_spec.write().unwrap_or_else(|e| e.into_inner());
        *spec = Some(AdaptiveSpec {
            keys: keys.iter().map(|k| k.to_string()).collect(),
            default_name: default_name.map(str::to_string),
        });
    }

    pub(crate) fn adaptive_spec(&self) -> Option<AdaptiveSpec> {
        self.adaptive_spec
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// The adaptive dispatcher for this capability. Built once per process
    /// lifetime; repeated calls return the same instance.
    pub fn adaptive(&self) -> Arc<AdaptiveExtension<T>> {
        self.adaptive
            .get_or_init(|| {
                let loader = self
                    .weak_self
                    .upgrade()
                    .expect("a loader is always owned by the hub");
                Arc::new(AdaptiveExtension::new(loader))
            })
            .clone()
    }

    fn validate_name(&self, name: &str) -> WharfResult<()> {
        let valid = !name.is_empty()
            && name
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || "._-".contains(c));
        if valid {
            Ok(())
        } else {
            Err(WharfError::InvalidConfig(format!(
                "extension name '{name}' for capability '{}' must be lowercase",
                self.capability
            )))
        }
    }
}

/// Last path segment of a type name: `dyn crate::module::Protocol` →
/// `Protocol`.
fn short_type_name<T: ?Sized>() -> String {
    let full = std::any::type_name::<T>();
    full.rsplit("::").next().unwrap_or(full).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    trait Speak: Send + Sync {
        fn speak(&self) -> String;
    }

    struct Word(&'static str);
    impl Speak for Word {
        fn speak(&self) -> String {
            self.0.to_string()
        }
    }

    struct Tagged {
        inner: Arc<dyn Speak>,
        tag: &'static str,
    }
    impl Speak for Tagged {
        fn speak(&self) -> String {
            format!("{}({})", self.tag, self.inner.speak())
        }
    }

    fn loader() -> (Arc<ExtensionHub>, Arc<ExtensionLoader<dyn Speak>>) {
        let hub = ExtensionHub::new();
        let loader = hub.loader::<dyn Speak>();
        (hub, loader)
    }

    #[test]
    fn test_get_unregistered_fails() {
        let (_hub, loader) = loader();
        assert!(matches!(
            loader.get("missing"),
            Err(WharfError::ExtensionNotFound { .. })
        ));
    }

    #[test]
    fn test_duplicate_registration_fails() {
        let (_hub, loader) = loader();
        loader
            .register("word", |_| Ok(Arc::new(Word("a")) as Arc<dyn Speak>))
            .unwrap();
        assert!(matches!(
            loader.register("word", |_| Ok(Arc::new(Word("b")) as Arc<dyn Speak>)),
            Err(WharfError::DuplicateExtension { .. })
        ));
        loader
            .register_or_replace("word", |_| Ok(Arc::new(Word("b")) as Arc<dyn Speak>))
            .unwrap();
        assert_eq!(loader.get("word").unwrap().speak(), "b");
    }

    #[test]
    fn test_rejects_uppercase_names() {
        let (_hub, loader) = loader();
        assert!(loader
            .register("Word", |_| Ok(Arc::new(Word("a")) as Arc<dyn Speak>))
            .is_err());
    }

    #[test]
    fn test_singleton_caching() {
        let (_hub, loader) = loader();
        static BUILDS: AtomicUsize = AtomicUsize::new(0);
        loader
            .register("word", |_| {
                BUILDS.fetch_add(1, Ordering::SeqCst);
                Ok(Arc::new(Word("a")) as Arc<dyn Speak>)
            })
            .unwrap();
        let first = loader.get("word").unwrap();
        let second = loader.get("word").unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(BUILDS.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_concurrent_first_access_builds_once() {
        let (_hub, loader) = loader();
        let builds = Arc::new(AtomicUsize::new(0));
        let counting = builds.clone();
        loader
            .register("word", move |_| {
                counting.fetch_add(1, Ordering::SeqCst);
                Ok(Arc::new(Word("a")) as Arc<dyn Speak>)
            })
            .unwrap();
        let mut handles = Vec::new();
        for _ in 0..8 {
            let loader = loader.clone();
            handles.push(std::thread::spawn(move || loader.get("word").unwrap().speak()));
        }
        for handle in handles {
            assert_eq!(handle.join().unwrap(), "a");
        }
        assert_eq!(builds.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_wrapper_chain_order() {
        let (_hub, loader) = loader();
        loader
            .register("word", |_| Ok(Arc::new(Word("x")) as Arc<dyn Speak>))
            .unwrap();
        // Higher priority wraps later, ending up outermost.
        loader.register_wrapper(10, |inner| {
            Arc::new(Tagged { inner, tag: "outer" }) as Arc<dyn Speak>
        });
        loader.register_wrapper(0, |inner| {
            Arc::new(Tagged { inner, tag: "inner" }) as Arc<dyn Speak>
        });
        assert_eq!(loader.get("word").unwrap().speak(), "outer(inner(x))");
    }

    #[test]
    fn test_wrapper_tie_breaks_by_registration_order() {
        let (_hub, loader) = loader();
        loader
            .register("word", |_| Ok(Arc::new(Word("x")) as Arc<dyn Speak>))
            .unwrap();
        loader.register_wrapper(5, |inner| {
            Arc::new(Tagged { inner, tag: "first" }) as Arc<dyn Speak>
        });
        loader.register_wrapper(5, |inner| {
            Arc::new(Tagged { inner, tag: "second" }) as Arc<dyn Speak>
        });
        assert_eq!(loader.get("word").unwrap().speak(), "second(first(x))");
    }

    trait Shout: Send + Sync {
        fn shout(&self) -> String;
    }

    struct Amplifier {
        inner: Arc<dyn Speak>,
    }
    impl Shout for Amplifier {
        fn shout(&self) -> String {
            self.inner.speak().to_uppercase()
        }
    }

    #[test]
    fn test_factory_can_use_hub_for_injection() {
        let (hub, loader) = loader();
        loader
            .register("word", |_| Ok(Arc::new(Word("dep")) as Arc<dyn Speak>))
            .unwrap();
        let shouters = hub.loader::<dyn Shout>();
        shouters
            .register("amplifier", |hub| {
                let inner = hub.loader::<dyn Speak>().get("word")?;
                Ok(Arc::new(Amplifier { inner }) as Arc<dyn Shout>)
            })
            .unwrap();
        assert_eq!(shouters.get("amplifier").unwrap().shout(), "DEP");
    }

    #[test]
    fn test_has_extension_and_names() {
        let (_hub, loader) = loader();
        assert!(!loader.has_extension("word"));
        loader
            .register("word", |_| Ok(Arc::new(Word("a")) as Arc<dyn Speak>))
            .unwrap();
        assert!(loader.has_extension("word"));
        assert_eq!(loader.names(), vec!["word".to_string()]);
    }
}
