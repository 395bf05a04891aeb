//! The process-owned registry of extension loaders.

use crate::loader::ExtensionLoader;
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::{Arc, RwLock, Weak};

/// One extension hub per process bootstrap.
///
/// The hub owns one [`ExtensionLoader`] per capability type, created on
/// first use and never evicted. It is shared by `Arc` and passed by
/// reference to everything that resolves extensions — there is no global
/// state.
pub struct ExtensionHub {
    loaders: RwLock<HashMap<TypeId, Arc<dyn Any + Send + Sync>>>,
    weak_self: Weak<ExtensionHub>,
}

impl ExtensionHub {
    /// Create an empty hub.
    pub fn new() -> Arc<Self> {
        Arc::new_cyclic(|weak| Self {
            loaders: RwLock::new(HashMap::new()),
            weak_self: weak.clone(),
        })
    }

    /// The loader for capability `T`, created on first use.
    ///
    /// `T` is the capability trait object type, e.g.
    /// `hub.loader::<dyn Protocol>()`.
    pub fn loader<T>(&self) -> Arc<ExtensionLoader<T>>
    where
        T: ?Sized + Send + Sync + 'static,
    {
        let key = TypeId::of::<T>();
        {
            let loaders = self.loaders.read().unwrap_or_else(|e| e.into_inner());
            if let Some(entry) = loaders.get(&key) {
                return downcast_loader(entry.clone());
            }
        }
        let mut loaders = self.loaders.write().unwrap_or_else(|e| e.into_inner());
        let entry = loaders.entry(key).or_insert_with(|| {
            ExtensionLoader::<T>::new_arc(self.weak_self.clone()) as Arc<dyn Any + Send + Sync>
        });
        downcast_loader(entry.clone())
    }
}

fn downcast_loader<T>(entry: Arc<dyn Any + Send + Sync>) -> Arc<ExtensionLoader<T>>
where
    T: ?Sized + Send + Sync + 'static,
{
    entry
        .downcast::<ExtensionLoader<T>>()
        .unwrap_or_else(|_| unreachable!("loader entries are keyed by their capability TypeId"))
}
