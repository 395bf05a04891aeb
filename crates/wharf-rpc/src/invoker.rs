//! Invokers — the callable handle a transport exports.

use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use wharf_types::{ServiceDescriptor, Url, WharfResult};

/// A local service implementation, callable by method name.
///
/// This is the typed stand-in for a reflective service reference: the
/// publication layer never inspects it, it only hands it to a
/// [`ProxyFactory`](crate::ProxyFactory) to be bound into an [`Invoker`].
pub trait RpcService: Send + Sync {
    /// Dispatch one call.
    fn call(&self, method: &str, args: Vec<Value>) -> WharfResult<Value>;
}

/// Shared handle to a service implementation.
pub type ServiceRef = Arc<dyn RpcService>;

/// One call travelling through an invoker.
#[derive(Debug, Clone, Default)]
pub struct Invocation {
    /// Method name.
    pub method: String,
    /// Positional arguments.
    pub args: Vec<Value>,
    /// Call attachments.
    pub attachments: BTreeMap<String, String>,
}

impl Invocation {
    /// An invocation with just a method and arguments.
    pub fn new(method: impl Into<String>, args: Vec<Value>) -> Self {
        Self {
            method: method.into(),
            args,
            attachments: BTreeMap::new(),
        }
    }
}

/// A callable bound to a service reference and an address.
pub trait Invoker: Send + Sync {
    /// The interface this invoker serves.
    fn interface(&self) -> &str;
    /// The address this invoker was built for.
    fn url(&self) -> &Url;
    /// Execute one call against the underlying service.
    fn invoke(&self, invocation: Invocation) -> WharfResult<Value>;
}

/// An invoker re-bound to a different address, forwarding calls unchanged.
///
/// Used by the registry-aware transport to hand the provider address to the
/// inner transport while the original invoker still carries the registry
/// address.
pub struct DelegateInvoker {
    inner: Arc<dyn Invoker>,
    url: Url,
}

impl DelegateInvoker {
    /// Rebind `inner` to `url`.
    pub fn new(inner: Arc<dyn Invoker>, url: Url) -> Self {
        Self { inner, url }
    }
}

impl Invoker for DelegateInvoker {
    fn interface(&self) -> &str {
        self.inner.interface()
    }

    fn url(&self) -> &Url {
        &self.url
    }

    fn invoke(&self, invocation: Invocation) -> WharfResult<Value> {
        self.inner.invoke(invocation)
    }
}

/// Decorates an invoker with the service descriptor of the export that
/// produced it.
pub struct MetadataInvoker {
    inner: Arc<dyn Invoker>,
    descriptor: Arc<ServiceDescriptor>,
}

impl MetadataInvoker {
    /// Attach `descriptor` to `inner`.
    pub fn new(inner: Arc<dyn Invoker>, descriptor: Arc<ServiceDescriptor>) -> Self {
        Self { inner, descriptor }
    }

    /// The export's service descriptor.
    pub fn descriptor(&self) -> &Arc<ServiceDescriptor> {
        &self.descriptor
    }
}

impl Invoker for MetadataInvoker {
    fn interface(&self) -> &str {
        self.inner.interface()
    }

    fn url(&self) -> &Url {
        self.inner.url()
    }

    fn invoke(&self, invocation: Invocation) -> WharfResult<Value> {
        self.inner.invoke(invocation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::BTreeMap;
    use wharf_types::ServiceInterface;

    struct Upper;
    impl RpcService for Upper {
        fn call(&self, _method: &str, args: Vec<Value>) -> WharfResult<Value> {
            let text = args[0].as_str().unwrap_or_default().to_uppercase();
            Ok(json!(text))
        }
    }

    struct Bound {
        service: ServiceRef,
        url: Url,
    }
    impl Invoker for Bound {
        fn interface(&self) -> &str {
            "demo.Upper"
        }
        fn url(&self) -> &Url {
            &self.url
        }
        fn invoke(&self, invocation: Invocation) -> WharfResult<Value> {
            self.service.call(&invocation.method, invocation.args)
        }
    }

    #[test]
    fn test_delegate_rebinds_url_only() {
        let url = Url::new("demo", "127.0.0.1", 9000, "Upper", BTreeMap::new());
        let bound = Arc::new(Bound {
            service: Arc::new(Upper),
            url: url.clone(),
        }) as Arc<dyn Invoker>;
        let rebound = DelegateInvoker::new(bound, url.with_scheme("injvm"));
        assert_eq!(rebound.url().scheme(), "injvm");
        assert_eq!(rebound.interface(), "demo.Upper");
        let result = rebound
            .invoke(Invocation::new("speak", vec![json!("hi")]))
            .unwrap();
        assert_eq!(result, json!("HI"));
    }

    #[test]
    fn test_metadata_invoker_exposes_descriptor() {
        let url = Url::new("demo", "127.0.0.1", 9000, "Upper", BTreeMap::new());
        let bound = Arc::new(Bound {
            service: Arc::new(Upper),
            url,
        }) as Arc<dyn Invoker>;
        let descriptor = Arc::new(ServiceDescriptor::new(
            ServiceInterface::new("demo.Upper", vec![]),
            None,
            None,
        ));
        let wrapped = MetadataInvoker::new(bound, descriptor.clone());
        assert_eq!(wrapped.descriptor().key(), "demo.Upper");
        assert_eq!(wrapped.interface(), "demo.Upper");
    }
}
