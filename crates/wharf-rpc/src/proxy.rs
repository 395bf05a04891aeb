//! Proxy factories bind a service reference into an invoker.

use crate::invoker::{Invocation, Invoker, ServiceRef};
use serde_json::Value;
use std::sync::Arc;
use wharf_types::{ServiceInterface, Url, WharfResult};

/// Builds the invoker a transport exports, from a service reference, its
/// declared interface, and the export address.
///
/// Selected adaptively through the `proxy` parameter of the address, so a
/// custom strategy can be swapped in per export without touching the
/// pipeline.
pub trait ProxyFactory: Send + Sync {
    /// Bind `service` into an invoker for `url`.
    fn get_invoker(
        &self,
        service: ServiceRef,
        interface: &ServiceInterface,
        url: &Url,
    ) -> WharfResult<Arc<dyn Invoker>>;
}

/// The default proxy strategy: no generated code, the invoker simply
/// forwards each call to [`RpcService::call`].
pub struct PassthroughProxyFactory;

impl ProxyFactory for PassthroughProxyFactory {
    fn get_invoker(
        &self,
        service: ServiceRef,
        interface: &ServiceInterface,
        url: &Url,
    ) -> WharfResult<Arc<dyn Invoker>> {
        Ok(Arc::new(PassthroughInvoker {
            service,
            interface: interface.name.clone(),
            url: url.clone(),
        }))
    }
}

struct PassthroughInvoker {
    service: ServiceRef,
    interface: String,
    url: Url,
}

impl Invoker for PassthroughInvoker {
    fn interface(&self) -> &str {
        &self.interface
    }

    fn url(&self) -> &Url {
        &self.url
    }

    fn invoke(&self, invocation: Invocation) -> WharfResult<Value> {
        self.service.call(&invocation.method, invocation.args)
    }
}
