//! The in-process transport.

use crate::invoker::Invoker;
use crate::protocol::{Exporter, Protocol};
use dashmap::DashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};
use wharf_types::{Url, WharfResult};

/// Transport for the `injvm` scheme: exported invokers go into a shared
/// in-process table instead of behind a listener, so same-process callers
/// can invoke without any wire.
#[derive(Default)]
pub struct InjvmProtocol {
    exported: Arc<DashMap<String, Arc<dyn Invoker>>>,
}

impl InjvmProtocol {
    /// An empty in-process table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up an exported invoker by service key.
    pub fn lookup(&self, service_key: &str) -> Option<Arc<dyn Invoker>> {
        self.exported.get(service_key).map(|e| e.value().clone())
    }

    /// Number of live in-process exports.
    pub fn exported_count(&self) -> usize {
        self.exported.len()
    }
}

impl Protocol for InjvmProtocol {
    fn default_port(&self) -> u16 {
        0
    }

    fn export(&self, invoker: Arc<dyn Invoker>) -> WharfResult<Box<dyn Exporter>> {
        let url = invoker.url().clone();
        let key = url.service_key();
        if self.exported.insert(key.clone(), invoker).is_some() {
            warn!(service = %key, "Replaced an existing in-process export");
        }
        debug!(service = %key, url = %url, "Exported service in-process");
        Ok(Box::new(InjvmExporter {
            table: self.exported.clone(),
            key,
            url,
            torn_down: AtomicBool::new(false),
        }))
    }
}

struct InjvmExporter {
    table: Arc<DashMap<String, Arc<dyn Invoker>>>,
    key: String,
    url: Url,
    torn_down: AtomicBool,
}

impl Exporter for InjvmExporter {
    fn url(&self) -> &Url {
        &self.url
    }

    fn unexport(&self) -> WharfResult<()> {
        if self.torn_down.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        self.table.remove(&self.key);
        debug!(service = %self.key, "Removed in-process export");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::invoker::{Invocation, RpcService};
    use crate::proxy::{PassthroughProxyFactory, ProxyFactory};
    use serde_json::{json, Value};
    use std::collections::BTreeMap;
    use wharf_types::{MethodSignature, ServiceInterface};

    struct Echo;
    impl RpcService for Echo {
        fn call(&self, _method: &str, mut args: Vec<Value>) -> WharfResult<Value> {
            Ok(args.pop().unwrap_or(Value::Null))
        }
    }

    fn exported_invoker(protocol: &InjvmProtocol) -> Box<dyn Exporter> {
        let interface =
            ServiceInterface::new("Echo", vec![MethodSignature::new("echo", &["String"])]);
        let url = Url::new("injvm", "127.0.0.1", 0, "Echo", BTreeMap::new());
        let invoker = PassthroughProxyFactory
            .get_invoker(Arc::new(Echo), &interface, &url)
            .unwrap();
        protocol.export(invoker).unwrap()
    }

    #[test]
    fn test_export_lookup_invoke() {
        let protocol = InjvmProtocol::new();
        let _exporter = exported_invoker(&protocol);
        let invoker = protocol.lookup("Echo").expect("exported");
        let reply = invoker
            .invoke(Invocation::new("echo", vec![json!("ping")]))
            .unwrap();
        assert_eq!(reply, json!("ping"));
    }

    #[test]
    fn test_unexport_removes_and_is_idempotent() {
        let protocol = InjvmProtocol::new();
        let exporter = exported_invoker(&protocol);
        assert_eq!(protocol.exported_count(), 1);
        exporter.unexport().unwrap();
        assert_eq!(protocol.exported_count(), 0);
        exporter.unexport().unwrap();
        assert_eq!(protocol.exported_count(), 0);
    }
}
