//! Collaborator contracts for the Wharf publication layer, plus the
//! in-process implementations the export pipeline itself needs.
//!
//! The export pipeline never does network I/O directly — it talks to a
//! [`Protocol`](protocol::Protocol) to expose an invoker, a
//! [`ProxyFactory`](proxy::ProxyFactory) to build that invoker, a
//! [`RegistryClient`](registry::RegistryClient) to advertise addresses, an
//! optional [`Configurator`](configurator::Configurator) to rewrite
//! addresses, and a best-effort
//! [`MetadataService`](metadata::MetadataService). Real wire transports and
//! registry backends live elsewhere; this crate ships the `injvm`
//! in-process transport, the `registry` scheme-swapping transport, and
//! in-memory defaults.

pub mod configurator;
pub mod injvm;
pub mod invoker;
pub mod metadata;
pub mod protocol;
pub mod proxy;
pub mod registry;
pub mod registry_protocol;

pub use configurator::Configurator;
pub use injvm::InjvmProtocol;
pub use invoker::{DelegateInvoker, Invocation, Invoker, MetadataInvoker, RpcService, ServiceRef};
pub use metadata::{MemoryMetadataService, MetadataService};
pub use protocol::{Exporter, LoggingProtocol, Protocol};
pub use proxy::{PassthroughProxyFactory, ProxyFactory};
pub use registry::{MemoryRegistry, RegistryClient};
pub use registry_protocol::RegistryProtocol;
