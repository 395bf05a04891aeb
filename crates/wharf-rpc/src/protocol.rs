//! The transport contract: export an invoker, get back a live exporter.

use crate::invoker::Invoker;
use std::sync::Arc;
use tracing::debug;
use wharf_types::{Url, WharfResult};

/// A transport protocol with named, swappable implementations.
///
/// `export` makes an invoker reachable under its address and returns the
/// handle owning the listening resource. Implementations block until the
/// listener is up; the publication layer imposes no timeout of its own.
pub trait Protocol: Send + Sync {
    /// Default port used when nothing else resolves one.
    fn default_port(&self) -> u16;
    /// Expose `invoker` at `invoker.url()`.
    fn export(&self, invoker: Arc<dyn Invoker>) -> WharfResult<Box<dyn Exporter>>;
}

/// A live export. Owns the underlying listening resource.
pub trait Exporter: Send + Sync {
    /// The address this exporter serves.
    fn url(&self) -> &Url;
    /// Release the listening resource. Idempotent per exporter.
    fn unexport(&self) -> WharfResult<()>;
}

/// Wrapper extension that traces every export passing through a protocol.
///
/// Registered as a wrapper on the `Protocol` capability, so it decorates
/// every transport implementation the same way.
pub struct LoggingProtocol {
    inner: Arc<dyn Protocol>,
}

impl LoggingProtocol {
    /// Wrap a protocol.
    pub fn new(inner: Arc<dyn Protocol>) -> Self {
        Self { inner }
    }
}

impl Protocol for LoggingProtocol {
    fn default_port(&self) -> u16 {
        self.inner.default_port()
    }

    fn export(&self, invoker: Arc<dyn Invoker>) -> WharfResult<Box<dyn Exporter>> {
        debug!(url = %invoker.url(), interface = invoker.interface(), "Exporting invoker");
        self.inner.export(invoker)
    }
}
