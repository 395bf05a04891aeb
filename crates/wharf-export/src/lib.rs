//! The service export pipeline.
//!
//! [`ServiceExport`] turns a validated service description plus protocol and
//! registry configuration into a set of live, independently unexportable
//! exporters: it flattens the configuration overlays into one parameter map,
//! resolves bind and advertised host/port through deterministic fallback
//! chains, builds the canonical export address, and drives the adaptive
//! extension dispatch to obtain a transport and a proxy factory per
//! (protocol × registry) combination. [`ExportContext`] owns everything the
//! pipeline shares: the extension hub, the service repository, the delayed
//! export scheduler, the random-port cache, and the lifecycle observers.

pub mod context;
pub mod events;
pub mod net;
pub mod scheduler;
pub mod service;

pub use context::ExportContext;
pub use events::{ExportEvent, ExportObserver};
pub use scheduler::DelayScheduler;
pub use service::{LifecycleState, ServiceExport};
