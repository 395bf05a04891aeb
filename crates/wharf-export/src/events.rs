//! Export lifecycle events.

use wharf_types::Url;

/// A lifecycle transition of one service export.
#[derive(Debug, Clone)]
pub enum ExportEvent {
    /// The service finished exporting.
    Exported {
        /// The service key.
        service_key: String,
        /// Every address the service was exported under.
        urls: Vec<Url>,
    },
    /// The service was unexported.
    Unexported {
        /// The service key.
        service_key: String,
    },
}

/// Receives lifecycle events, synchronously, after each state transition.
///
/// Observers are registered on the [`ExportContext`](crate::ExportContext);
/// notification is fire-and-forget — an observer cannot veto or fail a
/// transition.
pub trait ExportObserver: Send + Sync {
    /// Handle one event.
    fn on_event(&self, event: &ExportEvent);
}
