//! Address configurators — the externally injected override hook.

use wharf_types::{Url, WharfResult};

/// Rewrites a built export address before it is exported.
///
/// Selected by the address's scheme when an implementation under that name
/// exists; the pipeline probes with `has_extension` and skips the hook
/// otherwise.
pub trait Configurator: Send + Sync {
    /// Return the (possibly modified) address.
    fn configure(&self, url: Url) -> WharfResult<Url>;
}
