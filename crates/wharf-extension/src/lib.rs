//! Extension hub and adaptive dispatch.
//!
//! A *capability* is an abstract contract (a trait object type) with one or
//! more named, independently registered implementations. The
//! [`ExtensionHub`] owns one [`ExtensionLoader`] per capability; loaders
//! instantiate implementations lazily, cache them as process-scoped
//! singletons, and fold registered wrapper decorators around every plain
//! instance in a deterministic order.
//!
//! [`AdaptiveExtension`] adds per-call resolution: a capability declares an
//! ordered list of candidate [`Url`](wharf_types::Url) parameter keys and a
//! default name, and the right implementation is picked from whatever
//! address a call carries. This is what lets one export pipeline drive
//! arbitrarily many transports and registries without conditional
//! branching.

pub mod adaptive;
pub mod hub;
pub mod loader;

pub use adaptive::AdaptiveExtension;
pub use hub::ExtensionHub;
pub use loader::{AdaptiveSpec, ExtensionLoader};
