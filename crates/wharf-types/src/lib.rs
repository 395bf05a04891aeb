//! Core types for the Wharf RPC publication layer.
//!
//! This crate defines the shared data structures used across the extension
//! hub, the collaborator contracts, and the export pipeline: the `Url`
//! address value, the error taxonomy, service identity, and declarative
//! configuration. It contains no business logic.

pub mod config;
pub mod error;
pub mod keys;
pub mod service;
pub mod url;

pub use error::{WharfError, WharfResult};
pub use service::{MethodSignature, ServiceDescriptor, ServiceInterface};
pub use url::Url;
