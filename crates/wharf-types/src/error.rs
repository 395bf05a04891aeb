//! Shared error types for the Wharf workspace.

use thiserror::Error;

/// Top-level error type for the Wharf publication layer.
///
/// Configuration and validation errors are fatal to the export that raised
/// them; teardown errors during unexport are logged by the pipeline instead
/// of surfacing through this type.
#[derive(Error, Debug)]
pub enum WharfError {
    /// An address string could not be parsed into a [`crate::Url`].
    #[error("Invalid address '{input}': {reason}")]
    InvalidAddress {
        /// The string that failed to parse.
        input: String,
        /// Why it failed.
        reason: String,
    },

    /// Missing or malformed configuration (absent interface, invalid
    /// host/port override, mismatched stub class, ...).
    #[error("Configuration error: {0}")]
    InvalidConfig(String),

    /// An argument override declared both a type and an index, and the
    /// interface method's parameter at that index is of a different type.
    #[error("Argument config error on method '{method}': index {index} declares type '{declared}' but the interface method takes '{actual}'")]
    ArgumentConfigMismatch {
        /// The configured method name.
        method: String,
        /// The declared parameter index.
        index: usize,
        /// The type declared in configuration.
        declared: String,
        /// The type found on the interface method.
        actual: String,
    },

    /// An argument override declared neither a type nor an index.
    #[error("Argument config on method '{method}' must set an index or a type attribute")]
    ArgumentConfigIncomplete {
        /// The configured method name.
        method: String,
    },

    /// A named extension was requested but never registered.
    #[error("No extension '{name}' registered for capability '{capability}'")]
    ExtensionNotFound {
        /// The capability interface.
        capability: String,
        /// The requested extension name.
        name: String,
    },

    /// An extension name was registered twice for the same capability.
    #[error("Extension '{name}' is already registered for capability '{capability}'")]
    DuplicateExtension {
        /// The capability interface.
        capability: String,
        /// The duplicated extension name.
        name: String,
    },

    /// Adaptive dispatch resolved a name with no registered implementation.
    #[error("Adaptive resolution failed for capability '{capability}': '{name}' (from {origin}) is not registered")]
    AdaptiveResolution {
        /// The capability interface.
        capability: String,
        /// The resolved extension name.
        name: String,
        /// Where the name came from (a parameter key, or "default").
        origin: String,
    },

    /// The service is in the wrong lifecycle state for the operation.
    #[error("Service '{service}' is in state '{state}', cannot {operation}")]
    InvalidState {
        /// The service key.
        service: String,
        /// The current lifecycle state.
        state: String,
        /// The attempted operation.
        operation: String,
    },

    /// A transport failed to export or unexport an invoker.
    #[error("Export failed: {0}")]
    Export(String),

    /// A registry client failed to register or unregister an address.
    #[error("Registry error: {0}")]
    Registry(String),

    /// A service invocation failed.
    #[error("Invocation failed: {0}")]
    Invocation(String),

    /// An I/O error occurred (port probing, host discovery).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Alias for Result with WharfError.
pub type WharfResult<T> = Result<T, WharfError>;
