//! Best-effort service-definition publication.

use std::collections::BTreeMap;
use std::sync::Mutex;
use tracing::debug;
use wharf_types::{Url, WharfResult};

/// Stores the definition of an exported service, keyed by service key.
///
/// Selected by the `metadata-type` parameter of the export address; a
/// missing implementation for the configured type is tolerated by the
/// pipeline, malformed input is not.
pub trait MetadataService: Send + Sync {
    /// Record the final per-protocol export address.
    fn publish_service_definition(&self, url: &Url) -> WharfResult<()>;
    /// The recorded address for a service key, if any.
    fn service_definition(&self, service_key: &str) -> Option<Url>;
}

/// In-memory store, the default (`local`) metadata type.
#[derive(Default)]
pub struct MemoryMetadataService {
    definitions: Mutex<BTreeMap<String, Url>>,
}

impl MemoryMetadataService {
    /// An empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

impl MetadataService for MemoryMetadataService {
    fn publish_service_definition(&self, url: &Url) -> WharfResult<()> {
        let key = url.service_key();
        debug!(service = %key, url = %url, "Published service definition");
        self.definitions
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(key, url.clone());
        Ok(())
    }

    fn service_definition(&self, service_key: &str) -> Option<Url> {
        self.definitions
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(service_key)
            .cloned()
    }
}
