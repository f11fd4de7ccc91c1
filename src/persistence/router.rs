use std::sync::Arc;

use dashmap::DashMap;
use serde_json::Value;

use crate::EntryMetadata;
use crate::PersistenceAdapter;
use crate::PersistenceError;
use crate::PersistenceKind;

/// Dispatches persistence calls to the adapter registered for an entry's
/// declared persistence kind. Entries of kind `Memory` are never routed.
#[derive(Default)]
pub struct PersistenceRouter {
    adapters: DashMap<PersistenceKind, Arc<dyn PersistenceAdapter>>,
}

impl PersistenceRouter {
    pub fn new() -> Self {
        PersistenceRouter {
            adapters: DashMap::new(),
        }
    }

    /// Register an adapter under the kind it reports. Replaces any previous
    /// adapter for that kind.
    pub fn register(
        &self,
        adapter: Arc<dyn PersistenceAdapter>,
    ) {
        self.adapters.insert(adapter.kind(), adapter);
    }

    pub fn save(
        &self,
        kind: PersistenceKind,
        path: &str,
        value: &Value,
        metadata: &EntryMetadata,
    ) -> std::result::Result<(), PersistenceError> {
        if kind == PersistenceKind::Memory {
            return Ok(());
        }
        match self.adapters.get(&kind) {
            Some(adapter) => adapter.save(path, value, metadata),
            None => Err(PersistenceError::AdapterMissing(kind.to_string())),
        }
    }

    pub fn load(
        &self,
        kind: PersistenceKind,
        path: &str,
    ) -> std::result::Result<Option<Value>, PersistenceError> {
        if kind == PersistenceKind::Memory {
            return Ok(None);
        }
        match self.adapters.get(&kind) {
            Some(adapter) => adapter.load(path),
            None => Err(PersistenceError::AdapterMissing(kind.to_string())),
        }
    }

    pub fn delete(
        &self,
        kind: PersistenceKind,
        path: &str,
    ) -> std::result::Result<bool, PersistenceError> {
        if kind == PersistenceKind::Memory {
            return Ok(false);
        }
        match self.adapters.get(&kind) {
            Some(adapter) => adapter.delete(path),
            None => Err(PersistenceError::AdapterMissing(kind.to_string())),
        }
    }
}
