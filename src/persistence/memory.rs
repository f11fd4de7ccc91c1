use dashmap::DashMap;
use serde_json::Value;

use crate::EntryMetadata;
use crate::PersistenceAdapter;
use crate::PersistenceError;
use crate::PersistenceKind;

/// Process-local adapter. Used for session-scoped state and as the default
/// adapter in tests.
#[derive(Debug, Default)]
pub struct MemoryAdapter {
    kind: PersistenceKind,
    entries: DashMap<String, Value>,
}

impl MemoryAdapter {
    pub fn new(kind: PersistenceKind) -> Self {
        MemoryAdapter {
            kind,
            entries: DashMap::new(),
        }
    }
}

impl PersistenceAdapter for MemoryAdapter {
    fn kind(&self) -> PersistenceKind {
        self.kind
    }

    fn save(
        &self,
        path: &str,
        value: &Value,
        _metadata: &EntryMetadata,
    ) -> std::result::Result<(), PersistenceError> {
        self.entries.insert(path.to_string(), value.clone());
        Ok(())
    }

    fn load(
        &self,
        path: &str,
    ) -> std::result::Result<Option<Value>, PersistenceError> {
        Ok(self.entries.get(path).map(|v| v.value().clone()))
    }

    fn delete(
        &self,
        path: &str,
    ) -> std::result::Result<bool, PersistenceError> {
        Ok(self.entries.remove(path).is_some())
    }

    fn flush(&self) -> std::result::Result<(), PersistenceError> {
        Ok(())
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.entries.len()
    }
}
