use std::path::Path;
use std::sync::Arc;

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;
use tracing::error;

use crate::constants::STATE_ENTRIES_TREE;
use crate::EntryMetadata;
use crate::PersistenceAdapter;
use crate::PersistenceError;
use crate::PersistenceKind;

/// On-disk record format. Version and update time travel with the value so
/// a reload can reconstruct entry metadata.
#[derive(Debug, Serialize, Deserialize)]
struct PersistedRecord {
    value: Value,
    version: u64,
    updated_at: u64,
}

/// File-backed adapter on top of an embedded sled tree, keyed by path.
#[derive(Clone)]
pub struct SledAdapter {
    db: Arc<sled::Db>,
    tree: Arc<sled::Tree>,
}

impl std::fmt::Debug for SledAdapter {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("SledAdapter").field("tree_len", &self.tree.len()).finish()
    }
}

impl SledAdapter {
    pub fn open(dir: impl AsRef<Path>) -> std::result::Result<Self, PersistenceError> {
        let db = sled::open(dir)?;
        Self::new(Arc::new(db))
    }

    pub fn new(db: Arc<sled::Db>) -> std::result::Result<Self, PersistenceError> {
        let tree = db.open_tree(STATE_ENTRIES_TREE)?;
        Ok(SledAdapter {
            db,
            tree: Arc::new(tree),
        })
    }
}

impl PersistenceAdapter for SledAdapter {
    fn kind(&self) -> PersistenceKind {
        PersistenceKind::File
    }

    fn save(
        &self,
        path: &str,
        value: &Value,
        metadata: &EntryMetadata,
    ) -> std::result::Result<(), PersistenceError> {
        let record = PersistedRecord {
            value: value.clone(),
            version: metadata.version,
            updated_at: metadata.updated_at,
        };
        let bytes = serde_json::to_vec(&record)?;
        self.tree.insert(path.as_bytes(), bytes)?;
        Ok(())
    }

    fn load(
        &self,
        path: &str,
    ) -> std::result::Result<Option<Value>, PersistenceError> {
        match self.tree.get(path.as_bytes())? {
            Some(ivec) => match serde_json::from_slice::<PersistedRecord>(&ivec) {
                Ok(record) => Ok(Some(record.value)),
                Err(e) => {
                    error!("corrupt persisted record for path '{}': {}", path, e);
                    Err(PersistenceError::Serialization(e))
                }
            },
            None => Ok(None),
        }
    }

    fn delete(
        &self,
        path: &str,
    ) -> std::result::Result<bool, PersistenceError> {
        Ok(self.tree.remove(path.as_bytes())?.is_some())
    }

    fn flush(&self) -> std::result::Result<(), PersistenceError> {
        self.tree.flush()?;
        Ok(())
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.tree.len()
    }
}
