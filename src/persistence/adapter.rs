//! Durable storage contract for state entries.
//!
//! The store treats persistence as best-effort: adapter failures are logged
//! and never roll back the in-memory write.

use serde_json::Value;

#[cfg(test)]
use mockall::automock;

use crate::EntryMetadata;
use crate::PersistenceError;
use crate::PersistenceKind;

#[cfg_attr(test, automock)]
pub trait PersistenceAdapter: Send + Sync + 'static {
    /// The persistence kind this adapter serves
    fn kind(&self) -> PersistenceKind;

    fn save(
        &self,
        path: &str,
        value: &Value,
        metadata: &EntryMetadata,
    ) -> std::result::Result<(), PersistenceError>;

    fn load(
        &self,
        path: &str,
    ) -> std::result::Result<Option<Value>, PersistenceError>;

    /// Returns whether an entry existed for the path
    fn delete(
        &self,
        path: &str,
    ) -> std::result::Result<bool, PersistenceError>;

    /// Synchronously flushes dirty buffers where the backend supports it
    fn flush(&self) -> std::result::Result<(), PersistenceError>;

    #[cfg(test)]
    fn len(&self) -> usize;
}
