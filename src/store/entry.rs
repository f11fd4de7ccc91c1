//! Core data model of the state store: entries, metadata and the immutable
//! change log records appended on every mutation.

use dashmap::DashMap;
use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;

use crate::constants::PATH_SEPARATOR;
use crate::utils::time::now_ms;

/// Shared path -> entry map. The store owns all writes; the computed engine
/// and watcher registry hold read-only `Arc` references to it.
pub type EntryMap = DashMap<String, StateEntry>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AccessLevel {
    #[default]
    Public,
    Protected,
    Private,
    /// Rejects all direct writes. Computed paths are implicitly read-only.
    ReadOnly,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PersistenceKind {
    /// Never routed to a persistence adapter
    #[default]
    Memory,
    /// Durable across process restarts
    File,
    /// Survives within one session of the embedding application
    Session,
}

impl std::fmt::Display for PersistenceKind {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        match self {
            PersistenceKind::Memory => write!(f, "memory"),
            PersistenceKind::File => write!(f, "file"),
            PersistenceKind::Session => write!(f, "session"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    Create,
    Update,
    Delete,
    Replace,
    Merge,
    Reset,
}

impl ChangeKind {
    pub(crate) fn as_str(&self) -> &'static str {
        match self {
            ChangeKind::Create => "create",
            ChangeKind::Update => "update",
            ChangeKind::Delete => "delete",
            ChangeKind::Replace => "replace",
            ChangeKind::Merge => "merge",
            ChangeKind::Reset => "reset",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntryMetadata {
    /// Milliseconds since epoch
    pub created_at: u64,
    pub updated_at: u64,
    /// Monotonic per-entry write counter, starting at 1
    pub version: u64,
    pub access: AccessLevel,
    pub persistence: PersistenceKind,
    pub tags: Vec<String>,
    /// Names of validators registered against this path at creation time
    pub validators: Vec<String>,
}

impl EntryMetadata {
    pub fn new(
        _source: &str,
        persistence: PersistenceKind,
    ) -> Self {
        let now = now_ms();
        EntryMetadata {
            created_at: now,
            updated_at: now,
            version: 1,
            access: AccessLevel::default(),
            persistence,
            tags: Vec::new(),
            validators: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateEntry {
    pub path: String,
    pub value: Value,
    pub metadata: EntryMetadata,
}

/// Immutable log record describing one mutation. Appended to the bounded
/// change history; never mutated afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChangeRecord {
    pub id: String,
    pub path: String,
    pub kind: ChangeKind,
    pub old_value: Option<Value>,
    pub new_value: Option<Value>,
    pub timestamp: u64,
    pub source: String,
    /// Entry version after the mutation (0 for deletes)
    pub version: u64,
}

/// Caller-supplied overrides applied when an entry is first created.
#[derive(Debug, Clone, Default)]
pub struct EntryOptions {
    pub access: AccessLevel,
    pub persistence: PersistenceKind,
    pub tags: Vec<String>,
}

/// True when `ancestor` is a strict dot-path ancestor of `descendant`,
/// e.g. `ui` is an ancestor of `ui.theme.color` but not of `uikit`.
pub(crate) fn path_is_ancestor(
    ancestor: &str,
    descendant: &str,
) -> bool {
    descendant.len() > ancestor.len()
        && descendant.starts_with(ancestor)
        && descendant.as_bytes()[ancestor.len()] == PATH_SEPARATOR as u8
}
