//! Lazy, memoized evaluation of computed paths.
//!
//! Each computed entry carries a validity epoch, bumped by every write to a
//! (transitive) dependency. A cached value is served only while the epoch
//! it was computed at is still current, so an invalidation that lands
//! during an in-flight compute wins over the stale result. Dependency
//! values are read lock-free from the shared entry map so a compute
//! function can never contend on a path lock.

use std::collections::HashMap;
use std::collections::HashSet;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::RwLock;
use serde_json::Value;
use tracing::debug;
use tracing::warn;

use crate::ComputeError;
use crate::DependencyGraph;
use crate::EntryMap;
use crate::HandlerError;

/// Current values of a computed entry's declared dependencies, keyed by
/// dependency path. Absent paths resolve to `Value::Null`.
pub type DependencyValues = HashMap<String, Value>;

/// User-supplied derivation. Must be pure with respect to the store: reads
/// and writes go through the public store operations, never through
/// captured internals.
pub type ComputeFn =
    Arc<dyn Fn(&DependencyValues) -> std::result::Result<Value, HandlerError> + Send + Sync>;

struct ComputedEntry {
    dependencies: Vec<String>,
    compute: ComputeFn,
    cache: bool,
    /// Cached value paired with the epoch it was computed at
    cached: RwLock<Option<(Value, u64)>>,
    /// Bumped on every dependency write; a cached value is valid only
    /// while its stored epoch matches
    epoch: AtomicU64,
}

pub struct ComputedEngine {
    entries: DashMap<String, Arc<ComputedEntry>>,
    graph: DependencyGraph,
    state: Arc<EntryMap>,
}

impl ComputedEngine {
    pub fn new(state: Arc<EntryMap>) -> Self {
        ComputedEngine {
            entries: DashMap::new(),
            graph: DependencyGraph::new(),
            state,
        }
    }

    /// Register a computed path. Rejects duplicate registrations and any
    /// dependency cycle (direct, transitive or self) up front, so reads can
    /// recurse without a cycle guard.
    pub fn register(
        &self,
        path: &str,
        dependencies: Vec<String>,
        compute: ComputeFn,
        cache: bool,
    ) -> std::result::Result<(), ComputeError> {
        self.graph.register(path, &dependencies)?;
        self.entries.insert(
            path.to_string(),
            Arc::new(ComputedEntry {
                dependencies,
                compute,
                cache,
                cached: RwLock::new(None),
                epoch: AtomicU64::new(0),
            }),
        );
        debug!("registered computed path '{}'", path);
        Ok(())
    }

    pub fn unregister(
        &self,
        path: &str,
    ) -> bool {
        let removed = self.entries.remove(path).is_some();
        self.graph.unregister(path);
        removed
    }

    pub fn is_computed(
        &self,
        path: &str,
    ) -> bool {
        self.entries.contains_key(path)
    }

    pub fn dependencies_of(
        &self,
        path: &str,
    ) -> Option<Vec<String>> {
        self.graph.dependencies_of(path)
    }

    /// Bump the validity epoch of every computed path depending on `path`
    /// and return the dirtied set so callers can publish invalidations.
    pub fn mark_dirty(
        &self,
        path: &str,
    ) -> HashSet<String> {
        let dirtied = self.graph.transitive_dependents(path);
        for dependent in &dirtied {
            if let Some(entry) = self.entries.get(dependent) {
                entry.epoch.fetch_add(1, Ordering::AcqRel);
            }
        }
        if !dirtied.is_empty() {
            debug!("write to '{}' dirtied {} computed path(s)", path, dirtied.len());
        }
        dirtied
    }

    /// Lazy read: a current cached value is returned as-is, otherwise the
    /// compute function runs against the current dependency values. The
    /// result is cached at the epoch observed *before* the dependency
    /// reads, so a concurrent invalidation leaves the entry stale and the
    /// next read recomputes. On failure the cache is untouched and the
    /// next read retries.
    pub fn compute(
        &self,
        path: &str,
    ) -> std::result::Result<Value, ComputeError> {
        let entry = self
            .entries
            .get(path)
            .map(|e| e.value().clone())
            .ok_or_else(|| ComputeError::NotRegistered(path.to_string()))?;

        let snapshot = entry.epoch.load(Ordering::Acquire);
        if entry.cache {
            if let Some((value, at)) = &*entry.cached.read() {
                if *at == snapshot {
                    return Ok(value.clone());
                }
            }
        }

        let mut values = DependencyValues::with_capacity(entry.dependencies.len());
        for dep in &entry.dependencies {
            values.insert(dep.clone(), self.resolve(dep)?);
        }

        let value = (entry.compute)(&values).map_err(|e| {
            warn!("compute function for '{}' failed: {}", path, e);
            ComputeError::Failed {
                path: path.to_string(),
                reason: e.to_string(),
            }
        })?;

        if entry.cache {
            let mut cached = entry.cached.write();
            // never overwrite a result computed at a newer epoch
            if cached.as_ref().map_or(true, |(_, at)| *at <= snapshot) {
                *cached = Some((value.clone(), snapshot));
            }
        }
        Ok(value)
    }

    /// A dependency is either another computed path (resolved recursively;
    /// cycles were rejected at registration) or a plain entry read straight
    /// from the shared map. Absent paths resolve to null.
    fn resolve(
        &self,
        path: &str,
    ) -> std::result::Result<Value, ComputeError> {
        if self.is_computed(path) {
            return self.compute(path);
        }
        Ok(self
            .state
            .get(path)
            .map(|entry| entry.value.clone())
            .unwrap_or(Value::Null))
    }
}
