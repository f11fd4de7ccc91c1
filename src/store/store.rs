//! Hierarchical path -> value store and mutation fan-out hub.
//!
//! Every mutation runs in two phases. Under the path's lock: validate,
//! write the entry, append a change record, mark dependent computed paths
//! dirty. After the lock is released: notify watchers, apply bindings,
//! persist, publish events. Callbacks can therefore write back to the same
//! path without deadlocking.

use std::sync::Arc;

use autometrics::autometrics;
use dashmap::DashMap;
use futures::future::BoxFuture;
use futures::FutureExt;
use nanoid::nanoid;
use serde_json::Map;
use serde_json::Value;
use tracing::debug;
use tracing::error;
use tracing::warn;

use crate::metrics::STATE_WRITES_METRIC;
use crate::utils::time::now_ms;
use crate::AccessLevel;
use crate::BindOptions;
use crate::BindingEngine;
use crate::ChangeHistory;
use crate::ChangeKind;
use crate::ChangeRecord;
use crate::ComputeFn;
use crate::ComputedEngine;
use crate::EntryMap;
use crate::EntryMetadata;
use crate::EntryOptions;
use crate::Event;
use crate::EventBus;
use crate::EventType;
use crate::PathLocks;
use crate::PersistenceKind;
use crate::PersistenceRouter;
use crate::PriorityEventProcessor;
use crate::Result;
use crate::StateEntry;
use crate::StoreConfig;
use crate::ValidationError;
use crate::WatchCallback;
use crate::WatchOptions;
use crate::WatcherRegistry;
use crate::API_SLO;

/// Per-path value predicate. Registered under a name so a rejection can say
/// which rule vetoed the write.
pub type ValidatorFn = Arc<dyn Fn(&Value) -> bool + Send + Sync>;

struct NamedValidator {
    name: String,
    validate: ValidatorFn,
}

pub struct StateStore {
    entries: Arc<EntryMap>,
    locks: PathLocks,
    history: ChangeHistory,
    validators: DashMap<String, Vec<NamedValidator>>,
    computed: Arc<ComputedEngine>,
    watchers: Arc<WatcherRegistry>,
    bindings: Arc<BindingEngine>,
    bus: Arc<EventBus>,
    processor: Arc<PriorityEventProcessor>,
    persistence: Arc<PersistenceRouter>,
}

impl StateStore {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        config: &StoreConfig,
        entries: Arc<EntryMap>,
        computed: Arc<ComputedEngine>,
        watchers: Arc<WatcherRegistry>,
        bindings: Arc<BindingEngine>,
        bus: Arc<EventBus>,
        processor: Arc<PriorityEventProcessor>,
        persistence: Arc<PersistenceRouter>,
    ) -> Self {
        StateStore {
            entries,
            locks: PathLocks::new(),
            history: ChangeHistory::new(config.change_history_capacity),
            validators: DashMap::new(),
            computed,
            watchers,
            bindings,
            bus,
            processor,
            persistence,
        }
    }

    // -
    // Reads

    /// Read a path. Computed paths are resolved through the engine; a
    /// failed compute function surfaces here and stays dirty for retry.
    #[autometrics(objective = API_SLO)]
    pub async fn get(
        &self,
        path: &str,
    ) -> Result<Option<Value>> {
        if self.computed.is_computed(path) {
            return Ok(Some(self.computed.compute(path)?));
        }

        let guard = self.locks.acquire(path).await;
        let value = self.entries.get(path).map(|entry| entry.value.clone());
        drop(guard);
        if value.is_none() {
            self.locks.release_slot(path);
        }
        Ok(value)
    }

    pub async fn get_or(
        &self,
        path: &str,
        default: Value,
    ) -> Result<Value> {
        Ok(self.get(path).await?.unwrap_or(default))
    }

    pub fn entry_metadata(
        &self,
        path: &str,
    ) -> Option<EntryMetadata> {
        self.entries.get(path).map(|entry| entry.metadata.clone())
    }

    /// Read a path's durable copy back from the adapter registered for
    /// `kind`, bypassing the in-memory map. Embedders use this to
    /// rehydrate state on startup.
    pub fn load_persisted(
        &self,
        path: &str,
        kind: PersistenceKind,
    ) -> Result<Option<Value>> {
        Ok(self.persistence.load(kind, path)?)
    }

    /// Most recent change records, newest first.
    pub fn history(
        &self,
        path: Option<&str>,
        limit: usize,
    ) -> Vec<ChangeRecord> {
        self.history.query(path, limit)
    }

    // -
    // Writes

    /// Replace the value at `path`, creating the entry on first write.
    #[autometrics(objective = API_SLO)]
    pub async fn set(
        &self,
        path: &str,
        value: Value,
        source: &str,
    ) -> Result<()> {
        self.write(path.to_string(), value, source.to_string(), None, false).await
    }

    /// `set` with entry creation overrides (access level, persistence kind,
    /// tags). The overrides only apply when the entry does not exist yet.
    pub async fn set_with_options(
        &self,
        path: &str,
        value: Value,
        source: &str,
        options: EntryOptions,
    ) -> Result<()> {
        self.write(path.to_string(), value, source.to_string(), Some(options), false)
            .await
    }

    /// Deep-merge `partial` into the current value when both are JSON
    /// objects; replace otherwise.
    #[autometrics(objective = API_SLO)]
    pub async fn update(
        &self,
        path: &str,
        partial: Value,
        source: &str,
    ) -> Result<()> {
        self.write(path.to_string(), partial, source.to_string(), None, true).await
    }

    /// Remove the entry. `Ok(false)` when the path does not exist.
    #[autometrics(objective = API_SLO)]
    pub async fn delete(
        &self,
        path: &str,
        source: &str,
    ) -> Result<bool> {
        self.remove(path, source, ChangeKind::Delete).await
    }

    /// Remove every entry, recording `Reset` changes. Watchers and events
    /// fire per removed path.
    pub async fn reset(
        &self,
        source: &str,
    ) -> Result<usize> {
        let paths: Vec<String> = self.entries.iter().map(|entry| entry.key().clone()).collect();
        let mut removed = 0;
        for path in paths {
            if self.remove(&path, source, ChangeKind::Reset).await? {
                removed += 1;
            }
        }
        Ok(removed)
    }

    // -
    // Observer registration facade

    pub fn watch(
        &self,
        path: &str,
        callback: WatchCallback,
        options: WatchOptions,
    ) -> String {
        self.watchers.watch(path, callback, options)
    }

    pub fn unwatch(
        &self,
        watcher_id: &str,
    ) -> bool {
        self.watchers.unwatch(watcher_id)
    }

    /// Register a binding and, if it is enabled and the source currently
    /// has a value, apply it to the target once.
    pub async fn bind(
        &self,
        source_path: &str,
        target_path: &str,
        options: BindOptions,
    ) -> String {
        let id = self.bindings.bind(source_path, target_path, options);

        let source_value = self.entries.get(source_path).map(|entry| entry.value.clone());
        if let Some(value) = source_value {
            if let Some(application) = self.bindings.initial_application(&id, &value) {
                if let Err(e) = self
                    .write(
                        application.target_path.clone(),
                        application.value.clone(),
                        application.marker.clone(),
                        None,
                        false,
                    )
                    .await
                {
                    warn!("initial application of binding '{}' failed: {}", id, e);
                }
            }
        }
        id
    }

    pub fn unbind(
        &self,
        binding_id: &str,
    ) -> bool {
        self.bindings.unbind(binding_id)
    }

    /// Disabled bindings stay registered but propagate nothing.
    pub fn set_binding_enabled(
        &self,
        binding_id: &str,
        enabled: bool,
    ) -> bool {
        self.bindings.set_enabled(binding_id, enabled)
    }

    pub fn register_computed(
        &self,
        path: &str,
        dependencies: Vec<String>,
        compute: ComputeFn,
        cache: bool,
    ) -> Result<()> {
        Ok(self.computed.register(path, dependencies, compute, cache)?)
    }

    pub fn unregister_computed(
        &self,
        path: &str,
    ) -> bool {
        self.computed.unregister(path)
    }

    /// Register a named validator for a path. Applied to every subsequent
    /// write, in registration order; the first rejection wins.
    pub fn add_validator(
        &self,
        path: &str,
        name: &str,
        validate: ValidatorFn,
    ) {
        self.validators.entry(path.to_string()).or_default().push(NamedValidator {
            name: name.to_string(),
            validate,
        });
        if let Some(mut entry) = self.entries.get_mut(path) {
            entry.metadata.validators.push(name.to_string());
        }
    }

    // -
    // Internals

    #[cfg(test)]
    pub(crate) fn lock_slots(&self) -> usize {
        self.locks.len()
    }

    /// All writes funnel through here. Boxed so binding applications can
    /// recurse (`write` -> fan-out -> binding -> `write`).
    fn write(
        &self,
        path: String,
        value: Value,
        source: String,
        options: Option<EntryOptions>,
        merge: bool,
    ) -> BoxFuture<'_, Result<()>> {
        async move {
            if path.is_empty() {
                return Err(ValidationError::InvalidPath(path).into());
            }
            if self.computed.is_computed(&path) {
                return Err(ValidationError::ComputedPath(path).into());
            }

            let guard = self.locks.acquire(&path).await;

            let existing = self.entries.get(&path).map(|entry| entry.value().clone());
            if let Some(entry) = &existing {
                if entry.metadata.access == AccessLevel::ReadOnly {
                    return Err(ValidationError::ReadOnlyPath(path).into());
                }
            }

            let old_value = existing.as_ref().map(|entry| entry.value.clone());
            let (new_value, kind) = match (&old_value, merge) {
                (None, _) => (value, ChangeKind::Create),
                (Some(old), true) => match (old.as_object(), value.as_object()) {
                    (Some(old_map), Some(partial)) => {
                        (Value::Object(deep_merge(old_map, partial)), ChangeKind::Merge)
                    }
                    _ => (value, ChangeKind::Replace),
                },
                (Some(_), false) => (value, ChangeKind::Update),
            };

            if let Some(validators) = self.validators.get(&path) {
                for validator in validators.iter() {
                    if !(validator.validate)(&new_value) {
                        debug!("validator '{}' rejected write to '{}'", validator.name, path);
                        let name = validator.name.clone();
                        drop(guard);
                        if existing.is_none() {
                            // rejected create: the path stays dead, drop its slot
                            self.locks.release_slot(&path);
                        }
                        return Err(ValidationError::Rejected {
                            path,
                            validator: name,
                        }
                        .into());
                    }
                }
            }

            let metadata = match existing {
                Some(entry) => {
                    let mut metadata = entry.metadata;
                    metadata.updated_at = now_ms();
                    metadata.version += 1;
                    metadata
                }
                None => {
                    let options = options.unwrap_or_default();
                    let mut metadata = EntryMetadata::new(&source, options.persistence);
                    metadata.access = options.access;
                    metadata.tags = options.tags;
                    if let Some(validators) = self.validators.get(&path) {
                        metadata.validators =
                            validators.iter().map(|v| v.name.clone()).collect();
                    }
                    metadata
                }
            };

            self.entries.insert(
                path.clone(),
                StateEntry {
                    path: path.clone(),
                    value: new_value.clone(),
                    metadata: metadata.clone(),
                },
            );

            let record = ChangeRecord {
                id: nanoid!(),
                path: path.clone(),
                kind,
                old_value,
                new_value: Some(new_value),
                timestamp: now_ms(),
                source,
                version: metadata.version,
            };
            self.history.append(record.clone());
            STATE_WRITES_METRIC.with_label_values(&[kind.as_str()]).inc();

            let dirtied: Vec<String> =
                self.computed.mark_dirty(&path).into_iter().collect();

            drop(guard);

            self.fan_out(record, dirtied, metadata).await;
            Ok(())
        }
        .boxed()
    }

    async fn remove(
        &self,
        path: &str,
        source: &str,
        kind: ChangeKind,
    ) -> Result<bool> {
        if self.computed.is_computed(path) {
            return Err(ValidationError::ComputedPath(path.to_string()).into());
        }

        let guard = self.locks.acquire(path).await;

        let Some((_, entry)) = self.entries.remove(path) else {
            drop(guard);
            self.locks.release_slot(path);
            return Ok(false);
        };
        if entry.metadata.access == AccessLevel::ReadOnly {
            // undo: read-only entries cannot be removed
            self.entries.insert(path.to_string(), entry);
            return Err(ValidationError::ReadOnlyPath(path.to_string()).into());
        }

        let record = ChangeRecord {
            id: nanoid!(),
            path: path.to_string(),
            kind,
            old_value: Some(entry.value.clone()),
            new_value: None,
            timestamp: now_ms(),
            source: source.to_string(),
            version: 0,
        };
        self.history.append(record.clone());
        STATE_WRITES_METRIC.with_label_values(&[kind.as_str()]).inc();

        let dirtied: Vec<String> = self.computed.mark_dirty(path).into_iter().collect();

        drop(guard);
        self.locks.release_slot(path);

        self.watchers.notify(&record);

        if let Err(e) = self.persistence.delete(entry.metadata.persistence, path) {
            error!("persistence delete for '{}' failed (in-memory delete stands): {}", path, e);
        }

        self.publish_invalidations(path, &dirtied).await;
        self.publish(Event::new(
            EventType::StateDeleted,
            serde_json::json!({
                "path": path,
                "old_value": record.old_value,
                "source": record.source,
                "change_id": record.id,
            }),
            &record.source,
        ))
        .await;

        Ok(true)
    }

    /// Post-lock side effects of a write: watchers, bindings, persistence,
    /// events. Failures here are logged, never returned to the mutator.
    async fn fan_out(
        &self,
        record: ChangeRecord,
        dirtied: Vec<String>,
        metadata: EntryMetadata,
    ) {
        self.watchers.notify(&record);

        for application in self.bindings.plan(&record) {
            let result = self
                .write(
                    application.target_path.clone(),
                    application.value.clone(),
                    application.marker.clone(),
                    None,
                    false,
                )
                .await;
            match result {
                Ok(()) => {
                    self.publish(Event::new(
                        EventType::BindingApplied,
                        serde_json::json!({
                            "binding_id": application.binding_id,
                            "path": record.path,
                            "target_path": application.target_path,
                        }),
                        &application.marker,
                    ))
                    .await;
                }
                Err(e) => {
                    warn!(
                        "binding '{}' write to '{}' failed: {}",
                        application.binding_id, application.target_path, e
                    );
                }
            }
        }

        if let Some(value) = &record.new_value {
            if let Err(e) =
                self.persistence.save(metadata.persistence, &record.path, value, &metadata)
            {
                error!(
                    "persistence save for '{}' failed (in-memory write stands): {}",
                    record.path, e
                );
            }
        }

        self.publish_invalidations(&record.path, &dirtied).await;
        self.publish(Event::new(
            EventType::StateChanged,
            serde_json::json!({
                "path": record.path,
                "old_value": record.old_value,
                "new_value": record.new_value,
                "source": record.source,
                "change_id": record.id,
            }),
            &record.source,
        ))
        .await;
    }

    async fn publish_invalidations(
        &self,
        path: &str,
        dirtied: &[String],
    ) {
        if dirtied.is_empty() {
            return;
        }
        self.publish(Event::new(
            EventType::ComputedInvalidated,
            serde_json::json!({
                "path": path,
                "invalidated": dirtied,
            }),
            path,
        ))
        .await;
    }

    /// Route through the priority queues while the processor runs;
    /// otherwise fan out synchronously on the bus.
    async fn publish(
        &self,
        event: Event,
    ) {
        if self.processor.is_running() {
            if let Err(e) = self.processor.enqueue(event).await {
                warn!("event enqueue failed: {}", e);
            }
        } else {
            self.bus.publish(&event);
        }
    }
}

/// Recursive object merge: keys present in `partial` override, object
/// values merge one level deeper, everything else replaces.
fn deep_merge(
    old: &Map<String, Value>,
    partial: &Map<String, Value>,
) -> Map<String, Value> {
    let mut merged = old.clone();
    for (key, incoming) in partial {
        match (merged.get(key).and_then(|v| v.as_object()), incoming.as_object()) {
            (Some(existing), Some(incoming_map)) => {
                merged.insert(key.clone(), Value::Object(deep_merge(existing, incoming_map)));
            }
            _ => {
                merged.insert(key.clone(), incoming.clone());
            }
        }
    }
    merged
}
