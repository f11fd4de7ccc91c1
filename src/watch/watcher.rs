//! Path-scoped change observers.
//!
//! A watcher on `ui` sees changes to `ui`, `ui.theme` and `ui.theme.color`;
//! a watcher on `ui.theme.color` also sees a change to `ui` (three-way
//! match). Handler failures are caught and logged so one broken observer
//! never hides a change from its siblings.

use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use nanoid::nanoid;
use parking_lot::Mutex;
use serde_json::Value;
use tokio::time::sleep;
use tracing::debug;
use tracing::warn;

use crate::metrics::HANDLER_FAILURES_METRIC;
use crate::path_is_ancestor;
use crate::ChangeRecord;
use crate::EntryMap;
use crate::HandlerError;

/// Snapshot handed to a watcher callback: `(new, old, path)`.
#[derive(Debug, Clone)]
pub struct WatchEvent {
    pub path: String,
    pub old_value: Option<Value>,
    pub new_value: Option<Value>,
}

pub type WatchCallback =
    Arc<dyn Fn(WatchEvent) -> std::result::Result<(), HandlerError> + Send + Sync>;

pub type WatchFilter = Arc<dyn Fn(&ChangeRecord) -> bool + Send + Sync>;

#[derive(Clone)]
pub struct WatchOptions {
    pub filter: Option<WatchFilter>,
    /// Rapid triggers inside the window coalesce to the latest value
    pub debounce_ms: u64,
    /// Fire once with the current value at registration time
    pub immediate: bool,
    /// Three-way path matching; `false` restricts to the exact path
    pub deep: bool,
}

impl Default for WatchOptions {
    fn default() -> Self {
        WatchOptions {
            filter: None,
            debounce_ms: 0,
            immediate: false,
            deep: true,
        }
    }
}

struct Watcher {
    id: String,
    path: String,
    callback: WatchCallback,
    filter: Option<WatchFilter>,
    debounce_ms: u64,
    deep: bool,
    /// Latest coalesced event while a debounce window is open
    pending: Mutex<Option<WatchEvent>>,
    /// Bumped on every trigger; a timer only fires if it still owns the
    /// latest generation when its window closes
    generation: AtomicU64,
}

impl Watcher {
    fn matches(
        &self,
        changed_path: &str,
    ) -> bool {
        if self.path == changed_path {
            return true;
        }
        self.deep
            && (path_is_ancestor(&self.path, changed_path)
                || path_is_ancestor(changed_path, &self.path))
    }

    fn invoke(
        &self,
        event: WatchEvent,
    ) {
        if let Err(e) = (self.callback)(event) {
            HANDLER_FAILURES_METRIC.with_label_values(&["watcher"]).inc();
            warn!("watcher '{}' on '{}' failed: {}", self.id, self.path, e);
        }
    }
}

pub struct WatcherRegistry {
    watchers: DashMap<String, Arc<Watcher>>,
    state: Arc<EntryMap>,
}

impl WatcherRegistry {
    pub fn new(state: Arc<EntryMap>) -> Self {
        WatcherRegistry {
            watchers: DashMap::new(),
            state,
        }
    }

    pub fn watch(
        &self,
        path: &str,
        callback: WatchCallback,
        options: WatchOptions,
    ) -> String {
        let id = nanoid!();
        let watcher = Arc::new(Watcher {
            id: id.clone(),
            path: path.to_string(),
            callback,
            filter: options.filter,
            debounce_ms: options.debounce_ms,
            deep: options.deep,
            pending: Mutex::new(None),
            generation: AtomicU64::new(0),
        });

        if options.immediate {
            if let Some(entry) = self.state.get(path) {
                watcher.invoke(WatchEvent {
                    path: path.to_string(),
                    old_value: None,
                    new_value: Some(entry.value.clone()),
                });
            }
        }

        self.watchers.insert(id.clone(), watcher);
        debug!("registered watcher '{}' on '{}'", id, path);
        id
    }

    pub fn unwatch(
        &self,
        watcher_id: &str,
    ) -> bool {
        self.watchers.remove(watcher_id).is_some()
    }

    pub fn len(&self) -> usize {
        self.watchers.len()
    }

    /// Fan a change record out to every matching watcher. Called after the
    /// mutated path's lock has been released, so callbacks may write back
    /// into the store.
    pub fn notify(
        &self,
        record: &ChangeRecord,
    ) {
        for entry in self.watchers.iter() {
            let watcher = entry.value().clone();
            if !watcher.matches(&record.path) {
                continue;
            }
            if let Some(filter) = &watcher.filter {
                if !filter(record) {
                    continue;
                }
            }

            let event = WatchEvent {
                path: record.path.clone(),
                old_value: record.old_value.clone(),
                new_value: record.new_value.clone(),
            };

            if watcher.debounce_ms == 0 {
                watcher.invoke(event);
            } else {
                self.debounce(watcher, event);
            }
        }
    }

    /// Coalesce triggers within the watcher's window to the latest value.
    /// Each trigger restarts the window; only the timer holding the latest
    /// generation delivers.
    fn debounce(
        &self,
        watcher: Arc<Watcher>,
        event: WatchEvent,
    ) {
        *watcher.pending.lock() = Some(event);
        let generation = watcher.generation.fetch_add(1, Ordering::AcqRel) + 1;
        let window = Duration::from_millis(watcher.debounce_ms);

        tokio::spawn(async move {
            sleep(window).await;
            if watcher.generation.load(Ordering::Acquire) != generation {
                // a newer trigger restarted the window
                return;
            }
            let pending = watcher.pending.lock().take();
            if let Some(event) = pending {
                watcher.invoke(event);
            }
        });
    }
}
