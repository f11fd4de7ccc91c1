//! One- and two-directional path-to-path synchronization.
//!
//! The engine never writes to the store itself: it plans applications from
//! a change record and the store executes them, stamping each write with
//! the binding's marker source. A change carrying a binding's own marker is
//! skipped by that binding, which breaks bidirectional write cycles.

use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use dashmap::DashMap;
use nanoid::nanoid;
use serde_json::Value;
use tracing::debug;
use tracing::warn;

use crate::constants::BINDING_SOURCE_PREFIX;
use crate::metrics::HANDLER_FAILURES_METRIC;
use crate::ChangeRecord;
use crate::HandlerError;

pub type BindingTransform =
    Arc<dyn Fn(&Value) -> std::result::Result<Value, HandlerError> + Send + Sync>;

#[derive(Clone)]
pub struct BindOptions {
    /// Applied on the source -> target direction only
    pub transform: Option<BindingTransform>,
    pub bidirectional: bool,
    /// Disabled bindings stay registered but plan nothing
    pub enabled: bool,
}

impl Default for BindOptions {
    fn default() -> Self {
        BindOptions {
            transform: None,
            bidirectional: false,
            enabled: true,
        }
    }
}

struct Binding {
    id: String,
    source_path: String,
    target_path: String,
    transform: Option<BindingTransform>,
    bidirectional: bool,
    enabled: AtomicBool,
    /// Synthetic source stamped on writes this binding performs
    marker: String,
}

/// A planned write: the store executes it with `source = marker`.
#[derive(Debug, Clone)]
pub struct BindingApplication {
    pub binding_id: String,
    pub target_path: String,
    pub value: Value,
    pub marker: String,
}

#[derive(Default)]
pub struct BindingEngine {
    bindings: DashMap<String, Arc<Binding>>,
}

impl BindingEngine {
    pub fn new() -> Self {
        BindingEngine {
            bindings: DashMap::new(),
        }
    }

    pub fn bind(
        &self,
        source_path: &str,
        target_path: &str,
        options: BindOptions,
    ) -> String {
        let id = nanoid!();
        let binding = Binding {
            id: id.clone(),
            source_path: source_path.to_string(),
            target_path: target_path.to_string(),
            transform: options.transform,
            bidirectional: options.bidirectional,
            enabled: AtomicBool::new(options.enabled),
            marker: format!("{}{}", BINDING_SOURCE_PREFIX, id),
        };
        self.bindings.insert(id.clone(), Arc::new(binding));
        debug!("registered binding '{}': '{}' -> '{}'", id, source_path, target_path);
        id
    }

    pub fn unbind(
        &self,
        binding_id: &str,
    ) -> bool {
        self.bindings.remove(binding_id).is_some()
    }

    pub fn set_enabled(
        &self,
        binding_id: &str,
        enabled: bool,
    ) -> bool {
        match self.bindings.get(binding_id) {
            Some(binding) => {
                binding.enabled.store(enabled, Ordering::Release);
                true
            }
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    /// The one-shot application performed right after `bind`, from the
    /// current source value (if any).
    pub fn initial_application(
        &self,
        binding_id: &str,
        source_value: &Value,
    ) -> Option<BindingApplication> {
        let binding = self.bindings.get(binding_id)?.clone();
        if !binding.enabled.load(Ordering::Acquire) {
            return None;
        }
        self.forward(&binding, source_value)
    }

    /// Plan the writes a change record triggers. A delete propagates
    /// nothing; a change sourced from a binding's own marker is skipped by
    /// that binding.
    pub fn plan(
        &self,
        record: &ChangeRecord,
    ) -> Vec<BindingApplication> {
        let Some(new_value) = &record.new_value else {
            return Vec::new();
        };

        let mut applications = Vec::new();
        for entry in self.bindings.iter() {
            let binding = entry.value();
            if !binding.enabled.load(Ordering::Acquire) {
                continue;
            }
            if record.source == binding.marker {
                continue;
            }

            if record.path == binding.source_path {
                if let Some(application) = self.forward(binding, new_value) {
                    applications.push(application);
                }
            } else if binding.bidirectional && record.path == binding.target_path {
                applications.push(BindingApplication {
                    binding_id: binding.id.clone(),
                    target_path: binding.source_path.clone(),
                    value: new_value.clone(),
                    marker: binding.marker.clone(),
                });
            }
        }
        applications
    }

    fn forward(
        &self,
        binding: &Binding,
        source_value: &Value,
    ) -> Option<BindingApplication> {
        let value = match &binding.transform {
            Some(transform) => match transform(source_value) {
                Ok(v) => v,
                Err(e) => {
                    HANDLER_FAILURES_METRIC.with_label_values(&["binding"]).inc();
                    warn!("transform of binding '{}' failed: {}", binding.id, e);
                    return None;
                }
            },
            None => source_value.clone(),
        };
        Some(BindingApplication {
            binding_id: binding.id.clone(),
            target_path: binding.target_path.clone(),
            value,
            marker: binding.marker.clone(),
        })
    }
}
