use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;

use nanoid::nanoid;

use crate::utils::time::now_ms;

/// Closed set of domain event kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    StateChanged,
    StateDeleted,
    ComputedInvalidated,
    BindingApplied,
    SystemStarted,
    SystemStopped,
}

impl EventType {
    pub(crate) fn as_str(&self) -> &'static str {
        match self {
            EventType::StateChanged => "state_changed",
            EventType::StateDeleted => "state_deleted",
            EventType::ComputedInvalidated => "computed_invalidated",
            EventType::BindingApplied => "binding_applied",
            EventType::SystemStarted => "system_started",
            EventType::SystemStopped => "system_stopped",
        }
    }

    /// Queue tier used when the publisher does not pick one explicitly.
    pub fn default_priority(&self) -> Priority {
        match self {
            EventType::StateChanged => Priority::Normal,
            EventType::StateDeleted => Priority::High,
            EventType::ComputedInvalidated => Priority::Low,
            EventType::BindingApplied => Priority::Normal,
            EventType::SystemStarted | EventType::SystemStopped => Priority::Critical,
        }
    }
}

impl std::fmt::Display for EventType {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Five fixed tiers. Order is strict: a non-empty higher tier is always
/// drained before any lower tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Critical,
    High,
    Normal,
    Low,
    Background,
}

impl Priority {
    pub const ALL: [Priority; 5] = [
        Priority::Critical,
        Priority::High,
        Priority::Normal,
        Priority::Low,
        Priority::Background,
    ];

    pub(crate) fn index(&self) -> usize {
        match self {
            Priority::Critical => 0,
            Priority::High => 1,
            Priority::Normal => 2,
            Priority::Low => 3,
            Priority::Background => 4,
        }
    }

    /// Low and background events are dropped instead of exerting
    /// back-pressure when their queue is full.
    pub(crate) fn is_droppable(&self) -> bool {
        matches!(self, Priority::Low | Priority::Background)
    }

    pub(crate) fn as_str(&self) -> &'static str {
        match self {
            Priority::Critical => "critical",
            Priority::High => "high",
            Priority::Normal => "normal",
            Priority::Low => "low",
            Priority::Background => "background",
        }
    }
}

/// Immutable once published.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub id: String,
    pub event_type: EventType,
    pub payload: Value,
    pub source: String,
    /// Milliseconds since epoch
    pub timestamp: u64,
    pub priority: Priority,
}

impl Event {
    pub fn new(
        event_type: EventType,
        payload: Value,
        source: &str,
    ) -> Self {
        Self::with_priority(event_type, payload, source, event_type.default_priority())
    }

    pub fn with_priority(
        event_type: EventType,
        payload: Value,
        source: &str,
        priority: Priority,
    ) -> Self {
        Event {
            id: nanoid!(),
            event_type,
            payload,
            source: source.to_string(),
            timestamp: now_ms(),
            priority,
        }
    }
}
