//! Typed publish/subscribe with bounded history and per-subscription
//! isolation: one handler's failure is logged and counted, never surfaced
//! to the publisher or to sibling subscriptions.

use std::collections::VecDeque;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use std::time::Instant;

use dashmap::DashMap;
use nanoid::nanoid;
use parking_lot::Mutex;
use tracing::debug;
use tracing::warn;

use crate::metrics::DISPATCH_DURATION_METRIC;
use crate::metrics::EVENTS_FAILED_METRIC;
use crate::metrics::EVENTS_PUBLISHED_METRIC;
use crate::metrics::HANDLER_FAILURES_METRIC;
use crate::utils::time::now_ms;
use crate::Event;
use crate::EventBusConfig;
use crate::EventType;
use crate::HandlerError;
use crate::Priority;

pub type EventHandler =
    Arc<dyn Fn(&Event) -> std::result::Result<(), HandlerError> + Send + Sync>;

pub type EventFilter = Arc<dyn Fn(&Event) -> bool + Send + Sync>;

#[derive(Clone)]
pub struct SubscribeOptions {
    pub name: Option<String>,
    pub filters: Vec<EventFilter>,
    /// Orders handler invocation within one event's fan-out
    pub priority: Priority,
    pub enabled: bool,
}

impl Default for SubscribeOptions {
    fn default() -> Self {
        SubscribeOptions {
            name: None,
            filters: Vec::new(),
            priority: Priority::Normal,
            enabled: true,
        }
    }
}

struct Subscription {
    id: String,
    name: String,
    types: Vec<EventType>,
    handler: EventHandler,
    filters: Vec<EventFilter>,
    priority: Priority,
    enabled: AtomicBool,
    trigger_count: AtomicU64,
    failure_count: AtomicU64,
    last_triggered_ms: AtomicU64,
}

impl Subscription {
    fn matches(
        &self,
        event: &Event,
    ) -> bool {
        self.enabled.load(Ordering::Acquire)
            && self.types.contains(&event.event_type)
            && self.filters.iter().all(|filter| filter(event))
    }
}

/// Per-subscription delivery statistics.
#[derive(Debug, Clone)]
pub struct SubscriptionStats {
    pub id: String,
    pub name: String,
    pub trigger_count: u64,
    pub failure_count: u64,
    pub last_triggered_ms: Option<u64>,
}

#[derive(Debug, Default)]
struct BusCounters {
    published: AtomicU64,
    processed: AtomicU64,
    failed: AtomicU64,
    total_dispatch_nanos: AtomicU64,
    peak_dispatch_nanos: AtomicU64,
    subscriptions_created: AtomicU64,
    subscriptions_removed: AtomicU64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BusMetricsSnapshot {
    pub events_published: u64,
    pub events_processed: u64,
    pub events_failed: u64,
    pub avg_dispatch: Duration,
    pub peak_dispatch: Duration,
    pub subscriptions_created: u64,
    pub subscriptions_removed: u64,
}

/// Result of fanning one event out.
#[derive(Debug, Clone, Copy, Default)]
pub struct DispatchOutcome {
    pub handlers_invoked: usize,
    pub handlers_failed: usize,
}

pub struct EventBus {
    subscriptions: DashMap<String, Arc<Subscription>>,
    history: Mutex<VecDeque<Event>>,
    history_capacity: usize,
    counters: BusCounters,
}

impl EventBus {
    pub fn new(config: &EventBusConfig) -> Self {
        EventBus {
            subscriptions: DashMap::new(),
            history: Mutex::new(VecDeque::with_capacity(config.history_capacity.min(1024))),
            history_capacity: config.history_capacity,
            counters: BusCounters::default(),
        }
    }

    pub fn subscribe(
        &self,
        types: Vec<EventType>,
        handler: EventHandler,
        options: SubscribeOptions,
    ) -> String {
        let id = nanoid!();
        let name = options.name.unwrap_or_else(|| format!("subscription-{}", id));
        self.subscriptions.insert(
            id.clone(),
            Arc::new(Subscription {
                id: id.clone(),
                name: name.clone(),
                types,
                handler,
                filters: options.filters,
                priority: options.priority,
                enabled: AtomicBool::new(options.enabled),
                trigger_count: AtomicU64::new(0),
                failure_count: AtomicU64::new(0),
                last_triggered_ms: AtomicU64::new(0),
            }),
        );
        self.counters.subscriptions_created.fetch_add(1, Ordering::Relaxed);
        debug!("subscription '{}' ({}) registered", name, id);
        id
    }

    pub fn unsubscribe(
        &self,
        subscription_id: &str,
    ) -> bool {
        let removed = self.subscriptions.remove(subscription_id).is_some();
        if removed {
            self.counters.subscriptions_removed.fetch_add(1, Ordering::Relaxed);
        }
        removed
    }

    pub fn set_subscription_enabled(
        &self,
        subscription_id: &str,
        enabled: bool,
    ) -> bool {
        match self.subscriptions.get(subscription_id) {
            Some(subscription) => {
                subscription.enabled.store(enabled, Ordering::Release);
                true
            }
            None => false,
        }
    }

    /// Record + synchronous fan-out. The asynchronous path goes through the
    /// priority processor instead: `record` at enqueue, `dispatch` in a
    /// worker.
    pub fn publish(
        &self,
        event: &Event,
    ) -> DispatchOutcome {
        self.record(event);
        self.dispatch(event)
    }

    /// Append to the bounded event ring and count the publication.
    pub fn record(
        &self,
        event: &Event,
    ) {
        let mut history = self.history.lock();
        if history.len() == self.history_capacity {
            history.pop_front();
        }
        history.push_back(event.clone());
        drop(history);

        self.counters.published.fetch_add(1, Ordering::Relaxed);
        EVENTS_PUBLISHED_METRIC
            .with_label_values(&[event.event_type.as_str()])
            .inc();
    }

    /// Fan out to every matching subscription, higher subscription priority
    /// first. Each invocation is independent.
    pub fn dispatch(
        &self,
        event: &Event,
    ) -> DispatchOutcome {
        let started = Instant::now();

        let mut matching: Vec<Arc<Subscription>> = self
            .subscriptions
            .iter()
            .filter(|entry| entry.value().matches(event))
            .map(|entry| entry.value().clone())
            .collect();
        matching.sort_by_key(|subscription| subscription.priority.index());

        let mut outcome = DispatchOutcome::default();
        for subscription in matching {
            outcome.handlers_invoked += 1;
            subscription.trigger_count.fetch_add(1, Ordering::Relaxed);
            subscription.last_triggered_ms.store(now_ms(), Ordering::Relaxed);

            if let Err(e) = (subscription.handler)(event) {
                outcome.handlers_failed += 1;
                subscription.failure_count.fetch_add(1, Ordering::Relaxed);
                HANDLER_FAILURES_METRIC.with_label_values(&["subscription"]).inc();
                warn!(
                    "subscription '{}' failed on {} event '{}': {}",
                    subscription.name, event.event_type, event.id, e
                );
            }
        }

        let elapsed = started.elapsed();
        self.track_dispatch(event, elapsed, outcome);
        outcome
    }

    fn track_dispatch(
        &self,
        event: &Event,
        elapsed: Duration,
        outcome: DispatchOutcome,
    ) {
        self.counters.processed.fetch_add(1, Ordering::Relaxed);
        if outcome.handlers_failed > 0 {
            self.counters.failed.fetch_add(1, Ordering::Relaxed);
            EVENTS_FAILED_METRIC
                .with_label_values(&[event.event_type.as_str()])
                .inc();
        }

        let nanos = elapsed.as_nanos() as u64;
        self.counters.total_dispatch_nanos.fetch_add(nanos, Ordering::Relaxed);
        self.counters.peak_dispatch_nanos.fetch_max(nanos, Ordering::Relaxed);
        DISPATCH_DURATION_METRIC
            .with_label_values(&[event.event_type.as_str()])
            .observe(elapsed.as_secs_f64() * 1000.0);
    }

    /// Newest first, optionally narrowed by type and source.
    pub fn history(
        &self,
        event_type: Option<EventType>,
        source: Option<&str>,
        limit: usize,
    ) -> Vec<Event> {
        let history = self.history.lock();
        history
            .iter()
            .rev()
            .filter(|e| event_type.map_or(true, |t| e.event_type == t))
            .filter(|e| source.map_or(true, |s| e.source == s))
            .take(limit)
            .cloned()
            .collect()
    }

    pub fn subscription_stats(
        &self,
        subscription_id: &str,
    ) -> Option<SubscriptionStats> {
        self.subscriptions.get(subscription_id).map(|subscription| {
            let last = subscription.last_triggered_ms.load(Ordering::Relaxed);
            SubscriptionStats {
                id: subscription.id.clone(),
                name: subscription.name.clone(),
                trigger_count: subscription.trigger_count.load(Ordering::Relaxed),
                failure_count: subscription.failure_count.load(Ordering::Relaxed),
                last_triggered_ms: (last > 0).then_some(last),
            }
        })
    }

    pub fn subscription_count(&self) -> usize {
        self.subscriptions.len()
    }

    pub fn metrics_snapshot(&self) -> BusMetricsSnapshot {
        let processed = self.counters.processed.load(Ordering::Relaxed);
        let total_nanos = self.counters.total_dispatch_nanos.load(Ordering::Relaxed);
        let avg_nanos = if processed == 0 { 0 } else { total_nanos / processed };
        BusMetricsSnapshot {
            events_published: self.counters.published.load(Ordering::Relaxed),
            events_processed: processed,
            events_failed: self.counters.failed.load(Ordering::Relaxed),
            avg_dispatch: Duration::from_nanos(avg_nanos),
            peak_dispatch: Duration::from_nanos(
                self.counters.peak_dispatch_nanos.load(Ordering::Relaxed),
            ),
            subscriptions_created: self.counters.subscriptions_created.load(Ordering::Relaxed),
            subscriptions_removed: self.counters.subscriptions_removed.load(Ordering::Relaxed),
        }
    }
}
