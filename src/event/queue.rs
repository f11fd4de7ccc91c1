//! Five bounded priority tiers with two overflow policies.
//!
//! Critical, high and normal producers block on a semaphore permit when
//! their tier is full (back-pressure reaches the publisher). Low and
//! background events are dropped with a warning instead.

use std::collections::VecDeque;

use parking_lot::Mutex;
use tokio::sync::Notify;
use tokio::sync::Semaphore;
use tracing::warn;

use crate::metrics::EVENTS_DROPPED_METRIC;
use crate::metrics::QUEUE_DEPTH_METRIC;
use crate::Event;
use crate::Priority;
use crate::ProcessorError;

struct Tier {
    priority: Priority,
    deque: Mutex<VecDeque<Event>>,
    /// Permits mirror free capacity
    capacity: Semaphore,
}

impl Tier {
    fn new(
        priority: Priority,
        capacity: usize,
    ) -> Self {
        Tier {
            priority,
            deque: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity: Semaphore::new(capacity),
        }
    }
}

pub struct PriorityQueues {
    tiers: [Tier; 5],
    /// Wakes workers parked on an empty queue set
    consumers: Notify,
}

impl PriorityQueues {
    pub fn new(
        blocking_capacity: usize,
        droppable_capacity: usize,
    ) -> Self {
        let capacity_for = |priority: Priority| {
            if priority.is_droppable() {
                droppable_capacity
            } else {
                blocking_capacity
            }
        };
        PriorityQueues {
            tiers: Priority::ALL.map(|priority| Tier::new(priority, capacity_for(priority))),
            consumers: Notify::new(),
        }
    }

    /// Enqueue by the event's priority. Returns `Ok(false)` when a
    /// droppable-tier event was discarded because its queue was full; blocks
    /// until space frees for the other tiers.
    pub async fn push(
        &self,
        event: Event,
    ) -> std::result::Result<bool, ProcessorError> {
        let tier = &self.tiers[event.priority.index()];

        if event.priority.is_droppable() {
            match tier.capacity.try_acquire() {
                Ok(permit) => permit.forget(),
                Err(_) => {
                    EVENTS_DROPPED_METRIC
                        .with_label_values(&[event.priority.as_str()])
                        .inc();
                    warn!(
                        "{} queue full, dropping {} event '{}'",
                        event.priority.as_str(),
                        event.event_type,
                        event.id
                    );
                    return Ok(false);
                }
            }
        } else {
            tier.capacity
                .acquire()
                .await
                .map_err(|_| ProcessorError::QueueClosed)?
                .forget();
        }

        tier.deque.lock().push_back(event);
        QUEUE_DEPTH_METRIC
            .with_label_values(&[tier.priority.as_str()])
            .inc();
        self.consumers.notify_one();
        Ok(true)
    }

    /// Strict priority: the highest non-empty tier wins, FIFO within it.
    pub fn try_pop(&self) -> Option<Event> {
        for tier in &self.tiers {
            let popped = tier.deque.lock().pop_front();
            if let Some(event) = popped {
                tier.capacity.add_permits(1);
                QUEUE_DEPTH_METRIC
                    .with_label_values(&[tier.priority.as_str()])
                    .dec();
                return Some(event);
            }
        }
        None
    }

    /// Park until an event is available. Cancel-safe: a wakeup without a
    /// pop leaves the queues untouched.
    pub async fn pop(&self) -> Event {
        loop {
            let notified = self.consumers.notified();
            if let Some(event) = self.try_pop() {
                if !self.is_empty() {
                    // chain the wakeup so sibling workers keep draining
                    self.consumers.notify_one();
                }
                return event;
            }
            notified.await;
        }
    }

    pub fn depth(
        &self,
        priority: Priority,
    ) -> usize {
        self.tiers[priority.index()].deque.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.tiers.iter().all(|tier| tier.deque.lock().is_empty())
    }

    /// Fail any producer currently blocked on a full tier and reject
    /// further blocking pushes.
    pub fn close(&self) {
        for tier in &self.tiers {
            tier.capacity.close();
        }
        self.consumers.notify_waiters();
    }
}
