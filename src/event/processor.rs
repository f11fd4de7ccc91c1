//! Multi-worker asynchronous consumer of the priority queues.
//!
//! Each worker repeatedly takes the highest-priority queued event and fans
//! it out through the event bus. Drain order is strict priority: a
//! continuous stream of critical events starves lower tiers by design.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use std::time::Instant;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::error;
use tracing::info;

use crate::metrics::EVENTS_PROCESSED_METRIC;
use crate::Event;
use crate::EventBus;
use crate::EventType;
use crate::Priority;
use crate::PriorityQueues;
use crate::ProcessorConfig;
use crate::ProcessorError;
use crate::Result;

/// Outcome of one dispatched event, kept in a bounded ring for
/// observability.
#[derive(Debug, Clone)]
pub struct EventProcessingResult {
    pub event_id: String,
    pub event_type: EventType,
    pub priority: Priority,
    pub success: bool,
    pub duration: Duration,
    pub handlers_invoked: usize,
    pub handlers_failed: usize,
}

pub struct PriorityEventProcessor {
    queues: Arc<PriorityQueues>,
    bus: Arc<EventBus>,
    config: ProcessorConfig,
    results: Arc<Mutex<VecDeque<EventProcessingResult>>>,
    cancel: Mutex<Option<CancellationToken>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl PriorityEventProcessor {
    pub fn new(
        config: ProcessorConfig,
        bus: Arc<EventBus>,
    ) -> Self {
        let queues = Arc::new(PriorityQueues::new(
            config.blocking_queue_capacity,
            config.droppable_queue_capacity,
        ));
        PriorityEventProcessor {
            queues,
            bus,
            config,
            results: Arc::new(Mutex::new(VecDeque::new())),
            cancel: Mutex::new(None),
            workers: Mutex::new(Vec::new()),
        }
    }

    pub fn is_running(&self) -> bool {
        self.cancel.lock().is_some()
    }

    /// Record the event in the bus history and queue it by its priority.
    /// Returns `Ok(false)` when a droppable-tier event was discarded.
    pub async fn enqueue(
        &self,
        event: Event,
    ) -> Result<bool> {
        self.bus.record(&event);
        Ok(self.queues.push(event).await.map_err(crate::Error::Processor)?)
    }

    /// Launch the worker pool. Fails if already running.
    pub fn start(&self) -> Result<()> {
        let mut cancel_slot = self.cancel.lock();
        if cancel_slot.is_some() {
            return Err(ProcessorError::AlreadyRunning.into());
        }
        let cancel = CancellationToken::new();

        let mut workers = self.workers.lock();
        for worker_id in 0..self.config.workers {
            let queues = self.queues.clone();
            let bus = self.bus.clone();
            let results = self.results.clone();
            let result_capacity = self.config.result_history_capacity;
            let cancel = cancel.clone();

            workers.push(tokio::spawn(async move {
                debug!("event worker {} started", worker_id);
                loop {
                    tokio::select! {
                        biased;
                        _ = cancel.cancelled() => break,
                        event = queues.pop() => {
                            process_event(&bus, &results, result_capacity, event);
                        }
                    }
                }
                debug!("event worker {} stopped", worker_id);
            }));
        }

        *cancel_slot = Some(cancel);
        info!("priority event processor started with {} worker(s)", self.config.workers);
        Ok(())
    }

    /// Cancel the workers and wait for them to exit. Queued events that no
    /// worker picked up remain queued.
    pub async fn stop(&self) -> Result<()> {
        let cancel = self.cancel.lock().take().ok_or(ProcessorError::NotRunning)?;
        cancel.cancel();

        let workers: Vec<JoinHandle<()>> = self.workers.lock().drain(..).collect();
        for worker in workers {
            if let Err(e) = worker.await {
                error!("event worker did not shut down cleanly: {}", e);
            }
        }
        info!("priority event processor stopped");
        Ok(())
    }

    pub fn queue_depth(
        &self,
        priority: Priority,
    ) -> usize {
        self.queues.depth(priority)
    }

    /// Newest first.
    pub fn recent_results(
        &self,
        limit: usize,
    ) -> Vec<EventProcessingResult> {
        let results = self.results.lock();
        results.iter().rev().take(limit).cloned().collect()
    }
}

fn process_event(
    bus: &EventBus,
    results: &Mutex<VecDeque<EventProcessingResult>>,
    result_capacity: usize,
    event: Event,
) {
    let started = Instant::now();
    let outcome = bus.dispatch(&event);
    let duration = started.elapsed();

    EVENTS_PROCESSED_METRIC
        .with_label_values(&[event.priority.as_str()])
        .inc();

    let mut results = results.lock();
    if results.len() == result_capacity {
        results.pop_front();
    }
    results.push_back(EventProcessingResult {
        event_id: event.id,
        event_type: event.event_type,
        priority: event.priority,
        success: outcome.handlers_failed == 0,
        duration,
        handlers_invoked: outcome.handlers_invoked,
        handlers_failed: outcome.handlers_failed,
    });
}
