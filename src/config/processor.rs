use serde::Deserialize;
use serde::Serialize;

use crate::constants::DEFAULT_BLOCKING_QUEUE_CAPACITY;
use crate::constants::DEFAULT_DROPPABLE_QUEUE_CAPACITY;
use crate::constants::DEFAULT_RESULT_HISTORY_CAPACITY;
use crate::constants::DEFAULT_WORKER_COUNT;
use crate::Error;
use crate::Result;

/// Configuration parameters for the priority event processor
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct ProcessorConfig {
    /// Number of concurrent worker loops draining the priority queues
    #[serde(default = "default_worker_count")]
    pub workers: usize,

    /// Queue capacity for the critical, high and normal tiers.
    /// Producers block when one of these tiers is full (back-pressure).
    #[serde(default = "default_blocking_queue_capacity")]
    pub blocking_queue_capacity: usize,

    /// Queue capacity for the low and background tiers.
    /// Events are dropped with a warning when one of these tiers is full.
    #[serde(default = "default_droppable_queue_capacity")]
    pub droppable_queue_capacity: usize,

    /// Number of per-event processing results retained for observability
    #[serde(default = "default_result_history_capacity")]
    pub result_history_capacity: usize,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        ProcessorConfig {
            workers: default_worker_count(),
            blocking_queue_capacity: default_blocking_queue_capacity(),
            droppable_queue_capacity: default_droppable_queue_capacity(),
            result_history_capacity: default_result_history_capacity(),
        }
    }
}

impl ProcessorConfig {
    pub fn validate(&self) -> Result<()> {
        if self.workers == 0 {
            return Err(Error::Fatal("processor.workers must be greater than zero".to_string()));
        }
        if self.blocking_queue_capacity == 0 || self.droppable_queue_capacity == 0 {
            return Err(Error::Fatal(
                "processor queue capacities must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

fn default_worker_count() -> usize {
    DEFAULT_WORKER_COUNT
}

fn default_blocking_queue_capacity() -> usize {
    DEFAULT_BLOCKING_QUEUE_CAPACITY
}

fn default_droppable_queue_capacity() -> usize {
    DEFAULT_DROPPABLE_QUEUE_CAPACITY
}

fn default_result_history_capacity() -> usize {
    DEFAULT_RESULT_HISTORY_CAPACITY
}
