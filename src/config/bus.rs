use serde::Deserialize;
use serde::Serialize;

use crate::constants::DEFAULT_EVENT_HISTORY_CAPACITY;
use crate::Error;
use crate::Result;

/// Configuration parameters for the event bus
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct EventBusConfig {
    /// Fixed capacity of the published-event ring buffer
    #[serde(default = "default_event_history_capacity")]
    pub history_capacity: usize,
}

impl Default for EventBusConfig {
    fn default() -> Self {
        EventBusConfig {
            history_capacity: default_event_history_capacity(),
        }
    }
}

impl EventBusConfig {
    pub fn validate(&self) -> Result<()> {
        if self.history_capacity == 0 {
            return Err(Error::Fatal(
                "bus.history_capacity must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

fn default_event_history_capacity() -> usize {
    DEFAULT_EVENT_HISTORY_CAPACITY
}
