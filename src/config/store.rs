use serde::Deserialize;
use serde::Serialize;

use crate::constants::DEFAULT_CHANGE_HISTORY_CAPACITY;
use crate::Error;
use crate::Result;

/// Configuration parameters for the state store
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct StoreConfig {
    /// Maximum number of change records retained; oldest evicted on overflow
    #[serde(default = "default_change_history_capacity")]
    pub change_history_capacity: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        StoreConfig {
            change_history_capacity: default_change_history_capacity(),
        }
    }
}

impl StoreConfig {
    pub fn validate(&self) -> Result<()> {
        if self.change_history_capacity == 0 {
            return Err(Error::Fatal(
                "store.change_history_capacity must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

fn default_change_history_capacity() -> usize {
    DEFAULT_CHANGE_HISTORY_CAPACITY
}
