//! Configuration for the stateflow runtime.
//!
//! Hierarchical loading with priority:
//! 1. Default values (hardcoded)
//! 2. Optional TOML config file
//! 3. Environment variables with prefix `STATEFLOW` (highest priority)

mod bus;
mod processor;
mod store;
pub use bus::*;
pub use processor::*;
pub use store::*;


//---
use config::Config;
use config::Environment;
use config::File;
use serde::Deserialize;

use crate::Result;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Settings {
    /// State store capacities and locking parameters
    #[serde(default)]
    pub store: StoreConfig,

    /// Worker pool and priority queue parameters
    #[serde(default)]
    pub processor: ProcessorConfig,

    /// Event bus history and metrics parameters
    #[serde(default)]
    pub bus: EventBusConfig,
}

impl Settings {
    /// Load configuration with priority:
    /// 1. Optional config file
    /// 2. Environment variables (highest priority)
    ///
    /// # Arguments
    /// * `config_path` - Optional path to a TOML configuration file
    pub fn load(config_path: Option<&str>) -> Result<Self> {
        let mut config = Config::builder();

        if let Some(path) = config_path {
            config = config.add_source(File::with_name(path).required(true));
        }

        config = config.add_source(
            Environment::with_prefix("STATEFLOW")
                .separator("__")
                .ignore_empty(true)
                .try_parsing(true),
        );

        let settings: Settings = config.build()?.try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<()> {
        self.processor.validate()?;
        self.store.validate()?;
        self.bus.validate()?;
        Ok(())
    }
}
