//! Explicitly constructed composition root.
//!
//! One `StateContext` is one isolated reactive-state universe: its own
//! entry map, computed engine, registries, bus and worker pool. Tests and
//! embedders can run several side by side; there is no process-wide
//! singleton.

use std::sync::Arc;

use serde_json::json;
use tracing::info;

use crate::BindingEngine;
use crate::ComputedEngine;
use crate::EntryMap;
use crate::Event;
use crate::EventBus;
use crate::EventType;
use crate::PersistenceAdapter;
use crate::PersistenceRouter;
use crate::PriorityEventProcessor;
use crate::Result;
use crate::Settings;
use crate::StateStore;
use crate::WatcherRegistry;

pub struct StateContext {
    store: Arc<StateStore>,
    bus: Arc<EventBus>,
    processor: Arc<PriorityEventProcessor>,
    persistence: Arc<PersistenceRouter>,
}

impl StateContext {
    pub fn new(settings: Settings) -> Self {
        let entries = Arc::new(EntryMap::new());
        let computed = Arc::new(ComputedEngine::new(entries.clone()));
        let watchers = Arc::new(WatcherRegistry::new(entries.clone()));
        let bindings = Arc::new(BindingEngine::new());
        let bus = Arc::new(EventBus::new(&settings.bus));
        let processor = Arc::new(PriorityEventProcessor::new(settings.processor.clone(), bus.clone()));
        let persistence = Arc::new(PersistenceRouter::new());

        let store = Arc::new(StateStore::new(
            &settings.store,
            entries,
            computed,
            watchers,
            bindings,
            bus.clone(),
            processor.clone(),
            persistence.clone(),
        ));

        StateContext {
            store,
            bus,
            processor,
            persistence,
        }
    }

    pub fn store(&self) -> &Arc<StateStore> {
        &self.store
    }

    pub fn bus(&self) -> &Arc<EventBus> {
        &self.bus
    }

    pub fn processor(&self) -> &Arc<PriorityEventProcessor> {
        &self.processor
    }

    pub fn register_adapter(
        &self,
        adapter: Arc<dyn PersistenceAdapter>,
    ) {
        self.persistence.register(adapter);
    }

    /// Launch the worker pool and announce the lifecycle transition.
    pub async fn start(&self) -> Result<()> {
        self.processor.start()?;
        self.processor
            .enqueue(Event::new(EventType::SystemStarted, json!({}), "context"))
            .await?;
        info!("state context started");
        Ok(())
    }

    /// Stop the workers. The shutdown event is fanned out synchronously so
    /// subscribers hear it even though the pool is gone.
    pub async fn stop(&self) -> Result<()> {
        self.processor.stop().await?;
        self.bus.publish(&Event::new(EventType::SystemStopped, json!({}), "context"));
        info!("state context stopped");
        Ok(())
    }
}
