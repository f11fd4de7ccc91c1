//! Shared fixtures for unit tests.

use std::sync::atomic::AtomicU32;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::sleep;
use tokio::time::timeout;

use crate::Event;
use crate::EventBusConfig;
use crate::EventHandler;
use crate::ProcessorConfig;
use crate::Settings;
use crate::StateContext;
use crate::StoreConfig;

/// Small capacities so eviction and back-pressure paths are reachable.
pub fn test_settings() -> Settings {
    Settings {
        store: StoreConfig {
            change_history_capacity: 64,
        },
        processor: ProcessorConfig {
            workers: 2,
            blocking_queue_capacity: 32,
            droppable_queue_capacity: 8,
            result_history_capacity: 16,
        },
        bus: EventBusConfig {
            history_capacity: 32,
        },
    }
}

pub fn test_context() -> StateContext {
    StateContext::new(test_settings())
}

/// An event handler that only counts invocations.
pub fn counting_handler() -> (Arc<AtomicU32>, EventHandler) {
    let calls = Arc::new(AtomicU32::new(0));
    let counter = calls.clone();
    let handler: EventHandler = Arc::new(move |_event: &Event| {
        counter.fetch_add(1, Ordering::SeqCst);
        Ok(())
    });
    (calls, handler)
}

/// Poll until `condition` holds, failing the test after five seconds.
pub async fn wait_until(mut condition: impl FnMut() -> bool) {
    timeout(Duration::from_secs(5), async {
        while !condition() {
            sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition should hold before timeout");
}
