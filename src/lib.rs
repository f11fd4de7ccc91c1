mod computed;
mod config;
mod constants;
mod context;
mod errors;
mod event;
mod metrics;
mod persistence;
mod store;
mod watch;
pub mod utils;

pub use computed::*;
pub use config::*;
pub use context::*;
pub use errors::*;
pub use event::*;
pub use metrics::*;
pub use persistence::*;
pub use store::*;
pub use watch::*;

//-----------------------------------------------------------
// Test utils

#[cfg(test)]
pub mod test_utils;

//-----------------------------------------------------------
// Autometrics
/// autometrics: https://docs.autometrics.dev/rust/adding-alerts-and-slos
use autometrics::objectives::Objective;
use autometrics::objectives::ObjectiveLatency;
use autometrics::objectives::ObjectivePercentile;
const API_SLO: Objective = Objective::new("api")
    .success_rate(ObjectivePercentile::P99_9)
    .latency(ObjectiveLatency::Ms10, ObjectivePercentile::P99);
