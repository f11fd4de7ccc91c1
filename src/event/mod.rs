mod bus;
#[allow(clippy::module_inception)]
mod event;
mod processor;
mod queue;

pub use bus::*;
pub use event::*;
pub use processor::*;
pub use queue::*;

#[cfg(test)]
mod queue_test;
