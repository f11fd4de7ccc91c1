mod engine;
mod graph;

pub use engine::*;
pub use graph::*;
