mod binding;
mod watcher;

pub use binding::*;
pub use watcher::*;
