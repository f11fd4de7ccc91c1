mod entry;
mod history;
mod path_lock;
#[allow(clippy::module_inception)]
mod store;

pub use entry::*;
pub use history::*;
pub use path_lock::*;
pub use store::*;

#[cfg(test)]
mod history_test;
#[cfg(test)]
mod store_test;
