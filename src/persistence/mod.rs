mod adapter;
mod memory;
mod router;
mod sled_adapter;

pub use adapter::*;
pub use memory::*;
pub use router::*;
pub use sled_adapter::*;
