// -
// Capacity defaults

/// Bounded change-history length kept by the state store
pub(crate) const DEFAULT_CHANGE_HISTORY_CAPACITY: usize = 1000;

/// Bounded event-history ring kept by the event bus
pub(crate) const DEFAULT_EVENT_HISTORY_CAPACITY: usize = 500;

/// Bounded processing-result ring kept by the priority processor
pub(crate) const DEFAULT_RESULT_HISTORY_CAPACITY: usize = 256;

/// Worker pool size for the priority processor
pub(crate) const DEFAULT_WORKER_COUNT: usize = 4;

/// Queue capacity for the blocking tiers (critical / high / normal)
pub(crate) const DEFAULT_BLOCKING_QUEUE_CAPACITY: usize = 1024;

/// Queue capacity for the droppable tiers (low / background)
pub(crate) const DEFAULT_DROPPABLE_QUEUE_CAPACITY: usize = 512;

// -
// Path namespaces

/// Source prefix stamped on writes performed by the binding engine.
/// Changes carrying this prefix are skipped by the binding that produced
/// them, which breaks bidirectional write cycles.
pub(crate) const BINDING_SOURCE_PREFIX: &str = "__binding:";

/// Path segment separator
pub(crate) const PATH_SEPARATOR: char = '.';

// -
// Sled namespaces

/// Sled tree holding persisted state entries
pub(crate) const STATE_ENTRIES_TREE: &str = "_stateflow_entries";
