//! Reactive State Store Error Hierarchy
//!
//! Defines error types for the state store, computed-state engine,
//! persistence layer and event processor, categorized by the layer that
//! raises them and by whether they are visible to the mutating caller.

use config::ConfigError;

#[doc(hidden)]
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Rejected write: no state change occurred
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// Computed-state failures, visible to the reader of a computed path
    #[error(transparent)]
    Compute(#[from] ComputeError),

    /// Durable-storage failures (best-effort, logged by the store)
    #[error(transparent)]
    Persistence(#[from] PersistenceError),

    /// Priority processor lifecycle and queue failures
    #[error(transparent)]
    Processor(#[from] ProcessorError),

    /// Configuration loading/validation failures
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Unrecoverable failures requiring caller intervention
    #[error("Fatal error: {0}")]
    Fatal(String),
}

#[derive(Debug, thiserror::Error)]
pub enum ValidationError {
    /// Write to a read-only entry
    #[error("Path '{0}' is read-only")]
    ReadOnlyPath(String),

    /// Write to a path owned by the computed engine
    #[error("Path '{0}' is a computed path and cannot be written directly")]
    ComputedPath(String),

    /// A registered validator vetoed the value
    #[error("Validator '{validator}' rejected the new value for path '{path}'")]
    Rejected { path: String, validator: String },

    /// Empty or malformed path key
    #[error("Invalid path: '{0}'")]
    InvalidPath(String),
}

#[derive(Debug, thiserror::Error)]
pub enum ComputeError {
    /// Registration would create a dependency cycle
    #[error("Registering computed path '{path}' would create a cycle through '{via}'")]
    CycleDetected { path: String, via: String },

    /// Computed path already registered
    #[error("Computed path '{0}' is already registered")]
    AlreadyRegistered(String),

    /// Read of an unregistered computed path
    #[error("No computed entry registered for path '{0}'")]
    NotRegistered(String),

    /// The user-supplied compute function failed; cache stays dirty
    #[error("Compute function for path '{path}' failed: {reason}")]
    Failed { path: String, reason: String },
}

#[derive(Debug, thiserror::Error)]
pub enum PersistenceError {
    /// Backend reported a failure
    #[error("Persistence backend error: {0}")]
    Backend(String),

    /// No adapter registered for the entry's persistence kind
    #[error("No persistence adapter registered for kind '{0}'")]
    AdapterMissing(String),

    /// Value (de)serialization failures
    #[error(transparent)]
    Serialization(#[from] serde_json::Error),

    /// Embedded DB failures
    #[error(transparent)]
    Sled(#[from] sled::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[derive(Debug, thiserror::Error)]
pub enum ProcessorError {
    #[error("Priority event processor is already running")]
    AlreadyRunning,

    #[error("Priority event processor is not running")]
    NotRunning,

    /// Enqueue after shutdown
    #[error("Priority queue is closed")]
    QueueClosed,
}

/// Failure raised by an externally supplied watcher callback, binding
/// transform or subscription handler. Caught at the observer boundary,
/// logged and counted; never propagated to the mutating caller.
#[derive(Debug, thiserror::Error)]
#[error("Handler error: {0}")]
pub struct HandlerError(pub String);

impl HandlerError {
    pub fn new(msg: impl Into<String>) -> Self {
        HandlerError(msg.into())
    }
}
