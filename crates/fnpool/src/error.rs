//! Error types for the worker pool
//!
//! - [`ConfigError`] - invalid pool configuration, raised before any worker exists
//! - [`ExecutionError`] - a single call failed; the pool keeps serving
//! - [`PoolError`] - umbrella error returned by pool operations and call futures

use serde::{Deserialize, Serialize};

/// Pool configuration errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    /// Pool size was zero or negative
    #[error("pool size must be a positive integer, got {0}")]
    InvalidSize(i64),

    /// A configuration value could not be parsed
    #[error("invalid value for {name}: {value:?}")]
    InvalidValue { name: String, value: String },
}

/// Errors raised while executing a single call
///
/// Execution errors reject only the affected call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[serde(tag = "kind", content = "message", rename_all = "snake_case")]
pub enum ExecutionError {
    /// The bound function returned an error
    #[error("function failed: {0}")]
    Failed(String),

    /// The bound function panicked
    #[error("function panicked: {0}")]
    Panicked(String),

    /// A value could not be serialized for transfer
    #[error("failed to serialize value: {0}")]
    Serialize(String),

    /// A transferred value could not be deserialized
    #[error("failed to deserialize value: {0}")]
    Deserialize(String),

    /// The worker thread exited before accepting the call
    #[error("worker {0} is no longer running")]
    WorkerLost(usize),
}

/// Worker pool errors
#[derive(Debug, thiserror::Error)]
pub enum PoolError {
    /// Invalid configuration
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// A worker thread could not be spawned
    #[error("failed to spawn worker thread: {0}")]
    Spawn(#[from] std::io::Error),

    /// The call failed inside the worker
    #[error(transparent)]
    Execution(#[from] ExecutionError),

    /// The pool was disposed before the call completed
    #[error("worker pool has been disposed")]
    Disposed,
}

impl PoolError {
    /// Whether this error was caused by disposing the pool
    pub fn is_disposed(&self) -> bool {
        matches!(self, Self::Disposed)
    }

    /// The execution error behind this failure, if any
    pub fn as_execution(&self) -> Option<&ExecutionError> {
        match self {
            Self::Execution(err) => Some(err),
            _ => None,
        }
    }
}
