//! Saga engine error types.

use pubsub::PubSubError;
use storage::StorageError;
use thiserror::Error;

/// Errors surfaced by the orchestration engine.
///
/// Only [`Orchestrator::start_saga`](crate::Orchestrator::start_saga)
/// returns errors to external callers; message-processing errors are
/// logged and absorbed, and recovery re-drives the affected step.
#[derive(Debug, Error)]
pub enum SagaError {
    /// A saga must contain at least one step.
    #[error("saga must have at least one step")]
    EmptySaga,

    /// No handler is registered for the step name in this process.
    /// Non-terminal: recovery redelivers until an instance that owns the
    /// handler picks the step up.
    #[error("no handler registered for step '{0}'")]
    MissingHandler(String),

    /// Storage error.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// Pub/sub error.
    #[error("pubsub error: {0}")]
    PubSub(#[from] PubSubError),
}

/// Convenience type alias for saga engine results.
pub type Result<T> = std::result::Result<T, SagaError>;
