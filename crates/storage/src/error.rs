use common::{SagaId, StepId};
use thiserror::Error;

/// Errors that can occur when interacting with saga storage.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The saga was not found. Benign during races with concurrent writers.
    #[error("saga not found: {0}")]
    SagaNotFound(SagaId),

    /// The step was not found. Benign during races with concurrent writers.
    #[error("step not found: {0}")]
    StepNotFound(StepId),

    /// A backend I/O failure. The engine logs these and relies on recovery
    /// to re-drive the affected step.
    #[error("storage backend error: {0}")]
    Backend(String),
}

/// Result type for storage operations.
pub type Result<T> = std::result::Result<T, StorageError>;
