use thiserror::Error;

/// Errors that can occur when interacting with the pub/sub transport.
#[derive(Debug, Error)]
pub enum PubSubError {
    /// The bus has been closed; no further publishes or subscriptions.
    #[error("pubsub is closed")]
    Closed,

    /// A transport-level failure from an external broker.
    #[error("pubsub transport error: {0}")]
    Transport(String),
}

/// Result type for pub/sub operations.
pub type Result<T> = std::result::Result<T, PubSubError>;
