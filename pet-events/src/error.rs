//! Error types for event publishing and broker operations.

use thiserror::Error;

/// Event pipeline error types.
#[derive(Debug, Error)]
pub enum EventError {
    /// Broker unreachable, channel failure, or a publish that did not go out
    #[error("Transport error: {0}")]
    Transport(String),

    /// Exchange/queue declaration failed or conflicts with an existing declaration
    #[error("Topology error: {0}")]
    Topology(String),

    /// Payload could not be serialized into an envelope
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Bytes received from the broker are not a valid envelope
    #[error("Malformed message: {0}")]
    Malformed(String),
}

/// Result type for event pipeline operations.
pub type EventResult<T> = Result<T, EventError>;

impl EventError {
    /// Whether this error means the broker could not be reached or used.
    ///
    /// Callers on the request path log these and carry on; the domain write
    /// that triggered the event is not rolled back.
    pub fn is_transport(&self) -> bool {
        matches!(self, EventError::Transport(_))
    }
}
