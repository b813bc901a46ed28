//! Error types for the notification service.

use pet_events::EventError;
use thiserror::Error;

/// Notification store errors.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The backing store rejected or failed the operation
    #[error("Persistence failed: {0}")]
    Persistence(String),

    /// Record not found
    #[error("Notification not found: {0}")]
    NotFound(i64),
}

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Subscriber errors. Any of these ends the consume loop.
#[derive(Debug, Error)]
pub enum SubscriberError {
    /// Connecting, declaring topology or starting the consumer failed
    #[error("Subscriber setup failed: {0}")]
    Setup(#[source] EventError),

    /// The broker stopped delivering (channel or connection closed)
    #[error("Delivery stream closed: {0}")]
    StreamClosed(String),
}

/// Result type for subscriber operations.
pub type SubscriberResult<T> = Result<T, SubscriberError>;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Missing required environment variable.
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    /// Invalid configuration value.
    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue {
        /// Configuration key.
        key: String,
        /// Error message.
        message: String,
    },
}
