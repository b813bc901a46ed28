//! Error types for bearer authentication
//!
//! This module defines the errors that can occur while extracting and
//! validating the bearer token presented by a real-time client.

use thiserror::Error;

/// Authentication error types.
#[derive(Debug, Error)]
pub enum AuthError {
    /// JWT token has expired
    #[error("Token has expired")]
    TokenExpired,

    /// JWT token is invalid (malformed, bad signature, etc.)
    #[error("Invalid token: {0}")]
    InvalidToken(String),

    /// Token is missing required claims
    #[error("Missing required claim: {0}")]
    MissingClaim(String),

    /// Authorization header is present but not a bearer credential
    #[error("Malformed authorization header")]
    MalformedHeader,

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type for authentication operations.
pub type AuthResult<T> = Result<T, AuthError>;

impl AuthError {
    /// Check if this error should be logged at error level.
    ///
    /// Rejected client credentials are expected and are not server errors.
    pub fn is_server_error(&self) -> bool {
        matches!(self, AuthError::Internal(_) | AuthError::ConfigError(_))
    }

    /// Get HTTP status code for this error.
    pub fn status_code(&self) -> u16 {
        match self {
            AuthError::TokenExpired
            | AuthError::InvalidToken(_)
            | AuthError::MissingClaim(_)
            | AuthError::MalformedHeader => 401,

            AuthError::ConfigError(_) | AuthError::Internal(_) => 500,
        }
    }

    /// Get error code for API responses.
    pub fn error_code(&self) -> &'static str {
        match self {
            AuthError::TokenExpired => "TOKEN_EXPIRED",
            AuthError::InvalidToken(_) => "INVALID_TOKEN",
            AuthError::MissingClaim(_) => "MISSING_CLAIM",
            AuthError::MalformedHeader => "MALFORMED_HEADER",
            AuthError::ConfigError(_) => "CONFIG_ERROR",
            AuthError::Internal(_) => "INTERNAL_ERROR",
        }
    }
}
