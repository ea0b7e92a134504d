//! Error types for the transit coordinator
//!
//! This module defines all error types using anyhow for consistent error handling
//! throughout the application.

/// Result type alias for convenience
pub type Result<T> = anyhow::Result<T>;

/// Custom error types for specific transit scenarios
#[derive(Debug, thiserror::Error)]
pub enum TransitError {
    #[error("Status channel failed: {message}")]
    StatusChannelFailed { message: String },

    #[error("Malformed status message: {reason}")]
    MalformedStatusMessage { reason: String },

    #[error("Queue backend call failed: {message}")]
    BackendFailed { message: String },

    #[error("Player not found: {player_id}")]
    PlayerNotFound { player_id: String },

    #[error("Configuration error: {message}")]
    ConfigurationError { message: String },

    #[error("Internal service error: {message}")]
    InternalError { message: String },
}
