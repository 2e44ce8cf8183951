//! Common error types for WSSI

use thiserror::Error;

/// Common result type for WSSI operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error types shared by the API, monitor and ops crates
#[derive(Error, Debug)]
pub enum Error {
    /// Database operation error (wraps sqlx::Error)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed JSON artifact or payload
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Outbound HTTP failure (Stripe, webhooks)
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Third-party service answered with an error (e.g. Stripe 4xx)
    #[error("Upstream error ({status}): {message}")]
    Upstream { status: u16, message: String },

    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Requested resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invalid user input or request parameter
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}
