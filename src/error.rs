//! Error types for playsync

use thiserror::Error;

/// Crate-wide result type
pub type Result<T> = std::result::Result<T, Error>;

/// Error taxonomy for the sync pipeline
#[derive(Debug, Error)]
pub enum Error {
    /// Database operation error (wraps sqlx::Error)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error (wraps serde_json::Error)
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Requested resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invalid user input or request parameter
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Transient upstream error (network, rate limit, 5xx); retried with
    /// bounded backoff at the call site before a phase is marked failed
    #[error("Upstream error: {0}")]
    Upstream(String),

    /// Persisted state violates a pipeline invariant; fatal, since further
    /// processing could compound the damage
    #[error("Integrity violation: {0}")]
    Integrity(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// True for errors worth retrying at the call site
    pub fn is_transient(&self) -> bool {
        matches!(self, Error::Upstream(_))
    }
}
