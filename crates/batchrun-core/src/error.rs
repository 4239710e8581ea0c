//! Error types for the batchrun core library.

use thiserror::Error;

/// Result type alias using the batchrun [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// Core error types for batchrun operations.
#[derive(Debug, Error)]
pub enum Error {
    /// The process could not be started. The pool is left untouched.
    #[error("Failed to launch `{command_line}`: {source}")]
    Launch {
        command_line: String,
        #[source]
        source: std::io::Error,
    },

    /// Concurrency ceiling below 1.
    #[error("Invalid capacity {0}: must be at least 1")]
    InvalidCapacity(usize),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
