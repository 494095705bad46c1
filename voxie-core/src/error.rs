//! Error types for voxie-core.

use thiserror::Error;

/// Result type alias for voxie operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error types for voxie operations.
#[derive(Error, Debug)]
pub enum Error {
    /// The enclosing operation was cancelled.
    #[error("operation cancelled")]
    Cancelled,

    /// Configuration error.
    #[error("configuration error: {0}")]
    ConfigError(String),

    /// A progress report could not be delivered.
    #[error("progress report failed: {0}")]
    ProgressReport(String),
}
