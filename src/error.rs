//! Application-wide error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("config error: {0}")]
    Config(String),

    #[error("logger error: {0}")]
    Logger(String),

    /// Read of a node id that does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// Underlying persistence failure (open, schema, statement, commit).
    #[error("storage error: {0}")]
    Storage(String),

    /// Search text that reached the index as malformed FTS5 syntax.
    #[error("query error: {0}")]
    Query(String),

    /// Background layout task panicked or was cancelled.
    #[error("layout error: {0}")]
    Layout(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
