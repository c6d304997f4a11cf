//! Cache error types.

use thiserror::Error;

/// Cache error type.
#[derive(Error, Debug)]
pub enum CacheError {
    /// SQLite error
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Migration error
    #[error("Migration error: {0}")]
    Migration(String),

    /// Cache was never opened or has been closed
    #[error("Cache is not ready")]
    NotReady,

    /// Invalid data error
    #[error("Invalid data: {0}")]
    InvalidData(String),
}

/// Result type alias using CacheError.
pub type CacheResult<T> = Result<T, CacheError>;
