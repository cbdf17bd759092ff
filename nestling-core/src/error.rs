//! Error types for the Nestling core library.

use thiserror::Error;

/// Failure reported by a [`SnapshotStore`](crate::persistence::SnapshotStore).
///
/// Storage errors are recoverable: the persistence coordinator keeps the
/// pending changes that failed to write and retries them on the next flush.
#[derive(Error, Debug)]
pub enum StorageError {
    /// SQLite failure.
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// A stored value could not be encoded or decoded.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// A partial write was attempted before the singleton row existed.
    #[error("Companion state has not been seeded")]
    NotSeeded,

    /// The backing store refused the write (used by in-process stores).
    #[error("Storage unavailable: {0}")]
    Unavailable(String),
}

/// Top-level error type for all Nestling operations.
#[derive(Error, Debug)]
pub enum NestlingError {
    /// Configuration is invalid. Raised at startup, never during play.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Persistence failure.
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// The persistence coordinator was used outside a tokio runtime.
    #[error("No async runtime available: {0}")]
    Runtime(String),

    /// Generic I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience Result type alias.
pub type Result<T> = std::result::Result<T, NestlingError>;
