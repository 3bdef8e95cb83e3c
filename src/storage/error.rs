//! Storage layer error types
//!
//! Defines all errors the index collaborator can surface to the analyzer.

use thiserror::Error;

/// Errors that can occur while reading or querying an index
#[derive(Error, Debug)]
pub enum StorageError {
    /// The index (or the table holding it) could not be reached or read
    #[error("Index unavailable: {0}")]
    IndexUnavailable(String),

    /// A header or series record failed to decode or verify
    #[error("Index corrupt: {0}")]
    IndexCorrupt(String),

    /// Label matcher could not be constructed
    #[error("Invalid matcher: {0}")]
    InvalidMatcher(String),

    /// Shard hint with a zero shard count
    #[error("Invalid shard: {shard} of {of}")]
    InvalidShard { shard: u32, of: u32 },

    /// The scan context was cancelled while the index was being read
    #[error("Scan cancelled")]
    Cancelled,
}

impl From<std::io::Error> for StorageError {
    fn from(err: std::io::Error) -> Self {
        StorageError::IndexUnavailable(err.to_string())
    }
}

impl From<bincode::Error> for StorageError {
    fn from(err: bincode::Error) -> Self {
        StorageError::IndexCorrupt(err.to_string())
    }
}

/// Result type alias for storage operations
pub type StorageResult<T> = Result<T, StorageError>;
