//! Error types for activity-storage
//!
//! This module defines the error types used throughout the storage crate.

use thiserror::Error;

/// Errors that can occur in storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    /// I/O error during storage operations
    #[error("I/O error: {0}")]
    Io(String),

    /// Log contents could not be framed at the given address
    #[error("Corrupt log at address {address}: {reason}")]
    Corrupt { address: u64, reason: String },

    /// Entry rejected before it reached the log
    #[error("Invalid entry: {0}")]
    InvalidEntry(String),

    /// Entry exceeds the configured maximum size
    #[error("Entry of {size} bytes exceeds the {max} byte limit")]
    EntryTooLarge { size: usize, max: usize },

    /// The log was closed while waiting on it
    #[error("Log closed")]
    Closed,
}

impl From<std::io::Error> for StorageError {
    fn from(err: std::io::Error) -> Self {
        StorageError::Io(err.to_string())
    }
}

impl StorageError {
    /// Create a new I/O error
    pub fn io(message: impl Into<String>) -> Self {
        Self::Io(message.into())
    }

    /// Create a new Corrupt error
    pub fn corrupt(address: u64, reason: impl Into<String>) -> Self {
        Self::Corrupt {
            address,
            reason: reason.into(),
        }
    }

    /// Create a new InvalidEntry error
    pub fn invalid_entry(message: impl Into<String>) -> Self {
        Self::InvalidEntry(message.into())
    }
}
