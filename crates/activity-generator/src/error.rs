//! Error types for the activity generator

use activity_core::CodecError;
use activity_storage::StorageError;
use thiserror::Error;

/// Errors that can occur while generating activity files
#[derive(Debug, Error)]
pub enum GeneratorError {
    /// Log or counter storage error
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// Encoding or naming error
    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),

    /// IO error
    #[error("IO error: {0}")]
    Io(String),

    /// The target file name already exists in the output directory
    ///
    /// Happens when a previous run published the file but stopped before
    /// saving the counter.
    #[error("Activity file already published: {file_name}")]
    AlreadyPublished { file_name: String },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// A downstream stage stopped receiving
    #[error("Channel closed: {0}")]
    ChannelClosed(String),

    /// A pipeline task panicked or was aborted
    #[error("Pipeline stage failed: {0}")]
    StageFailed(String),

    /// Orderly shutdown was requested
    #[error("Operation cancelled")]
    Cancelled,
}

impl GeneratorError {
    /// Whether this error only reports cooperative cancellation
    pub fn is_cancelled(&self) -> bool {
        matches!(self, GeneratorError::Cancelled)
    }

    /// Create a new configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }
}

impl From<std::io::Error> for GeneratorError {
    fn from(e: std::io::Error) -> Self {
        GeneratorError::Io(e.to_string())
    }
}

impl From<toml::de::Error> for GeneratorError {
    fn from(e: toml::de::Error) -> Self {
        GeneratorError::Config(e.to_string())
    }
}

impl From<tokio::task::JoinError> for GeneratorError {
    fn from(e: tokio::task::JoinError) -> Self {
        GeneratorError::StageFailed(e.to_string())
    }
}

/// Result type alias for generator operations
pub type GeneratorResult<T> = Result<T, GeneratorError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancelled_is_not_a_fault() {
        assert!(GeneratorError::Cancelled.is_cancelled());
        assert!(!GeneratorError::ChannelClosed("ingest".into()).is_cancelled());
    }

    #[test]
    fn test_already_published_names_file() {
        let err = GeneratorError::AlreadyPublished {
            file_name: "SCTD_API------------AFE0006.BIN".into(),
        };
        assert!(err.to_string().contains("AFE0006.BIN"));
    }

    #[test]
    fn test_storage_error_conversion() {
        let err: GeneratorError = StorageError::Closed.into();
        assert!(matches!(err, GeneratorError::Storage(StorageError::Closed)));
    }
}
