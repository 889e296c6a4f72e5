//! Error types for activity-core

use thiserror::Error;

/// Errors raised while parsing or encoding activity data
#[derive(Debug, Error)]
pub enum CodecError {
    /// Log entry was not valid UTF-8
    #[error("Entry is not valid UTF-8: {0}")]
    InvalidUtf8(#[from] std::str::Utf8Error),

    /// Log entry did not contain the four pipe-separated fields
    #[error("Expected 4 fields, found {found}")]
    MissingFields { found: usize },

    /// Timestamp did not match `yyyy-MM-ddTHH:mm:ss.fff`
    #[error("Invalid timestamp '{value}': {reason}")]
    InvalidTimestamp { value: String, reason: String },

    /// Binary record was shorter than a full record
    #[error("Truncated record: expected {expected} bytes, got {actual}")]
    TruncatedRecord { expected: usize, actual: usize },

    /// Binary record did not start with the NC tag
    #[error("Invalid record tag: {0:?}")]
    InvalidTag([u8; 2]),

    /// Binary record declared an unexpected length
    #[error("Invalid record length: {0}")]
    InvalidLength(u16),

    /// Binary record carried an impossible date or time
    #[error("Invalid record date: {0}")]
    InvalidDate(String),

    /// Site identifier is not usable in a file name
    #[error("Invalid site id '{0}'")]
    InvalidSiteId(String),

    /// Date precedes the reference date used for file naming
    #[error("Date {0} precedes the 1987-01-01 reference date")]
    DateBeforeReference(chrono::NaiveDate),
}

impl CodecError {
    /// Create a new InvalidTimestamp error
    pub fn invalid_timestamp(value: impl Into<String>, reason: impl ToString) -> Self {
        Self::InvalidTimestamp {
            value: value.into(),
            reason: reason.to_string(),
        }
    }
}
