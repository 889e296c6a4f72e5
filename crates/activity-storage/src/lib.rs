//! # Activity Storage
//!
//! Durable storage for activity file generation.
//!
//! ## Features
//!
//! - **CommitLog trait**: Append / scan / wait-for-commit contract of the audit log
//! - **AppendLog**: File-backed append-only log with torn-tail recovery
//! - **InMemoryLog**: In-memory log with identical addressing, for tests and simulation
//! - **CounterStore**: Durable file counter replaced atomically on every save
//!
//! ## Example
//!
//! ```rust,ignore
//! use activity_storage::{CommitLog, InMemoryLog};
//!
//! #[tokio::main]
//! async fn main() {
//!     let log = InMemoryLog::new();
//!
//!     let address = log.append(b"2024-01-01T00:00:00.000|TIME|DEV|").await.unwrap();
//!     log.commit().await.unwrap();
//!
//!     let records = log.scan_from(address).await.unwrap();
//!     assert_eq!(records.len(), 1);
//! }
//! ```

pub mod append_log;
pub mod counter_store;
pub mod error;

// Re-exports
pub use append_log::{AppendLog, AppendLogConfig, FRAME_HEADER_LEN, InMemoryLog, LogRecord};
pub use counter_store::CounterStore;
pub use error::StorageError;

use async_trait::async_trait;

/// Contract of the durable append-only log events are read from
///
/// Addresses are byte offsets: a record appended at address `a` with a
/// payload of `n` bytes is followed by the next record at `a + 4 + n`.
/// Appended records only become visible to [`scan_from`](Self::scan_from)
/// once they are committed.
#[async_trait]
pub trait CommitLog: Send + Sync {
    /// Append a record, returning its address
    async fn append(&self, payload: &[u8]) -> Result<u64, StorageError>;

    /// Make every appended record durable and visible to readers
    ///
    /// Returns the new committed address.
    async fn commit(&self) -> Result<u64, StorageError>;

    /// Committed records starting at `address`, in log order
    ///
    /// Implementations may return fewer records than are available to bound
    /// the size of a single scan; an empty result means the reader has
    /// caught up with the committed tail.
    async fn scan_from(&self, address: u64) -> Result<Vec<LogRecord>, StorageError>;

    /// Suspend until the log has committed at least up to `address`
    async fn wait_for_commit(&self, address: u64) -> Result<(), StorageError>;

    /// End of the committed region
    fn committed_until(&self) -> u64;

    /// End of the appended region, committed or not
    fn tail_address(&self) -> u64;
}
