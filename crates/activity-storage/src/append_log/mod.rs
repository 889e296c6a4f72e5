//! Append-only commit log storage
//!
//! Records are written sequentially and can only be appended, never
//! modified. A record is addressed by the byte offset of its frame.
//!
//! ## Storage Format
//!
//! Each log file contains length-prefixed payloads:
//! ```text
//! [4 bytes: len (u32 BE)][len bytes: payload][4 bytes: len][...]
//! ```

mod file_log;
mod memory;

pub use file_log::{AppendLog, AppendLogConfig};
pub use memory::InMemoryLog;

use bytes::Bytes;

/// Size of the length prefix in front of every payload
pub const FRAME_HEADER_LEN: u64 = 4;

/// A committed record read back from the log
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogRecord {
    /// Address of the record's frame
    pub address: u64,
    /// Raw payload bytes
    pub payload: Bytes,
}

impl LogRecord {
    pub fn new(address: u64, payload: Bytes) -> Self {
        Self { address, payload }
    }

    /// Payload length in bytes
    pub fn len(&self) -> usize {
        self.payload.len()
    }

    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }

    /// Address of the record that follows this one
    pub fn next_address(&self) -> u64 {
        self.address + frame_len(self.payload.len())
    }
}

/// Bytes a payload of `len` occupies in the log
pub(crate) fn frame_len(len: usize) -> u64 {
    FRAME_HEADER_LEN + len as u64
}
