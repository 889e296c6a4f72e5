//! In-memory commit log
//!
//! Uses the same addressing and commit semantics as the file-backed log,
//! suitable for testing and simulation environments.

use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::{RwLock, watch};
use tracing::trace;

use super::{LogRecord, frame_len};
use crate::CommitLog;
use crate::error::StorageError;

/// Default soft limit on the bytes returned by one scan
const DEFAULT_SCAN_CHUNK_BYTES: u64 = 1024 * 1024;

/// In-memory implementation of [`CommitLog`]
#[derive(Debug)]
pub struct InMemoryLog {
    /// Every appended record, committed or not, in address order
    records: RwLock<Vec<LogRecord>>,
    tail: AtomicU64,
    committed: watch::Sender<u64>,
    commit_on_append: bool,
    scan_chunk_bytes: u64,
}

impl Default for InMemoryLog {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryLog {
    /// Create an empty log that requires explicit commits
    pub fn new() -> Self {
        let (committed, _) = watch::channel(0);
        Self {
            records: RwLock::new(Vec::new()),
            tail: AtomicU64::new(0),
            committed,
            commit_on_append: false,
            scan_chunk_bytes: DEFAULT_SCAN_CHUNK_BYTES,
        }
    }

    /// Create an empty log that commits every append immediately
    pub fn auto_commit() -> Self {
        Self {
            commit_on_append: true,
            ..Self::new()
        }
    }

    /// Set the soft scan limit
    pub fn with_scan_chunk_bytes(mut self, bytes: u64) -> Self {
        self.scan_chunk_bytes = bytes;
        self
    }

    /// Number of appended records
    pub async fn record_count(&self) -> usize {
        self.records.read().await.len()
    }

    fn publish_commit(&self, tail: u64) {
        self.committed.send_if_modified(|committed| {
            if *committed < tail {
                *committed = tail;
                true
            } else {
                false
            }
        });
    }
}

#[async_trait]
impl CommitLog for InMemoryLog {
    async fn append(&self, payload: &[u8]) -> Result<u64, StorageError> {
        if payload.is_empty() {
            return Err(StorageError::invalid_entry("empty payload"));
        }

        let mut records = self.records.write().await;
        let address = self.tail.load(Ordering::Acquire);
        records.push(LogRecord::new(address, Bytes::copy_from_slice(payload)));

        let tail = address + frame_len(payload.len());
        self.tail.store(tail, Ordering::Release);
        if self.commit_on_append {
            self.publish_commit(tail);
        }

        trace!(address = address, len = payload.len(), "Appended record");
        Ok(address)
    }

    async fn commit(&self) -> Result<u64, StorageError> {
        // Hold the write lock so no append slips between load and publish
        let _records = self.records.write().await;
        let tail = self.tail.load(Ordering::Acquire);
        self.publish_commit(tail);
        Ok(tail)
    }

    async fn scan_from(&self, address: u64) -> Result<Vec<LogRecord>, StorageError> {
        let committed = self.committed_until();
        let records = self.records.read().await;

        let start = records.partition_point(|r| r.address < address);
        let mut scanned = 0u64;
        let mut out = Vec::new();
        for record in records[start..].iter() {
            if record.address >= committed || scanned >= self.scan_chunk_bytes {
                break;
            }
            scanned += frame_len(record.len());
            out.push(record.clone());
        }
        Ok(out)
    }

    async fn wait_for_commit(&self, address: u64) -> Result<(), StorageError> {
        let mut rx = self.committed.subscribe();
        rx.wait_for(|committed| *committed >= address)
            .await
            .map(|_| ())
            .map_err(|_| StorageError::Closed)
    }

    fn committed_until(&self) -> u64 {
        *self.committed.borrow()
    }

    fn tail_address(&self) -> u64 {
        self.tail.load(Ordering::Acquire)
    }
}
