//! File-backed append-only log

use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use bytes::Bytes;
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt, BufReader, BufWriter};
use tokio::sync::{Mutex, watch};
use tracing::{debug, info, instrument, trace, warn};

use super::{FRAME_HEADER_LEN, LogRecord, frame_len};
use crate::CommitLog;
use crate::error::StorageError;

/// Configuration for an append log
#[derive(Debug, Clone)]
pub struct AppendLogConfig {
    /// Path of the log file
    pub path: PathBuf,
    /// Commit after every append instead of on explicit `commit()`
    pub commit_on_append: bool,
    /// Largest accepted payload
    pub max_entry_size: usize,
    /// Soft limit on the bytes returned by one scan
    pub scan_chunk_bytes: usize,
}

impl Default for AppendLogConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("./data/logs/audit.log"),
            commit_on_append: false,
            max_entry_size: 10 * 1024 * 1024, // 10MB
            scan_chunk_bytes: 4 * 1024 * 1024, // 4MB
        }
    }
}

impl AppendLogConfig {
    /// Log for `stream` stored as `<dir>/<stream>.log`
    pub fn for_stream(dir: impl AsRef<Path>, stream: &str) -> Self {
        Self {
            path: dir.as_ref().join(format!("{stream}.log")),
            ..Default::default()
        }
    }

    /// Commit after every append
    pub fn with_commit_on_append(mut self, enabled: bool) -> Self {
        self.commit_on_append = enabled;
        self
    }

    /// Set the soft scan limit
    pub fn with_scan_chunk_bytes(mut self, bytes: usize) -> Self {
        self.scan_chunk_bytes = bytes;
        self
    }
}

struct Writer {
    file: BufWriter<File>,
    tail: u64,
}

/// Append-only log stored in a single file
///
/// Everything present on disk when the log is opened counts as committed.
/// A torn record at the end of the file (from a crash mid-append) is
/// truncated away on open.
pub struct AppendLog {
    config: AppendLogConfig,
    writer: Mutex<Writer>,
    tail: AtomicU64,
    committed: watch::Sender<u64>,
}

impl AppendLog {
    /// Open or create the log file
    #[instrument(skip_all, fields(path = %config.path.display()))]
    pub async fn open(config: AppendLogConfig) -> Result<Self, StorageError> {
        if let Some(parent) = config.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&config.path)
            .await?;

        let file_size = file.metadata().await?.len();
        let valid_end = recover_tail(&file, file_size, config.max_entry_size).await?;

        if valid_end < file_size {
            warn!(
                valid_end = valid_end,
                file_size = file_size,
                "Truncating torn tail of append log"
            );
            file.set_len(valid_end).await?;
        }
        file.seek(SeekFrom::Start(valid_end)).await?;

        info!(tail = valid_end, "Opened append log");

        let (committed, _) = watch::channel(valid_end);
        Ok(Self {
            config,
            writer: Mutex::new(Writer {
                file: BufWriter::new(file),
                tail: valid_end,
            }),
            tail: AtomicU64::new(valid_end),
            committed,
        })
    }

    /// Path of the log file
    pub fn path(&self) -> &Path {
        &self.config.path
    }

    async fn commit_locked(&self, writer: &mut Writer) -> Result<u64, StorageError> {
        writer.file.flush().await?;
        writer.file.get_ref().sync_data().await?;

        let tail = writer.tail;
        self.committed.send_if_modified(|committed| {
            if *committed < tail {
                *committed = tail;
                true
            } else {
                false
            }
        });
        Ok(tail)
    }

    fn check_entry(&self, payload: &[u8]) -> Result<(), StorageError> {
        if payload.is_empty() {
            return Err(StorageError::invalid_entry("empty payload"));
        }
        if payload.len() > self.config.max_entry_size {
            return Err(StorageError::EntryTooLarge {
                size: payload.len(),
                max: self.config.max_entry_size,
            });
        }
        Ok(())
    }
}

#[async_trait]
impl CommitLog for AppendLog {
    async fn append(&self, payload: &[u8]) -> Result<u64, StorageError> {
        self.check_entry(payload)?;

        let mut writer = self.writer.lock().await;
        let address = writer.tail;

        writer
            .file
            .write_all(&(payload.len() as u32).to_be_bytes())
            .await?;
        writer.file.write_all(payload).await?;
        writer.tail += frame_len(payload.len());
        self.tail.store(writer.tail, Ordering::Release);

        if self.config.commit_on_append {
            self.commit_locked(&mut writer).await?;
        }

        trace!(address = address, len = payload.len(), "Appended record");
        Ok(address)
    }

    async fn commit(&self) -> Result<u64, StorageError> {
        let mut writer = self.writer.lock().await;
        let committed = self.commit_locked(&mut writer).await?;
        trace!(committed = committed, "Committed append log");
        Ok(committed)
    }

    async fn scan_from(&self, address: u64) -> Result<Vec<LogRecord>, StorageError> {
        let committed = self.committed_until();
        if address >= committed {
            return Ok(Vec::new());
        }

        let mut reader = BufReader::new(File::open(&self.config.path).await?);
        reader.seek(SeekFrom::Start(address)).await?;

        let mut records = Vec::new();
        let mut position = address;
        let mut scanned = 0u64;

        while position < committed && scanned < self.config.scan_chunk_bytes as u64 {
            let mut len_buf = [0u8; FRAME_HEADER_LEN as usize];
            reader.read_exact(&mut len_buf).await?;
            let len = u32::from_be_bytes(len_buf) as usize;

            if len == 0 || len > self.config.max_entry_size || position + frame_len(len) > committed
            {
                return Err(StorageError::corrupt(
                    position,
                    format!("invalid frame length {len}"),
                ));
            }

            let mut payload = vec![0u8; len];
            reader.read_exact(&mut payload).await?;
            records.push(LogRecord::new(position, Bytes::from(payload)));

            position += frame_len(len);
            scanned += frame_len(len);
        }

        Ok(records)
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

/// Walk the length prefixes of a log file, returning the end of the last
/// complete record
async fn recover_tail(
    file: &File,
    file_size: u64,
    max_entry_size: usize,
) -> Result<u64, StorageError> {
    let mut reader = BufReader::new(file.try_clone().await?);
    reader.seek(SeekFrom::Start(0)).await?;

    let mut offset = 0u64;
    let mut entries = 0usize;
    let mut scratch = Vec::new();

    while offset + FRAME_HEADER_LEN <= file_size {
        let mut len_buf = [0u8; FRAME_HEADER_LEN as usize];
        reader.read_exact(&mut len_buf).await?;
        let len = u32::from_be_bytes(len_buf) as usize;

        if len == 0 || len > max_entry_size || offset + frame_len(len) > file_size {
            warn!(offset = offset, len = len, "Invalid or torn entry, stopping replay");
            break;
        }

        scratch.resize(len, 0);
        reader.read_exact(&mut scratch).await?;

        offset += frame_len(len);
        entries += 1;
    }

    debug!(entries = entries, tail = offset, "Replayed append log");
    Ok(offset)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tempfile::TempDir;

    async fn create_test_log() -> (AppendLog, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let config = AppendLogConfig::for_stream(temp_dir.path(), "audit");
        let log = AppendLog::open(config).await.unwrap();
        (log, temp_dir)
    }

    #[tokio::test]
    async fn test_append_and_scan() {
        let (log, _temp) = create_test_log().await;

        let first = log.append(b"one").await.unwrap();
        let second = log.append(b"three").await.unwrap();
        assert_eq!(first, 0);
        assert_eq!(second, 7);
        assert_eq!(log.tail_address(), 16);

        // Nothing is visible before commit
        assert!(log.scan_from(0).await.unwrap().is_empty());

        assert_eq!(log.commit().await.unwrap(), 16);
        let records = log.scan_from(0).await.unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].payload, Bytes::from_static(b"one"));
        assert_eq!(records[1].address, 7);
        assert_eq!(records[1].next_address(), 16);

        let rest = log.scan_from(7).await.unwrap();
        assert_eq!(rest.len(), 1);
        assert!(log.scan_from(16).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_rejects_empty_and_oversized() {
        let temp_dir = TempDir::new().unwrap();
        let config = AppendLogConfig {
            path: temp_dir.path().join("small.log"),
            max_entry_size: 8,
            ..Default::default()
        };
        let log = AppendLog::open(config).await.unwrap();

        assert!(matches!(
            log.append(b"").await,
            Err(StorageError::InvalidEntry(_))
        ));
        assert!(matches!(
            log.append(b"123456789").await,
            Err(StorageError::EntryTooLarge { size: 9, max: 8 })
        ));
    }

    #[tokio::test]
    async fn test_commit_on_append() {
        let temp_dir = TempDir::new().unwrap();
        let config =
            AppendLogConfig::for_stream(temp_dir.path(), "audit").with_commit_on_append(true);
        let log = AppendLog::open(config).await.unwrap();

        log.append(b"visible").await.unwrap();
        assert_eq!(log.committed_until(), 11);
        assert_eq!(log.scan_from(0).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_scan_chunk_limit() {
        let temp_dir = TempDir::new().unwrap();
        let config =
            AppendLogConfig::for_stream(temp_dir.path(), "audit").with_scan_chunk_bytes(10);
        let log = AppendLog::open(config).await.unwrap();

        for _ in 0..5 {
            log.append(b"abcd").await.unwrap();
        }
        log.commit().await.unwrap();

        // 8-byte frames, 10-byte budget: two frames per scan
        let first = log.scan_from(0).await.unwrap();
        assert_eq!(first.len(), 2);
        let second = log.scan_from(first[1].next_address()).await.unwrap();
        assert_eq!(second.len(), 2);
        assert_eq!(second[0].address, 16);
    }

    #[tokio::test]
    async fn test_wait_for_commit_wakes_on_commit() {
        let (log, _temp) = create_test_log().await;
        let log = std::sync::Arc::new(log);

        let waiter = {
            let log = log.clone();
            tokio::spawn(async move { log.wait_for_commit(1).await })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        log.append(b"wake").await.unwrap();
        log.commit().await.unwrap();

        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn test_persistence_and_replay() {
        let temp_dir = TempDir::new().unwrap();
        let config = AppendLogConfig::for_stream(temp_dir.path(), "audit");

        {
            let log = AppendLog::open(config.clone()).await.unwrap();
            for i in 0..5 {
                log.append(format!("entry {i}").as_bytes()).await.unwrap();
            }
            log.commit().await.unwrap();
        }

        let log = AppendLog::open(config).await.unwrap();
        // Everything on disk is committed after reopen
        assert_eq!(log.committed_until(), 5 * 11);
        let records = log.scan_from(0).await.unwrap();
        assert_eq!(records.len(), 5);
        assert_eq!(records[4].payload, Bytes::from_static(b"entry 4"));

        // Appends continue after the replayed tail
        assert_eq!(log.append(b"entry 5").await.unwrap(), 55);
    }

    #[tokio::test]
    async fn test_torn_tail_is_truncated() {
        let temp_dir = TempDir::new().unwrap();
        let config = AppendLogConfig::for_stream(temp_dir.path(), "audit");

        {
            let log = AppendLog::open(config.clone()).await.unwrap();
            log.append(b"complete").await.unwrap();
            log.commit().await.unwrap();
        }

        // Simulate a crash in the middle of the next append
        {
            let mut file = OpenOptions::new()
                .append(true)
                .open(&config.path)
                .await
                .unwrap();
            file.write_all(&100u32.to_be_bytes()).await.unwrap();
            file.write_all(b"partial").await.unwrap();
            file.sync_all().await.unwrap();
        }

        let log = AppendLog::open(config.clone()).await.unwrap();
        assert_eq!(log.committed_until(), 12);
        let size = tokio::fs::metadata(&config.path).await.unwrap().len();
        assert_eq!(size, 12);
        assert_eq!(log.scan_from(0).await.unwrap().len(), 1);
    }
}
