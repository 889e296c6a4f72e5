//! Log tailing consumer
//!
//! Reads committed records from a [`CommitLog`] in strict log order, decodes
//! them and hands each value to a [`RecordHandler`]. The cursor only lives in
//! memory: every new tailer starts from the address it is given.

use std::sync::Arc;
use std::time::Duration;

use activity_core::Decode;
use activity_storage::CommitLog;
use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, trace, warn};

use crate::error::{GeneratorError, GeneratorResult};

/// Receiver of decoded log records
#[async_trait]
pub trait RecordHandler<T>: Send + Sync {
    /// Handle one decoded record found at `address`
    ///
    /// Returning [`GeneratorError::Cancelled`] stops the tailer; any other
    /// error is logged and the record is skipped.
    async fn handle(&self, item: T, address: String) -> GeneratorResult<()>;
}

/// Single reader following the committed tail of a log
pub struct LogTailer<L: ?Sized> {
    log: Arc<L>,
    poll_interval: Duration,
}

impl<L: CommitLog + ?Sized> LogTailer<L> {
    /// Create a tailer over `log`
    ///
    /// `poll_interval` bounds how long an idle tailer waits for a commit
    /// notification before rescanning.
    pub fn new(log: Arc<L>, poll_interval: Duration) -> Self {
        Self { log, poll_interval }
    }

    /// Follow the log from `start` until `cancel` fires
    ///
    /// The cursor advances past every scanned record whether or not it
    /// decodes and whether or not the handler succeeds. Returns the final
    /// cursor. The handler is consumed and dropped on return.
    #[instrument(skip(self, decoder, handler, cancel))]
    pub async fn tail<D, H>(
        &self,
        start: u64,
        decoder: &D,
        handler: H,
        cancel: &CancellationToken,
    ) -> GeneratorResult<u64>
    where
        D: Decode,
        H: RecordHandler<D::Item>,
    {
        let mut cursor = start;
        info!(cursor, "Tailer started");

        'scan: while !cancel.is_cancelled() {
            let records = tokio::select! {
                _ = cancel.cancelled() => break,
                scanned = self.log.scan_from(cursor) => scanned?,
            };

            if records.is_empty() {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    waited = tokio::time::timeout(
                        self.poll_interval,
                        self.log.wait_for_commit(cursor + 1),
                    ) => {
                        if let Ok(Err(e)) = waited {
                            return Err(e.into());
                        }
                    }
                }
                continue;
            }

            trace!(count = records.len(), cursor, "Scanned records");
            for record in records {
                cursor = record.next_address();

                let Some(item) = decoder.decode(&record.payload) else {
                    continue;
                };

                match handler.handle(item, record.address.to_string()).await {
                    Ok(()) => {}
                    Err(GeneratorError::Cancelled) => {
                        debug!(address = record.address, "Handler cancelled");
                        break 'scan;
                    }
                    Err(e) => {
                        warn!(address = record.address, error = %e, "Record handler failed, skipping");
                    }
                }
            }
        }

        info!(cursor, "Tailer stopped");
        Ok(cursor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use activity_storage::InMemoryLog;
    use std::sync::Mutex;

    /// Decoder that keeps payloads as strings and drops anything starting with '#'
    struct TextDecoder;

    impl Decode for TextDecoder {
        type Item = String;

        fn decode(&self, bytes: &[u8]) -> Option<String> {
            let text = std::str::from_utf8(bytes).ok()?;
            (!text.starts_with('#')).then(|| text.to_string())
        }
    }

    #[derive(Default)]
    struct Collect {
        seen: Arc<Mutex<Vec<(String, String)>>>,
        fail_on: Option<&'static str>,
        stop_after: Option<usize>,
    }

    #[async_trait]
    impl RecordHandler<String> for Collect {
        async fn handle(&self, item: String, address: String) -> GeneratorResult<()> {
            if self.fail_on == Some(item.as_str()) {
                return Err(GeneratorError::ChannelClosed("test".into()));
            }
            let mut seen = self.seen.lock().unwrap();
            seen.push((item, address));
            if self.stop_after == Some(seen.len()) {
                return Err(GeneratorError::Cancelled);
            }
            Ok(())
        }
    }

    async fn log_with(entries: &[&str]) -> Arc<InMemoryLog> {
        let log = Arc::new(InMemoryLog::new());
        for entry in entries {
            log.append(entry.as_bytes()).await.unwrap();
        }
        log.commit().await.unwrap();
        log
    }

    #[tokio::test]
    async fn test_cursor_skips_dropped_and_failed_records() {
        let log = log_with(&["a", "#comment", "bad", "b"]).await;
        let seen = Arc::new(Mutex::new(Vec::new()));
        let handler = Collect {
            seen: seen.clone(),
            fail_on: Some("bad"),
            stop_after: Some(2),
        };

        let tailer = LogTailer::new(log.clone(), Duration::from_millis(10));
        let cursor = tailer
            .tail(0, &TextDecoder, handler, &CancellationToken::new())
            .await
            .unwrap();

        let seen = seen.lock().unwrap().clone();
        // "a" at 0, "#comment" at 5, "bad" at 17, "b" at 24
        assert_eq!(
            seen,
            vec![("a".to_string(), "0".to_string()), ("b".to_string(), "24".to_string())]
        );
        assert_eq!(cursor, log.tail_address());
    }

    #[tokio::test]
    async fn test_uncommitted_records_wait_for_commit() {
        let log = Arc::new(InMemoryLog::new());
        let seen = Arc::new(Mutex::new(Vec::new()));
        let handler = Collect {
            seen: seen.clone(),
            stop_after: Some(1),
            ..Default::default()
        };

        let tail = {
            let log = log.clone();
            tokio::spawn(async move {
                // Long poll interval: only the commit notification can wake it
                let tailer = LogTailer::new(log, Duration::from_secs(30));
                tailer
                    .tail(0, &TextDecoder, handler, &CancellationToken::new())
                    .await
            })
        };

        log.append(b"late").await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(seen.lock().unwrap().is_empty());

        log.commit().await.unwrap();
        let cursor = tokio::time::timeout(Duration::from_secs(5), tail)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert_eq!(cursor, 8);
        assert_eq!(seen.lock().unwrap()[0].0, "late");
    }

    #[tokio::test]
    async fn test_cancel_stops_idle_tailer() {
        let log = log_with(&["only"]).await;
        let seen = Arc::new(Mutex::new(Vec::new()));
        let handler = Collect {
            seen: seen.clone(),
            ..Default::default()
        };
        let cancel = CancellationToken::new();

        let tail = {
            let cancel = cancel.clone();
            tokio::spawn(async move {
                let tailer = LogTailer::new(log, Duration::from_secs(30));
                tailer.tail(0, &TextDecoder, handler, &cancel).await
            })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        cancel.cancel();

        let cursor = tokio::time::timeout(Duration::from_secs(5), tail)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert_eq!(cursor, 8);
        assert_eq!(seen.lock().unwrap().len(), 1);
    }
}
