//! Audit event producer
//!
//! Front ends record device activity through an [`AuditLogger`]. Entries are
//! appended to the log by one background writer, which commits periodically
//! and once more when the logger is closed.

use std::sync::Arc;
use std::time::Duration;

use activity_core::{Event, EventType, format_entry};
use activity_storage::CommitLog;
use chrono::Utc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, warn};

use crate::error::{GeneratorError, GeneratorResult};

const WRITER_QUEUE_CAPACITY: usize = 1024;

/// Appends audit entries to a commit log
pub struct AuditLogger {
    tx: mpsc::Sender<String>,
    writer: JoinHandle<GeneratorResult<u64>>,
}

impl AuditLogger {
    /// Start a logger committing `log` every `commit_interval`
    pub fn new(log: Arc<dyn CommitLog>, commit_interval: Duration) -> Self {
        let (tx, rx) = mpsc::channel(WRITER_QUEUE_CAPACITY);
        let writer = tokio::spawn(run_writer(log, rx, commit_interval));
        Self { tx, writer }
    }

    /// A device asked for its manifest
    pub async fn log_manifest_request(&self, device_id: &str) -> GeneratorResult<()> {
        self.log(EventType::Manifest, device_id, "").await
    }

    /// A device downloaded `size` bytes of `file_id` starting at `offset`
    pub async fn log_download(
        &self,
        device_id: &str,
        file_id: &str,
        offset: u64,
        size: u64,
    ) -> GeneratorResult<()> {
        let data = format!("{file_id}:{offset}:{size}");
        self.log(EventType::Download, device_id, &data).await
    }

    /// A device synchronized its clock
    pub async fn log_time_sync(&self, device_id: &str) -> GeneratorResult<()> {
        self.log(EventType::Time, device_id, "").await
    }

    /// A device confirmed it received `file_id`
    pub async fn log_confirmation(&self, device_id: &str, file_id: &str) -> GeneratorResult<()> {
        self.log(EventType::Confirm, device_id, file_id).await
    }

    /// Record an event of any type, stamped with the current UTC time
    pub async fn log(
        &self,
        event_type: EventType,
        device_id: &str,
        data: &str,
    ) -> GeneratorResult<()> {
        let event = Event::new(Utc::now().naive_utc(), event_type, device_id, data);
        self.log_event(&event).await
    }

    /// Record a fully formed event
    pub async fn log_event(&self, event: &Event) -> GeneratorResult<()> {
        self.tx
            .send(format_entry(event))
            .await
            .map_err(|_| GeneratorError::ChannelClosed("audit writer".into()))
    }

    /// Flush pending entries, commit and stop the writer
    ///
    /// Returns the number of entries appended over the logger's lifetime.
    pub async fn close(self) -> GeneratorResult<u64> {
        drop(self.tx);
        self.writer.await?
    }
}

async fn run_writer(
    log: Arc<dyn CommitLog>,
    mut entries: mpsc::Receiver<String>,
    commit_interval: Duration,
) -> GeneratorResult<u64> {
    let mut commits = tokio::time::interval_at(Instant::now() + commit_interval, commit_interval);
    commits.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut appended = 0u64;
    let mut dirty = false;

    loop {
        tokio::select! {
            entry = entries.recv() => match entry {
                Some(line) => match log.append(line.as_bytes()).await {
                    Ok(address) => {
                        appended += 1;
                        dirty = true;
                        debug!(address, "Audit entry appended");
                    }
                    Err(e) => warn!(error = %e, "Dropping audit entry"),
                },
                None => break,
            },
            _ = commits.tick() => {
                if dirty {
                    log.commit().await?;
                    dirty = false;
                }
            }
        }
    }

    log.commit().await?;
    Ok(appended)
}

#[cfg(test)]
mod tests {
    use super::*;
    use activity_core::parse_entry;
    use activity_storage::InMemoryLog;

    async fn entries(log: &InMemoryLog) -> Vec<Event> {
        log.scan_from(0)
            .await
            .unwrap()
            .iter()
            .map(|r| parse_entry(&r.payload).unwrap())
            .collect()
    }

    #[tokio::test]
    async fn test_helpers_format_data_field() {
        let log = Arc::new(InMemoryLog::new());
        let logger = AuditLogger::new(log.clone(), Duration::from_secs(60));

        logger.log_manifest_request("DEV-1").await.unwrap();
        logger.log_download("DEV-1", "firmware", 4096, 512).await.unwrap();
        logger.log_time_sync("DEV-2").await.unwrap();
        logger.log_confirmation("DEV-1", "firmware").await.unwrap();
        assert_eq!(logger.close().await.unwrap(), 4);

        let events = entries(&log).await;
        let summary: Vec<_> = events
            .iter()
            .map(|e| (e.event_type.clone(), e.device_id.as_str(), e.data.as_str()))
            .collect();
        assert_eq!(
            summary,
            vec![
                (EventType::Manifest, "DEV-1", ""),
                (EventType::Download, "DEV-1", "firmware:4096:512"),
                (EventType::Time, "DEV-2", ""),
                (EventType::Confirm, "DEV-1", "firmware"),
            ]
        );
    }

    #[tokio::test]
    async fn test_close_commits_pending_entries() {
        let log = Arc::new(InMemoryLog::new());
        let logger = AuditLogger::new(log.clone(), Duration::from_secs(3600));

        logger.log(EventType::Other("REBOOT".into()), "DEV", "x").await.unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(log.committed_until(), 0);

        logger.close().await.unwrap();
        assert_eq!(log.committed_until(), log.tail_address());
        assert_eq!(entries(&log).await[0].event_type.as_str(), "REBOOT");
    }

    #[tokio::test(start_paused = true)]
    async fn test_periodic_commit() {
        let log = Arc::new(InMemoryLog::new());
        let logger = AuditLogger::new(log.clone(), Duration::from_secs(1));

        logger.log_time_sync("DEV").await.unwrap();
        tokio::time::sleep(Duration::from_millis(1500)).await;
        assert!(log.committed_until() > 0);

        logger.close().await.unwrap();
    }
}
