//! Configuration for the activity generator

use std::path::{Path, PathBuf};
use std::time::Duration;

use activity_core::SiteId;
use activity_logging::LogConfig;
use serde::{Deserialize, Serialize};

use crate::error::{GeneratorError, GeneratorResult};

/// Configuration for an [`ActivityGenerator`](crate::ActivityGenerator)
///
/// Every field has a default, so a TOML file only needs to list the values
/// it changes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneratorConfig {
    /// Directory published activity files land in
    pub output_dir: PathBuf,
    /// Directory files are written to before publishing
    ///
    /// Must be on the same filesystem as `output_dir`.
    pub staging_dir: PathBuf,
    /// Path of the durable counter file
    pub counter_file: PathBuf,
    /// Site field embedded in every file name
    pub site_id: SiteId,
    /// Maximum number of events per file
    pub max_batch_size: usize,
    /// Seconds after which a partially filled batch is flushed
    pub flush_interval_secs: u64,
    /// Name of the audit stream; the log file is `<log_dir>/<stream>.log`
    pub stream: String,
    /// Directory holding the append-only log
    pub log_dir: PathBuf,
    /// Fallback delay between scans when no commit arrives
    pub poll_interval_ms: u64,
    /// Capacity of the queue in front of the materializer
    pub materializer_queue_capacity: usize,
    /// Capacity of the queue in front of the completion sink
    pub sink_queue_capacity: usize,
    /// Upper bound on the graceful drain at shutdown
    pub drain_timeout_secs: u64,
    /// How often the audit producer commits the log
    pub commit_interval_ms: u64,
    /// Logging configuration
    pub logging: LogConfig,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self::with_data_dir("./activity-data")
    }
}

impl GeneratorConfig {
    /// Create a configuration with every directory under `data_dir`
    pub fn with_data_dir(data_dir: impl Into<PathBuf>) -> Self {
        let data_dir = data_dir.into();
        Self {
            output_dir: data_dir.join("output"),
            staging_dir: data_dir.join("staging"),
            counter_file: data_dir.join("counter.dat"),
            site_id: SiteId::default(),
            max_batch_size: 10_000,
            flush_interval_secs: 60,
            stream: "audit".to_string(),
            log_dir: data_dir.join("log"),
            poll_interval_ms: 100,
            materializer_queue_capacity: 10,
            sink_queue_capacity: 64,
            drain_timeout_secs: 30,
            commit_interval_ms: 1_000,
            logging: LogConfig::default(),
        }
    }

    /// Parse a configuration from TOML text
    pub fn from_toml_str(text: &str) -> GeneratorResult<Self> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a configuration from a TOML file
    pub fn load(path: impl AsRef<Path>) -> GeneratorResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            GeneratorError::config(format!("cannot read {}: {e}", path.display()))
        })?;
        Self::from_toml_str(&text)
    }

    /// Check the values the pipeline cannot run with
    pub fn validate(&self) -> GeneratorResult<()> {
        if self.max_batch_size == 0 {
            return Err(GeneratorError::config("max_batch_size must be at least 1"));
        }
        if self.flush_interval_secs == 0 {
            return Err(GeneratorError::config("flush_interval_secs must be at least 1"));
        }
        if self.materializer_queue_capacity == 0 || self.sink_queue_capacity == 0 {
            return Err(GeneratorError::config("queue capacities must be at least 1"));
        }
        if self.poll_interval_ms == 0 || self.commit_interval_ms == 0 {
            return Err(GeneratorError::config(
                "poll_interval_ms and commit_interval_ms must be at least 1",
            ));
        }
        if self.stream.is_empty() || self.stream.contains(['/', '\\']) {
            return Err(GeneratorError::config(format!(
                "invalid stream name {:?}",
                self.stream
            )));
        }
        Ok(())
    }

    /// Path of the append-only log for the configured stream
    pub fn log_path(&self) -> PathBuf {
        self.log_dir.join(format!("{}.log", self.stream))
    }

    pub fn flush_interval(&self) -> Duration {
        Duration::from_secs(self.flush_interval_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn drain_timeout(&self) -> Duration {
        Duration::from_secs(self.drain_timeout_secs)
    }

    pub fn commit_interval(&self) -> Duration {
        Duration::from_millis(self.commit_interval_ms)
    }

    /// Set the output directory
    pub fn with_output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = dir.into();
        self
    }

    /// Set the staging directory
    pub fn with_staging_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.staging_dir = dir.into();
        self
    }

    /// Set the counter file path
    pub fn with_counter_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.counter_file = path.into();
        self
    }

    /// Set the site identifier
    pub fn with_site_id(mut self, site_id: SiteId) -> Self {
        self.site_id = site_id;
        self
    }

    /// Set the maximum batch size
    pub fn with_max_batch_size(mut self, size: usize) -> Self {
        self.max_batch_size = size;
        self
    }

    /// Set the flush interval in seconds
    pub fn with_flush_interval_secs(mut self, secs: u64) -> Self {
        self.flush_interval_secs = secs;
        self
    }

    /// Set the stream name
    pub fn with_stream(mut self, stream: impl Into<String>) -> Self {
        self.stream = stream.into();
        self
    }

    /// Set the poll interval in milliseconds
    pub fn with_poll_interval_ms(mut self, ms: u64) -> Self {
        self.poll_interval_ms = ms;
        self
    }

    /// Set the drain timeout in seconds
    pub fn with_drain_timeout_secs(mut self, secs: u64) -> Self {
        self.drain_timeout_secs = secs;
        self
    }

    /// Set the logging configuration
    pub fn with_logging(mut self, logging: LogConfig) -> Self {
        self.logging = logging;
        self
    }
}
