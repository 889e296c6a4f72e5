//! Activity generator service
//!
//! Couples a [`LogTailer`] over the audit stream to a [`Pipeline`] and runs
//! them until shutdown is requested or a stage fails.

use std::sync::Arc;

use activity_core::WireDecoder;
use activity_storage::{AppendLog, AppendLogConfig, CommitLog, CounterStore};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument};

use crate::config::GeneratorConfig;
use crate::error::GeneratorResult;
use crate::materializer::FileMaterializer;
use crate::pipeline::{DrainOutcome, Pipeline, PipelineSettings};
use crate::tailer::LogTailer;

/// Service turning an audit log into activity files
pub struct ActivityGenerator {
    config: GeneratorConfig,
    log: Arc<dyn CommitLog>,
    materializer: FileMaterializer,
}

impl ActivityGenerator {
    /// Create a generator reading from `log`
    pub fn new(config: GeneratorConfig, log: Arc<dyn CommitLog>) -> GeneratorResult<Self> {
        config.validate()?;
        let counter_store = Arc::new(CounterStore::new(&config.counter_file));
        let materializer = FileMaterializer::new(
            &config.output_dir,
            &config.staging_dir,
            config.site_id.clone(),
            counter_store,
        );
        Ok(Self {
            config,
            log,
            materializer,
        })
    }

    /// Open the file-backed log for the configured stream and create a generator over it
    pub async fn open(config: GeneratorConfig) -> GeneratorResult<Self> {
        let log = AppendLog::open(AppendLogConfig::for_stream(&config.log_dir, &config.stream)).await?;
        Self::new(config, Arc::new(log))
    }

    pub fn config(&self) -> &GeneratorConfig {
        &self.config
    }

    /// The log events are read from
    pub fn log(&self) -> &Arc<dyn CommitLog> {
        &self.log
    }

    /// Create every directory the pipeline writes to
    pub async fn prepare(&self) -> GeneratorResult<()> {
        self.materializer.prepare().await?;
        info!(
            output = %self.config.output_dir.display(),
            staging = %self.config.staging_dir.display(),
            counter = %self.config.counter_file.display(),
            "Directories ready"
        );
        Ok(())
    }

    /// Run until `shutdown` is cancelled or a stage fails
    ///
    /// The log is always tailed from address 0, so every run replays the
    /// whole stream. A tailer or materializer failure is returned after the
    /// remaining stages have drained.
    #[instrument(skip_all, fields(stream = %self.config.stream))]
    pub async fn run(&self, shutdown: CancellationToken) -> GeneratorResult<DrainOutcome> {
        self.prepare().await?;

        let cancel = shutdown.child_token();
        let pipeline = Pipeline::start(
            PipelineSettings::from(&self.config),
            self.materializer.clone(),
            cancel.clone(),
        );

        let tail_task = {
            let tailer = LogTailer::new(self.log.clone(), self.config.poll_interval());
            let handler = pipeline.ingest_handler();
            let cancel = cancel.clone();
            tokio::spawn(async move {
                let result = tailer.tail(0, &WireDecoder, handler, &cancel).await;
                if result.is_err() {
                    cancel.cancel();
                }
                result
            })
        };

        cancel.cancelled().await;
        if shutdown.is_cancelled() {
            info!("Shutdown requested, draining pipeline");
        }

        let tailed = tail_task.await?;
        let outcome = pipeline.shutdown().await?;
        let cursor = tailed.inspect_err(|e| error!(error = %e, "Tailer failed"))?;

        info!(cursor, ?outcome, "Activity generator stopped");
        Ok(outcome)
    }
}
