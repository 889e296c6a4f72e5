//! Staged batching pipeline
//!
//! ```text
//!  tailer ──A──▶ batcher ──B──▶ materializer ──C──▶ sink
//! ```
//!
//! Every arrow is a bounded channel, so a slow materializer eventually
//! suspends the tailer. Closing the ingest channel cascades completion down
//! the stages. A materializer failure cancels the shared token, which stops
//! the tailer, and is returned from [`Pipeline::shutdown`].

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use activity_core::{Batch, Event};
use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, trace, warn};

use crate::batcher::{Batcher, IntervalTicker, Ticker};
use crate::config::GeneratorConfig;
use crate::error::{GeneratorError, GeneratorResult};
use crate::materializer::FileMaterializer;
use crate::tailer::RecordHandler;

/// Sizing and timing of the pipeline stages
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub max_batch_size: usize,
    pub flush_interval: Duration,
    pub materializer_queue_capacity: usize,
    pub sink_queue_capacity: usize,
    pub drain_timeout: Duration,
}

impl PipelineSettings {
    /// Ingest queue capacity: twice the batch size
    pub fn ingest_queue_capacity(&self) -> usize {
        self.max_batch_size.saturating_mul(2).max(1)
    }
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self::from(&GeneratorConfig::default())
    }
}

impl From<&GeneratorConfig> for PipelineSettings {
    fn from(config: &GeneratorConfig) -> Self {
        Self {
            max_batch_size: config.max_batch_size,
            flush_interval: config.flush_interval(),
            materializer_queue_capacity: config.materializer_queue_capacity,
            sink_queue_capacity: config.sink_queue_capacity,
            drain_timeout: config.drain_timeout(),
        }
    }
}

/// A file handed to the completion sink
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Published {
    pub file_name: String,
    pub events: usize,
}

/// Counters maintained by the completion sink
#[derive(Debug, Default)]
pub struct PipelineStats {
    files: AtomicU64,
    events: AtomicU64,
}

impl PipelineStats {
    pub fn published_files(&self) -> u64 {
        self.files.load(Ordering::Relaxed)
    }

    pub fn published_events(&self) -> u64 {
        self.events.load(Ordering::Relaxed)
    }

    fn record(&self, published: &Published) {
        self.files.fetch_add(1, Ordering::Relaxed);
        self.events.fetch_add(published.events as u64, Ordering::Relaxed);
    }
}

/// How a shutdown ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrainOutcome {
    /// Every stage finished with its queue empty
    Drained,
    /// The drain timeout elapsed and the remaining stages were abandoned
    TimedOut,
}

/// Producer side of the ingest queue
///
/// Sending suspends while the queue is full and fails fast with
/// [`GeneratorError::Cancelled`] once the pipeline token is cancelled.
#[derive(Debug, Clone)]
pub struct IngestHandler {
    tx: mpsc::Sender<Event>,
    cancel: CancellationToken,
}

impl IngestHandler {
    /// Enqueue one event
    pub async fn submit(&self, event: Event) -> GeneratorResult<()> {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(GeneratorError::Cancelled),
            sent = self.tx.send(event) => {
                sent.map_err(|_| GeneratorError::ChannelClosed("ingest queue".into()))
            }
        }
    }
}

#[async_trait]
impl RecordHandler<Event> for IngestHandler {
    async fn handle(&self, event: Event, address: String) -> GeneratorResult<()> {
        trace!(address = %address, device = %event.device_id, "Ingesting event");
        self.submit(event).await
    }
}

/// Running pipeline
pub struct Pipeline {
    ingest: mpsc::Sender<Event>,
    flush: mpsc::Sender<()>,
    cancel: CancellationToken,
    stats: Arc<PipelineStats>,
    drain_timeout: Duration,
    batcher: JoinHandle<GeneratorResult<u64>>,
    materializer: JoinHandle<GeneratorResult<u64>>,
    sink: JoinHandle<()>,
}

impl Pipeline {
    /// Start the stages with an interval ticker
    pub fn start(
        settings: PipelineSettings,
        materializer: FileMaterializer,
        cancel: CancellationToken,
    ) -> Self {
        let ticker = IntervalTicker::new(settings.flush_interval);
        Self::start_with_ticker(settings, materializer, ticker, cancel)
    }

    /// Start the stages with a caller-supplied ticker
    pub fn start_with_ticker<T: Ticker + 'static>(
        settings: PipelineSettings,
        materializer: FileMaterializer,
        ticker: T,
        cancel: CancellationToken,
    ) -> Self {
        let (ingest, ingest_rx) = mpsc::channel(settings.ingest_queue_capacity());
        let (flush, flush_rx) = mpsc::channel(1);
        let (batch_tx, batch_rx) = mpsc::channel(settings.materializer_queue_capacity.max(1));
        let (sink_tx, sink_rx) = mpsc::channel(settings.sink_queue_capacity.max(1));
        let stats = Arc::new(PipelineStats::default());

        let batcher = tokio::spawn(
            Batcher::new(settings.max_batch_size, ticker).run(ingest_rx, flush_rx, batch_tx),
        );
        let materializer = tokio::spawn(run_materializer(
            batch_rx,
            materializer,
            sink_tx,
            cancel.clone(),
        ));
        let sink = tokio::spawn(run_sink(sink_rx, stats.clone()));

        info!(
            max_batch_size = settings.max_batch_size,
            flush_interval_secs = settings.flush_interval.as_secs(),
            "Pipeline started"
        );

        Self {
            ingest,
            flush,
            cancel,
            stats,
            drain_timeout: settings.drain_timeout,
            batcher,
            materializer,
            sink,
        }
    }

    /// Handler feeding the ingest queue
    pub fn ingest_handler(&self) -> IngestHandler {
        IngestHandler {
            tx: self.ingest.clone(),
            cancel: self.cancel.clone(),
        }
    }

    pub fn stats(&self) -> Arc<PipelineStats> {
        self.stats.clone()
    }

    /// Token cancelled on shutdown or when a stage fails
    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Stop ingestion and drain the stages
    ///
    /// Cancels the token, forces a final flush, closes the ingest queue and
    /// waits up to the drain timeout. Every [`IngestHandler`] must be dropped
    /// for the drain to complete. A materializer failure is returned as the
    /// error; a timeout is logged and reported as [`DrainOutcome::TimedOut`].
    pub async fn shutdown(self) -> GeneratorResult<DrainOutcome> {
        let Pipeline {
            ingest,
            flush,
            cancel,
            stats,
            drain_timeout,
            mut batcher,
            mut materializer,
            mut sink,
        } = self;

        cancel.cancel();
        // A full queue means a flush is already pending
        let _ = flush.try_send(());
        drop(ingest);

        let drained = tokio::time::timeout(drain_timeout, async {
            let batched = (&mut batcher).await;
            let materialized = (&mut materializer).await;
            let sunk = (&mut sink).await;
            (batched, materialized, sunk)
        })
        .await;

        match drained {
            Ok((batched, materialized, sunk)) => {
                // Report the materializer first: its failure is what stops the batcher
                let files = materialized??;
                let batches = batched??;
                sunk?;
                info!(
                    batches,
                    files,
                    events = stats.published_events(),
                    "Pipeline drained"
                );
                Ok(DrainOutcome::Drained)
            }
            Err(_) => {
                warn!(
                    timeout_secs = drain_timeout.as_secs(),
                    "Pipeline drain timed out, abandoning remaining batches"
                );
                batcher.abort();
                materializer.abort();
                sink.abort();
                Ok(DrainOutcome::TimedOut)
            }
        }
    }
}

/// Single-writer stage turning batches into files
async fn run_materializer(
    mut batches: mpsc::Receiver<Batch>,
    materializer: FileMaterializer,
    sink: mpsc::Sender<Published>,
    cancel: CancellationToken,
) -> GeneratorResult<u64> {
    let mut files = 0u64;

    while let Some(batch) = batches.recv().await {
        match materializer.publish_next(&batch).await {
            Ok(Some(file_name)) => {
                files += 1;
                let published = Published {
                    file_name,
                    events: batch.len(),
                };
                if sink.send(published).await.is_err() {
                    warn!("Completion sink closed");
                }
            }
            Ok(None) => {}
            Err(e) => {
                error!(error = %e, "Materialization failed, halting pipeline");
                cancel.cancel();
                return Err(e);
            }
        }
    }

    Ok(files)
}

/// Observability stage
async fn run_sink(mut published: mpsc::Receiver<Published>, stats: Arc<PipelineStats>) {
    while let Some(file) = published.recv().await {
        stats.record(&file);
        info!(file = %file.file_name, events = file.events, "Activity file published");
    }
}
