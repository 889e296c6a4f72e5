//! Size- and time-bounded batching of events
//!
//! The batcher emits a batch as soon as it holds `max_batch_size` events,
//! whenever its ticker fires with a non-empty buffer, on an explicit flush
//! command, and once more when its input closes.

use activity_core::{Batch, Event};
use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::time::{Duration, Instant, Interval, MissedTickBehavior};
use tracing::{debug, trace};

use crate::error::{GeneratorError, GeneratorResult};

/// Source of periodic flush signals
#[async_trait]
pub trait Ticker: Send {
    /// Wait for the next tick
    ///
    /// Must be cancel safe: it is raced against other events in a select loop.
    async fn tick(&mut self);
}

/// Production ticker backed by [`tokio::time::interval`]
#[derive(Debug)]
pub struct IntervalTicker {
    interval: Interval,
}

impl IntervalTicker {
    /// First tick fires one full `period` after creation
    pub fn new(period: Duration) -> Self {
        let mut interval = tokio::time::interval_at(Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        Self { interval }
    }
}

#[async_trait]
impl Ticker for IntervalTicker {
    async fn tick(&mut self) {
        self.interval.tick().await;
    }
}

/// Ticker driven by hand, for tests
#[doc(hidden)]
#[derive(Debug)]
pub struct ManualTicker {
    rx: mpsc::UnboundedReceiver<()>,
}

/// Handle firing a [`ManualTicker`]
#[doc(hidden)]
#[derive(Debug, Clone)]
pub struct ManualTickerHandle {
    tx: mpsc::UnboundedSender<()>,
}

impl ManualTicker {
    pub fn new() -> (Self, ManualTickerHandle) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { rx }, ManualTickerHandle { tx })
    }
}

impl ManualTickerHandle {
    /// Queue one tick; returns false once the ticker is gone
    pub fn fire(&self) -> bool {
        self.tx.send(()).is_ok()
    }
}

#[async_trait]
impl Ticker for ManualTicker {
    async fn tick(&mut self) {
        if self.rx.recv().await.is_none() {
            // Every handle dropped: never tick again
            std::future::pending::<()>().await;
        }
    }
}

/// Stage grouping events into batches
pub struct Batcher<T> {
    max_batch_size: usize,
    ticker: T,
}

impl<T: Ticker> Batcher<T> {
    pub fn new(max_batch_size: usize, ticker: T) -> Self {
        Self {
            max_batch_size: max_batch_size.max(1),
            ticker,
        }
    }

    /// Run until `input` closes, sending batches to `output`
    ///
    /// Returns the number of batches emitted. Fails with
    /// [`GeneratorError::ChannelClosed`] if `output` is dropped.
    pub async fn run(
        mut self,
        mut input: mpsc::Receiver<Event>,
        mut flush: mpsc::Receiver<()>,
        output: mpsc::Sender<Batch>,
    ) -> GeneratorResult<u64> {
        let max = self.max_batch_size;
        let mut buffer = Vec::with_capacity(max);
        let mut emitted = 0u64;
        let mut flush_open = true;

        loop {
            tokio::select! {
                received = input.recv() => match received {
                    Some(event) => {
                        buffer.push(event);
                        if buffer.len() >= max {
                            trace!(size = buffer.len(), "Batch full");
                            emitted += emit(&mut buffer, &output, max).await?;
                        }
                    }
                    None => {
                        emitted += emit(&mut buffer, &output, max).await?;
                        break;
                    }
                },
                _ = self.ticker.tick() => {
                    if !buffer.is_empty() {
                        trace!(size = buffer.len(), "Timer flush");
                        emitted += emit(&mut buffer, &output, max).await?;
                    }
                }
                command = flush.recv(), if flush_open => match command {
                    Some(()) => {
                        debug!(size = buffer.len(), "Forced flush");
                        emitted += emit(&mut buffer, &output, max).await?;
                    }
                    None => flush_open = false,
                },
            }
        }

        debug!(batches = emitted, "Batcher finished");
        Ok(emitted)
    }
}

/// Send the buffered events as one batch; empty buffers are dropped
async fn emit(
    buffer: &mut Vec<Event>,
    output: &mpsc::Sender<Batch>,
    capacity: usize,
) -> GeneratorResult<u64> {
    if buffer.is_empty() {
        return Ok(0);
    }
    let events = std::mem::replace(buffer, Vec::with_capacity(capacity));
    output
        .send(Batch::new(events))
        .await
        .map_err(|_| GeneratorError::ChannelClosed("materializer queue".into()))?;
    Ok(1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use activity_core::EventType;
    use chrono::NaiveDate;

    fn event(n: u32) -> Event {
        let timestamp = NaiveDate::from_ymd_opt(2024, 1, 1)
            .unwrap()
            .and_hms_opt(0, 0, n % 60)
            .unwrap();
        Event::new(timestamp, EventType::Time, format!("DEV{n}"), "")
    }

    struct Harness {
        input: mpsc::Sender<Event>,
        flush: mpsc::Sender<()>,
        output: mpsc::Receiver<Batch>,
        task: tokio::task::JoinHandle<GeneratorResult<u64>>,
    }

    fn start<T: Ticker + 'static>(max: usize, ticker: T) -> Harness {
        let (input, input_rx) = mpsc::channel(max * 2);
        let (flush, flush_rx) = mpsc::channel(1);
        let (output_tx, output) = mpsc::channel(16);
        let task = tokio::spawn(Batcher::new(max, ticker).run(input_rx, flush_rx, output_tx));
        Harness {
            input,
            flush,
            output,
            task,
        }
    }

    #[tokio::test]
    async fn test_full_batches_and_final_remainder() {
        let (ticker, _handle) = ManualTicker::new();
        let mut h = start(3, ticker);

        for n in 0..7 {
            h.input.send(event(n)).await.unwrap();
        }
        drop(h.input);

        let mut sizes = Vec::new();
        while let Some(batch) = h.output.recv().await {
            assert!(batch.len() <= 3);
            sizes.push(batch.len());
        }
        assert_eq!(sizes, vec![3, 3, 1]);
        assert_eq!(h.task.await.unwrap().unwrap(), 3);
    }

    #[tokio::test]
    async fn test_manual_tick_flushes_partial_batch() {
        let (ticker, handle) = ManualTicker::new();
        let mut h = start(100, ticker);

        h.input.send(event(1)).await.unwrap();
        h.input.send(event(2)).await.unwrap();
        // Let the batcher take both events before ticking
        tokio::task::yield_now().await;
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(handle.fire());

        let batch = tokio::time::timeout(Duration::from_secs(5), h.output.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(batch.len(), 2);
        assert_eq!(batch.first().unwrap().device_id, "DEV1");
    }

    #[tokio::test]
    async fn test_tick_on_empty_buffer_emits_nothing() {
        let (ticker, handle) = ManualTicker::new();
        let mut h = start(10, ticker);

        handle.fire();
        handle.fire();
        tokio::time::sleep(Duration::from_millis(10)).await;
        drop(h.input);

        assert!(h.output.recv().await.is_none());
        assert_eq!(h.task.await.unwrap().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_flush_command() {
        let (ticker, _handle) = ManualTicker::new();
        let mut h = start(10, ticker);

        h.input.send(event(1)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;
        h.flush.send(()).await.unwrap();

        let batch = tokio::time::timeout(Duration::from_secs(5), h.output.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(batch.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_interval_ticker_flushes_after_period() {
        let started = Instant::now();
        let mut h = start(100, IntervalTicker::new(Duration::from_secs(60)));

        h.input.send(event(1)).await.unwrap();
        tokio::time::sleep(Duration::from_secs(59)).await;
        assert!(h.output.try_recv().is_err());

        // Auto-advance carries the clock to the tick
        let batch = h.output.recv().await.unwrap();
        assert_eq!(batch.len(), 1);
        assert!(started.elapsed() >= Duration::from_secs(60));
    }

    #[tokio::test]
    async fn test_closed_output_is_an_error() {
        let (ticker, _handle) = ManualTicker::new();
        let h = start(1, ticker);
        drop(h.output);

        h.input.send(event(1)).await.unwrap();
        let result = h.task.await.unwrap();
        assert!(matches!(result, Err(GeneratorError::ChannelClosed(_))));
    }

    /// Ticker that is `Send` but not `Sync`
    struct CountingTicker {
        inner: ManualTicker,
        ticks: std::cell::Cell<u32>,
    }

    #[async_trait]
    impl Ticker for CountingTicker {
        async fn tick(&mut self) {
            self.inner.tick().await;
            self.ticks.set(self.ticks.get() + 1);
        }
    }

    #[tokio::test]
    async fn test_spawns_with_non_sync_ticker() {
        let (inner, handle) = ManualTicker::new();
        let ticker = CountingTicker {
            inner,
            ticks: std::cell::Cell::new(0),
        };
        let mut h = start(10, ticker);

        h.input.send(event(1)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(handle.fire());

        let batch = tokio::time::timeout(Duration::from_secs(5), h.output.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(batch.len(), 1);
        drop(h.input);
        assert_eq!(h.task.await.unwrap().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_manual_ticker_without_handle_never_ticks() {
        let (mut ticker, handle) = ManualTicker::new();
        drop(handle);
        let tick = tokio::time::timeout(Duration::from_millis(20), ticker.tick()).await;
        assert!(tick.is_err());
    }
}
