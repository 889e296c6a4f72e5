//! # Activity Generator
//!
//! Tails the audit log, groups events into size- or time-bounded batches and
//! publishes every batch as an NC activity file named from a durable counter.
//!
//! ## Components
//!
//! - [`LogTailer`]: Follows the committed tail of a [`CommitLog`](activity_storage::CommitLog)
//! - [`Batcher`]: Groups events by count, ticker and explicit flush
//! - [`FileMaterializer`]: Stages, publishes and records one file per batch
//! - [`Pipeline`]: Bounded stages with a graceful drain
//! - [`ActivityGenerator`]: Wires the above for one stream
//! - [`AuditLogger`]: Producer side, appending events to the log
//!
//! ## Example
//!
//! ```rust,ignore
//! use activity_generator::{ActivityGenerator, GeneratorConfig};
//! use tokio_util::sync::CancellationToken;
//!
//! let generator = ActivityGenerator::open(GeneratorConfig::with_data_dir("/var/lib/activity")).await?;
//! let shutdown = CancellationToken::new();
//! let outcome = generator.run(shutdown).await?;
//! ```

pub mod audit;
pub mod batcher;
pub mod config;
pub mod error;
pub mod generator;
pub mod materializer;
pub mod pipeline;
pub mod tailer;

// Re-exports
pub use audit::AuditLogger;
pub use batcher::{Batcher, IntervalTicker, Ticker};
#[doc(hidden)]
pub use batcher::{ManualTicker, ManualTickerHandle};
pub use config::GeneratorConfig;
pub use error::{GeneratorError, GeneratorResult};
pub use generator::ActivityGenerator;
pub use materializer::FileMaterializer;
pub use pipeline::{
    DrainOutcome, IngestHandler, Pipeline, PipelineSettings, PipelineStats, Published,
};
pub use tailer::{LogTailer, RecordHandler};
