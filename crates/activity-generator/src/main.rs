use std::path::{Path, PathBuf};
use std::sync::Arc;

use activity_core::wire::TIMESTAMP_FORMAT;
use activity_core::{Event, EventType, decode_records};
use activity_generator::{ActivityGenerator, AuditLogger, DrainOutcome, GeneratorConfig};
use activity_logging::ActivitySubscriberBuilder;
use activity_storage::{AppendLog, AppendLogConfig};
use anyhow::Context;
use chrono::{NaiveDateTime, Utc};
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

#[derive(Parser)]
#[command(
    name = "activity-generator",
    version,
    about = "Batch audit log events into NC activity files"
)]
struct Cli {
    /// Path to a TOML configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Tail the audit log and publish activity files until interrupted
    Run,
    /// Append audit events to the log
    Emit {
        /// Event type (TIME, MANIFEST, DOWNLOAD, CONFIRM or any other tag)
        #[arg(long = "type")]
        event_type: String,
        /// Device identifier
        #[arg(long)]
        device: String,
        /// Free-form data field
        #[arg(long, default_value = "")]
        data: String,
        /// Event time as yyyy-MM-ddTHH:mm:ss.fff (defaults to now, UTC)
        #[arg(long)]
        timestamp: Option<String>,
        /// Number of copies to append
        #[arg(long, default_value_t = 1)]
        count: usize,
    },
    /// Print the records of an activity file
    Inspect {
        /// Path to a .BIN activity file
        file: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => GeneratorConfig::load(path)
            .with_context(|| format!("loading configuration from {}", path.display()))?,
        None => GeneratorConfig::default(),
    };
    if let Some(level) = cli.log_level {
        config.logging.default_level = level;
    }

    let _guard = ActivitySubscriberBuilder::new()
        .with_config(config.logging.clone())
        .init();

    match cli.command {
        Command::Run => run(config).await,
        Command::Emit {
            event_type,
            device,
            data,
            timestamp,
            count,
        } => emit(config, &event_type, &device, &data, timestamp.as_deref(), count).await,
        Command::Inspect { file } => inspect(&file),
    }
}

async fn run(config: GeneratorConfig) -> anyhow::Result<()> {
    let generator = ActivityGenerator::open(config)
        .await
        .context("opening audit log")?;

    let shutdown = CancellationToken::new();
    {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => {
                    info!("Interrupt received");
                    shutdown.cancel();
                }
                Err(e) => error!(error = %e, "Cannot listen for interrupts"),
            }
        });
    }

    match generator.run(shutdown).await? {
        DrainOutcome::Drained => info!("Shutdown complete"),
        DrainOutcome::TimedOut => warn!("Shutdown complete, some batches were not drained"),
    }
    Ok(())
}

async fn emit(
    config: GeneratorConfig,
    event_type: &str,
    device: &str,
    data: &str,
    timestamp: Option<&str>,
    count: usize,
) -> anyhow::Result<()> {
    let timestamp = match timestamp {
        Some(value) => NaiveDateTime::parse_from_str(value, TIMESTAMP_FORMAT)
            .with_context(|| format!("invalid timestamp {value:?}"))?,
        None => Utc::now().naive_utc(),
    };
    let event = Event::new(timestamp, EventType::parse(event_type), device, data);

    let log = AppendLog::open(AppendLogConfig::for_stream(&config.log_dir, &config.stream))
        .await
        .context("opening audit log")?;
    let logger = AuditLogger::new(Arc::new(log), config.commit_interval());
    for _ in 0..count {
        logger.log_event(&event).await?;
    }
    let appended = logger.close().await?;

    info!(appended, stream = %config.stream, "Audit events appended");
    Ok(())
}

fn inspect(file: &Path) -> anyhow::Result<()> {
    let bytes = std::fs::read(file).with_context(|| format!("reading {}", file.display()))?;
    let records = decode_records(&bytes).with_context(|| format!("decoding {}", file.display()))?;

    for record in &records {
        println!(
            "{} {} {:<19} nature={} flags={:?}",
            record.date, record.time, record.device_id, record.exchange_nature, record.flags
        );
    }
    println!("{} record(s)", records.len());
    Ok(())
}
