//! Structured JSONL logging for the activity file generator
//!
//! Every pipeline stage logs through `tracing`; this crate decides where those
//! events end up.
//!
//! # Features
//!
//! - **JSONL Output**: Structured JSON lines on the console (default)
//! - **Pretty Output**: Human-readable console lines for development
//! - **File Rotation**: Daily/hourly log rotation via tracing-appender
//! - **Per-Target Levels**: Overrides layered on top of the default level
//!
//! # Quick Start
//!
//! ```ignore
//! use activity_logging::{ActivitySubscriberBuilder, LogConfig};
//!
//! // Simple setup with defaults (JSONL to console)
//! let _guard = ActivitySubscriberBuilder::new().init();
//!
//! // Development mode with pretty human-readable output
//! let _guard = ActivitySubscriberBuilder::new()
//!     .with_config(LogConfig::development())
//!     .init();
//! ```
//!
//! `RUST_LOG`, when set, takes precedence over the configured levels.

pub mod config;
pub mod layers;

pub use config::{ConsoleConfig, FileConfig, JsonlConfig, LogConfig, RotationStrategy};
pub use tracing_appender::non_blocking::WorkerGuard;

use thiserror::Error;
use tracing_subscriber::{EnvFilter, Layer, Registry, layer::SubscriberExt, util::SubscriberInitExt};

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync + 'static>;

/// Errors raised while installing the global subscriber
#[derive(Debug, Error)]
pub enum LoggingError {
    /// A level or directive string could not be parsed
    #[error("Invalid filter directive: {0}")]
    Filter(String),

    /// The log directory could not be prepared
    #[error("Log directory error: {0}")]
    Io(#[from] std::io::Error),

    /// The rolling file appender could not be built
    #[error("File appender error: {0}")]
    Appender(String),

    /// A global subscriber is already installed
    #[error("Subscriber already initialized: {0}")]
    AlreadyInitialized(String),
}

/// Builder for configuring and initializing the logging subscriber
///
/// By default, console output uses JSONL format. Use `LogConfig::development()`
/// for human-readable pretty output during development.
pub struct ActivitySubscriberBuilder {
    config: LogConfig,
}

impl ActivitySubscriberBuilder {
    /// Create a new subscriber builder with default configuration
    ///
    /// Default: JSONL output to console
    pub fn new() -> Self {
        Self {
            config: LogConfig::default(),
        }
    }

    /// Use a specific configuration
    pub fn with_config(mut self, config: LogConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the default log level
    pub fn with_level(mut self, level: impl Into<String>) -> Self {
        self.config.default_level = level.into();
        self
    }

    /// Enable or disable console output
    pub fn with_console(mut self, enabled: bool) -> Self {
        self.config.console.enabled = enabled;
        self
    }

    /// Configure file output
    pub fn with_file_output(mut self, config: FileConfig) -> Self {
        self.config.file = Some(config);
        self
    }

    /// The configuration this builder will install
    pub fn config(&self) -> &LogConfig {
        &self.config
    }

    /// Initialize the subscriber globally, reporting failures on stderr
    ///
    /// Returns a guard that must be kept alive for the duration of the
    /// program when file output is enabled.
    pub fn init(self) -> Option<WorkerGuard> {
        match self.try_init() {
            Ok(guard) => guard,
            Err(e) => {
                eprintln!("Warning: failed to initialize logging: {e}");
                None
            }
        }
    }

    /// Try to initialize the subscriber globally
    ///
    /// Returns an error if a global subscriber has already been set or the
    /// configuration cannot be applied.
    pub fn try_init(self) -> Result<Option<WorkerGuard>, LoggingError> {
        let env_filter = self.env_filter()?;
        let mut sinks: Vec<BoxedLayer> = Vec::new();
        let mut guard = None;

        if self.config.console.enabled {
            let console: BoxedLayer = if self.config.console.pretty {
                layers::pretty_layer(self.config.console.ansi).boxed()
            } else {
                layers::jsonl_layer(std::io::stderr, &self.config.jsonl).boxed()
            };

            // Console may run quieter than the file sink
            let console = match &self.config.console.level {
                Some(level) => {
                    let filter =
                        EnvFilter::try_new(level).map_err(|e| LoggingError::Filter(e.to_string()))?;
                    console.with_filter(filter).boxed()
                }
                None => console,
            };
            sinks.push(console);
        }

        if let Some(file_config) = &self.config.file {
            let (writer, file_guard) = layers::file_writer(file_config)?;
            guard = Some(file_guard);
            sinks.push(layers::jsonl_layer(writer, &self.config.jsonl).boxed());
        }

        Registry::default()
            .with(sinks)
            .with(env_filter)
            .try_init()
            .map_err(|e| LoggingError::AlreadyInitialized(e.to_string()))?;

        Ok(guard)
    }

    fn env_filter(&self) -> Result<EnvFilter, LoggingError> {
        match EnvFilter::try_from_default_env() {
            Ok(filter) => Ok(filter),
            Err(_) => EnvFilter::try_new(self.config.directives())
                .map_err(|e| LoggingError::Filter(e.to_string())),
        }
    }
}

impl Default for ActivitySubscriberBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Initialize logging with default settings (JSONL to console)
pub fn init_default() -> Option<WorkerGuard> {
    ActivitySubscriberBuilder::new().init()
}

/// Initialize logging for development (verbose, pretty console output)
pub fn init_development() -> Option<WorkerGuard> {
    ActivitySubscriberBuilder::new()
        .with_config(LogConfig::development())
        .init()
}

/// Initialize logging for testing (minimal output)
///
/// Safe to call from every test; only the first call installs a subscriber.
pub fn init_testing() {
    let _ = ActivitySubscriberBuilder::new()
        .with_config(LogConfig::testing())
        .try_init();
}
