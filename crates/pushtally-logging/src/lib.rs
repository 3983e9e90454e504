//! Structured logging for pushtally
//!
//! Builds the global `tracing` subscriber from a [`LogConfig`]: JSONL or
//! pretty console output, optional rolling JSONL files, and an `EnvFilter`
//! that honours `RUST_LOG` over the configured default level.
//!
//! # Quick Start
//!
//! ```ignore
//! use pushtally_logging::{LogConfig, PushtallySubscriberBuilder};
//!
//! // JSONL to console
//! let _guard = PushtallySubscriberBuilder::new().init();
//!
//! // Development mode with pretty human-readable output
//! let _guard = PushtallySubscriberBuilder::new()
//!     .with_config(LogConfig::development())
//!     .init();
//! ```
//!
//! Keep the returned guard alive for as long as file output should be
//! flushed.

pub mod config;

pub use config::{ConsoleFormat, FileOutput, FileRotation, LogConfig, LogFields};

use std::io::IsTerminal;

use thiserror::Error;
use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_appender::rolling::{InitError, RollingFileAppender, Rotation};
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::{EnvFilter, Layer, Registry, layer::SubscriberExt, util::SubscriberInitExt};

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

/// Errors raised while installing the subscriber
#[derive(Debug, Error)]
pub enum LoggingError {
    #[error("Invalid log filter: {0}")]
    Filter(String),

    #[error("Failed to prepare log directory: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to create log file appender: {0}")]
    Appender(#[from] InitError),

    #[error("A global subscriber is already set: {0}")]
    AlreadyInitialized(String),
}

/// Builder for configuring and initializing the logging subscriber
///
/// By default, console output uses JSONL format. Use
/// [`LogConfig::development`] for human-readable output during development.
pub struct PushtallySubscriberBuilder {
    config: LogConfig,
}

impl PushtallySubscriberBuilder {
    /// Create a new subscriber builder with default configuration
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

    /// Set the filter used when `RUST_LOG` is unset
    pub fn with_level(mut self, level: impl Into<String>) -> Self {
        self.config.level = level.into();
        self
    }

    /// Set the console format
    pub fn with_console(mut self, format: ConsoleFormat) -> Self {
        self.config.console = format;
        self
    }

    /// Configure file output
    pub fn with_file_output(mut self, config: FileOutput) -> Self {
        self.config.file = Some(config);
        self
    }

    /// Initialize the subscriber globally
    ///
    /// Failures are reported on stderr and leave logging disabled.
    pub fn init(self) -> Option<WorkerGuard> {
        match self.try_init() {
            Ok(guard) => guard,
            Err(e) => {
                eprintln!("Warning: Failed to initialize logging: {e}");
                None
            }
        }
    }

    /// Try to initialize the subscriber globally
    ///
    /// Returns the file writer guard when file output is configured.
    pub fn try_init(self) -> Result<Option<WorkerGuard>, LoggingError> {
        let env_filter = match EnvFilter::try_from_default_env() {
            Ok(filter) => filter,
            Err(_) => EnvFilter::try_new(&self.config.level)
                .map_err(|e| LoggingError::Filter(e.to_string()))?,
        };

        let mut layers: Vec<BoxedLayer> = Vec::new();
        let mut guard = None;

        match self.config.console {
            ConsoleFormat::Off => {}
            ConsoleFormat::Json => layers.push(jsonl_layer(&self.config.fields, std::io::stdout)),
            ConsoleFormat::Pretty => layers.push(
                tracing_subscriber::fmt::layer()
                    .with_ansi(std::io::stdout().is_terminal())
                    .with_target(true)
                    .boxed(),
            ),
        }

        if let Some(file_output) = &self.config.file {
            let (writer, file_guard) = file_writer(file_output)?;
            layers.push(jsonl_layer(&self.config.fields, writer));
            guard = Some(file_guard);
        }

        tracing_subscriber::registry()
            .with(layers)
            .with(env_filter)
            .try_init()
            .map_err(|e| LoggingError::AlreadyInitialized(e.to_string()))?;

        Ok(guard)
    }
}

impl Default for PushtallySubscriberBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// JSONL formatting layer writing to `writer`
fn jsonl_layer<W>(fields: &LogFields, writer: W) -> BoxedLayer
where
    W: for<'writer> MakeWriter<'writer> + Send + Sync + 'static,
{
    tracing_subscriber::fmt::layer()
        .json()
        .with_current_span(true)
        .with_span_list(fields.spans)
        .flatten_event(true)
        .with_file(fields.source_location)
        .with_line_number(fields.source_location)
        .with_thread_ids(fields.thread)
        .with_thread_names(fields.thread)
        .with_writer(writer)
        .boxed()
}

/// Non-blocking writer for the configured log files
fn file_writer(config: &FileOutput) -> Result<(NonBlocking, WorkerGuard), LoggingError> {
    std::fs::create_dir_all(&config.directory)?;

    let rotation = match config.rotation {
        FileRotation::Daily => Rotation::DAILY,
        FileRotation::Hourly => Rotation::HOURLY,
        FileRotation::Never => Rotation::NEVER,
    };

    let mut builder = RollingFileAppender::builder()
        .rotation(rotation)
        .filename_prefix(config.prefix.clone())
        .filename_suffix("log");
    if let Some(keep) = config.keep {
        builder = builder.max_log_files(keep);
    }

    let appender = builder.build(&config.directory)?;
    Ok(tracing_appender::non_blocking(appender))
}

/// Initialize logging with default settings (JSONL to console)
pub fn init_default() -> Option<WorkerGuard> {
    PushtallySubscriberBuilder::new().init()
}

/// Initialize logging for development (verbose, pretty console output)
pub fn init_development() -> Option<WorkerGuard> {
    PushtallySubscriberBuilder::new()
        .with_config(LogConfig::development())
        .init()
}

/// Initialize logging for testing (minimal output)
///
/// Safe to call from every test; only the first call installs a subscriber.
pub fn init_testing() {
    let _ = PushtallySubscriberBuilder::new()
        .with_config(LogConfig::testing())
        .try_init();
}
