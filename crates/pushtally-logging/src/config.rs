//! Logging settings, as found under `[logging]` in the engine's TOML file

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Where and how pushtally writes its log lines
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Filter directive used when `RUST_LOG` is unset, e.g. `info` or
    /// `pushtally_storage=debug,info`
    pub level: String,
    /// Format of lines written to stdout
    pub console: ConsoleFormat,
    /// Rolling JSON log files, if any
    pub file: Option<FileOutput>,
    /// Extra fields attached to every JSON line
    pub fields: LogFields,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            console: ConsoleFormat::Json,
            file: None,
            fields: LogFields::default(),
        }
    }
}

impl LogConfig {
    /// Readable console output with debug detail from every crate
    pub fn development() -> Self {
        Self {
            level: "debug".to_string(),
            console: ConsoleFormat::Pretty,
            ..Default::default()
        }
    }

    /// A long-running `pushtally run` process
    ///
    /// Writes daily JSON files under `log_dir` and keeps stdout quiet, so
    /// rotation pass summaries end up in one place.
    pub fn service(log_dir: impl Into<PathBuf>) -> Self {
        Self {
            console: ConsoleFormat::Off,
            file: Some(FileOutput::in_dir(log_dir)),
            ..Default::default()
        }
    }

    /// Warnings only, as plain JSON lines
    pub fn testing() -> Self {
        Self {
            level: "warn".to_string(),
            fields: LogFields {
                source_location: false,
                ..LogFields::default()
            },
            ..Default::default()
        }
    }
}

/// Console line format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ConsoleFormat {
    /// Nothing on stdout
    Off,
    /// One JSON object per line
    #[default]
    Json,
    /// Human-readable, coloured when stdout is a terminal
    Pretty,
}

/// Rolling log file output
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FileOutput {
    pub directory: PathBuf,
    /// File names are `<prefix>.<date>.log`, or `<prefix>.log` when never rotated
    pub prefix: String,
    pub rotation: FileRotation,
    /// Old files kept after rotation; `None` keeps them all
    pub keep: Option<usize>,
}

impl Default for FileOutput {
    fn default() -> Self {
        Self::in_dir("./data/logs")
    }
}

impl FileOutput {
    /// Daily files named `pushtally.*.log` in `directory`, a week kept
    pub fn in_dir(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
            prefix: "pushtally".to_string(),
            rotation: FileRotation::Daily,
            keep: Some(7),
        }
    }
}

/// How often a new log file is started
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum FileRotation {
    #[default]
    Daily,
    Hourly,
    Never,
}

/// Optional fields on JSON lines
///
/// Event fields such as `room` or `pairs` are always flattened to the top
/// level of the line, next to `message`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogFields {
    /// The enclosing `#[instrument]` spans, e.g. the room and recipient of
    /// a fold
    pub spans: bool,
    /// Source file and line
    pub source_location: bool,
    /// Thread id and name; rotation runs on the blocking pool
    pub thread: bool,
}

impl Default for LogFields {
    fn default() -> Self {
        Self {
            spans: true,
            source_location: true,
            thread: false,
        }
    }
}
