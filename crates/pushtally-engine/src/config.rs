//! Configuration for the notification engine

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use pushtally_logging::LogConfig;
use pushtally_storage::{DEFAULT_MAX_PAIRS_PER_BATCH, EventLogConfig, PushStoreConfig};

use crate::error::{EngineError, EngineResult};

/// Background rotation settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RotationConfig {
    /// Seconds between rotation passes
    pub interval_secs: u64,
    /// Only actions received at least this long ago are rotated
    pub min_action_age_secs: u64,
    /// Maximum (room, recipient) pairs per rotation batch
    pub max_pairs_per_batch: usize,
}

impl Default for RotationConfig {
    fn default() -> Self {
        Self {
            interval_secs: 30,
            min_action_age_secs: 24 * 60 * 60, // 1 day
            max_pairs_per_batch: DEFAULT_MAX_PAIRS_PER_BATCH,
        }
    }
}

impl RotationConfig {
    /// Time between rotation passes
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs.max(1))
    }

    /// Minimum action age in milliseconds
    pub fn min_action_age_millis(&self) -> i64 {
        i64::try_from(self.min_action_age_secs.saturating_mul(1000)).unwrap_or(i64::MAX)
    }
}

/// Configuration for a NotificationEngine
#[derive(Debug, Clone, Serialize)]
pub struct EngineConfig {
    /// Base directory for all engine data
    pub data_dir: PathBuf,
    /// Push action database configuration
    pub store: PushStoreConfig,
    /// Durable event log configuration
    pub event_log: EventLogConfig,
    /// Background rotation configuration
    pub rotation: RotationConfig,
    /// Logging configuration
    pub logging: LogConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::with_data_dir("./pushtally-data")
    }
}

impl EngineConfig {
    /// Create a configuration with a custom data directory
    pub fn with_data_dir(data_dir: impl Into<PathBuf>) -> Self {
        let data_dir = data_dir.into();
        Self {
            store: PushStoreConfig::at(data_dir.join("pushtally.redb")),
            event_log: EventLogConfig::with_base_dir(data_dir.join("log")),
            data_dir,
            rotation: RotationConfig::default(),
            logging: LogConfig::default(),
        }
    }

    /// Create a configuration backed by an in-memory database
    pub fn in_memory() -> Self {
        Self {
            store: PushStoreConfig::in_memory(),
            ..Self::default()
        }
    }

    /// Set the push action database configuration
    pub fn with_store(mut self, store: PushStoreConfig) -> Self {
        self.store = store;
        self
    }

    /// Set the event log configuration
    pub fn with_event_log(mut self, event_log: EventLogConfig) -> Self {
        self.event_log = event_log;
        self
    }

    /// Set the rotation configuration
    pub fn with_rotation(mut self, rotation: RotationConfig) -> Self {
        self.rotation = rotation;
        self
    }

    /// Set the logging configuration
    pub fn with_logging(mut self, logging: LogConfig) -> Self {
        self.logging = logging;
        self
    }

    /// Parse a TOML configuration
    ///
    /// Sections left out keep their defaults, with paths placed under
    /// `data_dir`.
    pub fn from_toml_str(contents: &str) -> EngineResult<Self> {
        let file: EngineConfigFile = toml::from_str(contents)?;

        let mut config = match file.data_dir {
            Some(data_dir) => Self::with_data_dir(data_dir),
            None => Self::default(),
        };
        if let Some(store) = file.store {
            config.store = store;
        }
        if let Some(event_log) = file.event_log {
            config.event_log = event_log;
        }
        config.rotation = file.rotation;
        config.logging = file.logging;

        config.validate()?;
        Ok(config)
    }

    /// Load a TOML configuration file
    pub fn from_toml_file(path: impl AsRef<Path>) -> EngineResult<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .map_err(|e| EngineError::Config(format!("{}: {e}", path.display())))?;
        Self::from_toml_str(&contents)
    }

    /// Reject settings the engine cannot run with
    pub fn validate(&self) -> EngineResult<()> {
        if self.rotation.max_pairs_per_batch == 0 {
            return Err(EngineError::Config(
                "rotation.max_pairs_per_batch must be at least 1".to_string(),
            ));
        }
        if self.rotation.interval_secs == 0 {
            return Err(EngineError::Config(
                "rotation.interval_secs must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// On-disk shape of [`EngineConfig`]
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct EngineConfigFile {
    data_dir: Option<PathBuf>,
    store: Option<PushStoreConfig>,
    event_log: Option<EventLogConfig>,
    rotation: RotationConfig,
    logging: LogConfig,
}
