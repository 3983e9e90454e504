//! Command line interface of the `pushtally` operator binary

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::config::EngineConfig;
use crate::error::EngineResult;

#[derive(Debug, Parser)]
#[command(name = "pushtally", version, about = "Unread notification counts over an event log")]
pub struct Cli {
    /// Path to a TOML configuration file
    #[arg(long, short, global = true)]
    pub config: Option<PathBuf>,

    /// Data directory (overrides the configuration file)
    #[arg(long, global = true)]
    pub data_dir: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Move a recipient's read receipt forward
    Receipt {
        /// Room ID
        room: String,
        /// Recipient user ID
        user: String,
        /// Log position the recipient has read up to
        position: u64,
    },
    /// Show unread counts for a recipient
    Counts {
        /// Room ID
        room: String,
        /// Recipient user ID
        user: String,
        /// Count after this position instead of the current receipt
        #[arg(long)]
        at: Option<u64>,
    },
    /// Find the first log position received at or after a timestamp
    PositionAfter {
        /// Unix timestamp in milliseconds
        timestamp_ms: i64,
    },
    /// Run one rotation pass
    Rotate {
        /// Rotate up to this position instead of the age-based target
        #[arg(long)]
        target: Option<u64>,
    },
    /// Run background rotation until interrupted
    Run,
}

impl Cli {
    /// Engine configuration selected by the command line
    pub fn engine_config(&self) -> EngineResult<EngineConfig> {
        let config = match &self.config {
            Some(path) => EngineConfig::from_toml_file(path)?,
            None => EngineConfig::default(),
        };

        let mut config = match &self.data_dir {
            Some(data_dir) => EngineConfig::with_data_dir(data_dir)
                .with_rotation(config.rotation)
                .with_logging(config.logging),
            None => config,
        };
        if let Some(level) = &self.log_level {
            config.logging.level = level.clone();
        }
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_is_well_formed() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_counts() {
        let cli = Cli::try_parse_from(["pushtally", "counts", "!room", "@alice", "--at", "7"]).unwrap();
        match cli.command {
            Command::Counts { room, user, at } => {
                assert_eq!(room, "!room");
                assert_eq!(user, "@alice");
                assert_eq!(at, Some(7));
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_data_dir_overrides_paths() {
        let cli =
            Cli::try_parse_from(["pushtally", "--data-dir", "/tmp/pt", "--log-level", "debug", "run"])
                .unwrap();
        let config = cli.engine_config().unwrap();
        assert_eq!(config.store.db_path, PathBuf::from("/tmp/pt/pushtally.redb"));
        assert_eq!(config.event_log.base_dir, PathBuf::from("/tmp/pt/log"));
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn test_receipt_requires_position() {
        assert!(Cli::try_parse_from(["pushtally", "receipt", "!room", "@alice"]).is_err());
    }
}
