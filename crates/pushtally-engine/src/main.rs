use std::sync::Arc;

use clap::Parser;
use tokio::sync::broadcast;
use tracing::info;

use pushtally_core::{NewEvent, PushAction, RoomId, StreamPos, Timestamp, UserId};
use pushtally_engine::cli::{Cli, Command};
use pushtally_engine::{NotificationEngine, RotationTask};
use pushtally_logging::PushtallySubscriberBuilder;
use pushtally_storage::FileEventLog;

/// The operator binary never stages events, so no actions are computed
fn no_actions(_event: &NewEvent, _recipients: &[UserId]) -> Vec<PushAction> {
    Vec::new()
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let mut config = cli.engine_config()?;

    // Keep one-shot command output readable unless asked otherwise
    if cli.log_level.is_none() && !matches!(cli.command, Command::Run) {
        config.logging.level = "warn".to_string();
    }
    let _guard = PushtallySubscriberBuilder::new()
        .with_config(config.logging.clone())
        .init();

    let log = Arc::new(FileEventLog::open(config.event_log.clone()).await?);
    let engine = NotificationEngine::open(log.clone(), no_actions, &config)?;

    match cli.command {
        Command::Receipt {
            room,
            user,
            position,
        } => {
            let room = RoomId::new(room);
            let user = UserId::new(user);
            let advanced = engine.record_receipt(&room, &user, StreamPos::new(position))?;
            let receipt = engine.receipt(&room, &user)?;
            println!(
                "{}",
                serde_json::to_string_pretty(&serde_json::json!({
                    "advanced": advanced,
                    "receipt": receipt,
                }))?
            );
        }

        Command::Counts { room, user, at } => {
            let room = RoomId::new(room);
            let user = UserId::new(user);
            let counts = match at {
                Some(position) => engine.counts_at(&room, &user, StreamPos::new(position))?,
                None => engine.unread_counts(&room, &user)?,
            };
            println!("{}", serde_json::to_string_pretty(&counts)?);
        }

        Command::PositionAfter { timestamp_ms } => {
            let position = engine
                .position_after(Timestamp::from_millis(timestamp_ms))
                .await?;
            println!("{position}");
        }

        Command::Rotate { target } => {
            let report = match target {
                Some(target) => engine.run_rotation_pass(StreamPos::new(target)).await?,
                None => engine.rotate_now().await?,
            };
            println!("{}", serde_json::to_string_pretty(&report)?);
        }

        Command::Run => {
            let engine = Arc::new(engine);
            let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
            let handle =
                RotationTask::spawn(engine.clone(), config.rotation.interval(), shutdown_rx);

            tokio::signal::ctrl_c().await?;
            info!("Interrupt received, stopping");
            let _ = shutdown_tx.send(());
            handle.await?;
        }
    }

    log.close().await?;
    Ok(())
}
