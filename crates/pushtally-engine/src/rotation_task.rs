//! Background rotation task
//!
//! Runs a rotation pass on a fixed interval, each pass aimed at the newest
//! position old enough to rotate. A failed pass is logged and retried on
//! the next tick; every pass is a sequence of atomic steps, so a failure
//! never leaves the stores half-rotated.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use pushtally_core::{ActionComputer, EventLog};

use crate::NotificationEngine;

/// Periodic rotation of an engine's push actions
pub struct RotationTask<L, C> {
    /// Engine to rotate
    engine: Arc<NotificationEngine<L, C>>,
    /// Time between passes
    interval: Duration,
    /// Shutdown signal
    shutdown_rx: broadcast::Receiver<()>,
    /// Passes run so far
    pass_count: u64,
}

impl<L, C> RotationTask<L, C>
where
    L: EventLog + 'static,
    C: ActionComputer + 'static,
{
    /// Create a new rotation task
    pub fn new(
        engine: Arc<NotificationEngine<L, C>>,
        interval: Duration,
        shutdown_rx: broadcast::Receiver<()>,
    ) -> Self {
        Self {
            engine,
            interval,
            shutdown_rx,
            pass_count: 0,
        }
    }

    /// Spawn the rotation task as a background task
    pub fn spawn(
        engine: Arc<NotificationEngine<L, C>>,
        interval: Duration,
        shutdown_rx: broadcast::Receiver<()>,
    ) -> JoinHandle<()> {
        let task = Self::new(engine, interval, shutdown_rx);

        tokio::spawn(async move {
            task.run().await;
        })
    }

    /// Run the rotation loop until shutdown
    async fn run(mut self) {
        info!(
            interval_secs = self.interval.as_secs_f64(),
            "Rotation task started"
        );

        let mut interval = tokio::time::interval(self.interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = self.shutdown_rx.recv() => {
                    info!(passes = self.pass_count, "Rotation task shutting down");
                    break;
                }
                _ = interval.tick() => {
                    self.pass_count += 1;
                    self.rotate_once().await;
                }
            }
        }
    }

    async fn rotate_once(&self) {
        match self.engine.rotate_now().await {
            Ok(report) if report.skipped => {
                debug!(pass = self.pass_count, "Previous rotation still running");
            }
            Ok(report) if report.pairs_processed > 0 => {
                info!(
                    pass = self.pass_count,
                    pairs = report.pairs_processed,
                    rotated = report.actions_rotated,
                    already_read = report.actions_already_read,
                    "Rotation cycle complete"
                );
            }
            Ok(_) => {}
            Err(e) => {
                warn!(
                    pass = self.pass_count,
                    error = %e,
                    retryable = e.is_retryable(),
                    "Rotation cycle failed"
                );
            }
        }
    }
}
