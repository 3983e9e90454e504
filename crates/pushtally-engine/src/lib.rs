//! # Pushtally Engine
//!
//! The notification engine façade: wires an [`EventLog`], an
//! [`ActionComputer`], and the push action stores together, and runs
//! rotation in the background.
//!
//! ## Event lifecycle
//!
//! 1. [`stage_event`](NotificationEngine::stage_event) computes the event's
//!    actions and stages them before the event is committed
//! 2. [`commit_event`](NotificationEngine::commit_event) appends the event to
//!    the log and promotes its staged actions at the assigned position
//! 3. Readers ask for [`unread_counts`](NotificationEngine::unread_counts)
//!    and move their receipts forward with
//!    [`record_receipt`](NotificationEngine::record_receipt)
//! 4. [`RotationTask`] periodically folds receipts and rotates old actions
//!    into summaries, which leaves every count unchanged
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use pushtally_core::{MemoryEventLog, NewEvent, RoomId, UserId};
//! use pushtally_engine::{EngineConfig, NotificationEngine};
//!
//! let engine = NotificationEngine::open(
//!     Arc::new(MemoryEventLog::new()),
//!     my_action_computer,
//!     &EngineConfig::in_memory(),
//! )?;
//!
//! let event = NewEvent::new("$event", "!room");
//! engine.stage_event(&event, &[UserId::from("@alice")])?;
//! engine.commit_event(event).await?;
//!
//! let counts = engine.unread_counts(&RoomId::from("!room"), &UserId::from("@alice"))?;
//! ```

pub mod cli;
pub mod config;
pub mod error;
pub mod rotation_task;

use std::sync::Arc;

use tracing::{debug, info, instrument, warn};

use pushtally_core::{
    ActionComputer, Clock, Event, EventId, EventLog, NewEvent, RoomCounts, RoomId, StreamPos,
    SystemClock, Timestamp, UserId, position_after,
};
use pushtally_storage::{PushStore, RotationReport};

// Re-exports
pub use config::{EngineConfig, RotationConfig};
pub use error::{EngineError, EngineResult};
pub use rotation_task::RotationTask;

/// Unread notification counting over an event log
pub struct NotificationEngine<L, C> {
    /// Committed events
    log: Arc<L>,
    /// Decides who an event notifies
    computer: C,
    /// Push action stores
    store: Arc<PushStore>,
    /// Rotation settings
    rotation: RotationConfig,
    /// Wall clock used to pick rotation targets
    clock: Arc<dyn Clock>,
}

impl<L, C> NotificationEngine<L, C>
where
    L: EventLog,
    C: ActionComputer,
{
    /// Create an engine over an opened store
    pub fn new(log: Arc<L>, computer: C, store: PushStore, rotation: RotationConfig) -> Self {
        Self {
            log,
            computer,
            store: Arc::new(store),
            rotation,
            clock: Arc::new(SystemClock),
        }
    }

    /// Open the push store described by `config` and build an engine on it
    #[instrument(skip_all, fields(data_dir = %config.data_dir.display()))]
    pub fn open(log: Arc<L>, computer: C, config: &EngineConfig) -> EngineResult<Self> {
        config.validate()?;
        let store =
            PushStore::open_with_batch_size(config.store.clone(), config.rotation.max_pairs_per_batch)?;

        info!(
            min_action_age_secs = config.rotation.min_action_age_secs,
            "Notification engine opened"
        );
        Ok(Self::new(log, computer, store, config.rotation.clone()))
    }

    /// Use a specific clock
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// The event log
    pub fn log(&self) -> &Arc<L> {
        &self.log
    }

    /// The push action stores
    pub fn store(&self) -> &PushStore {
        &self.store
    }

    /// Rotation settings
    pub fn rotation_config(&self) -> &RotationConfig {
        &self.rotation
    }

    /// Compute and stage the actions of an event that is about to be committed
    ///
    /// Returns the number of actions staged.
    #[instrument(skip_all, fields(event = %event.event_id, room = %event.room))]
    pub fn stage_event(&self, event: &NewEvent, recipients: &[UserId]) -> EngineResult<usize> {
        let actions = self.computer.compute_actions(event, recipients);
        let staged = self
            .store
            .staging()
            .stage(&event.event_id, &event.room, &actions)?;
        debug!(staged, recipients = recipients.len(), "Staged event actions");
        Ok(staged)
    }

    /// Commit an event to the log and promote its staged actions
    ///
    /// If the append fails the staged actions are abandoned and the append
    /// error is returned.
    ///
    /// If promotion fails the event stays committed but its actions stay
    /// staged, and no count includes them until [`promote`](Self::promote)
    /// is retried with the event's position. Rotation never promotes staged
    /// actions, so the caller owns that retry.
    #[instrument(skip_all, fields(event = %event.event_id, room = %event.room))]
    pub async fn commit_event(&self, event: NewEvent) -> EngineResult<Event> {
        let event_id = event.event_id.clone();

        let committed = match self.log.append(event).await {
            Ok(committed) => committed,
            Err(e) => {
                if let Err(abandon_err) = self.store.staging().abandon(&event_id) {
                    warn!(error = %abandon_err, "Failed to abandon staged actions");
                }
                return Err(e.into());
            }
        };

        if let Err(e) = self.promote(&committed.event_id, committed.position) {
            warn!(
                position = %committed.position,
                error = %e,
                "Event committed but its actions were not promoted"
            );
            return Err(e);
        }

        Ok(committed)
    }

    /// Promote the staged actions of a committed event
    ///
    /// Idempotent: promoting an event with nothing staged does nothing.
    pub fn promote(&self, event_id: &EventId, position: StreamPos) -> EngineResult<usize> {
        Ok(self.store.staging().promote(event_id, position)?)
    }

    /// Drop the staged actions of an event that will not be committed
    pub fn abandon_event(&self, event_id: &EventId) -> EngineResult<usize> {
        Ok(self.store.staging().abandon(event_id)?)
    }

    /// Move a recipient's read receipt forward
    ///
    /// Returns `false` when the receipt is not ahead of the current one.
    pub fn record_receipt(
        &self,
        room: &RoomId,
        recipient: &UserId,
        position: StreamPos,
    ) -> EngineResult<bool> {
        Ok(self.store.receipts().record_receipt(room, recipient, position)?)
    }

    /// A recipient's current read receipt
    pub fn receipt(&self, room: &RoomId, recipient: &UserId) -> EngineResult<Option<StreamPos>> {
        Ok(self.store.receipts().receipt(room, recipient)?)
    }

    /// Unread counts for actions after `position`
    pub fn counts_at(
        &self,
        room: &RoomId,
        recipient: &UserId,
        position: StreamPos,
    ) -> EngineResult<RoomCounts> {
        Ok(self.store.counts().counts_at(room, recipient, position)?)
    }

    /// Unread counts after the recipient's current receipt
    pub fn unread_counts(&self, room: &RoomId, recipient: &UserId) -> EngineResult<RoomCounts> {
        let receipt = self.receipt(room, recipient)?.unwrap_or(StreamPos::START);
        self.counts_at(room, recipient, receipt)
    }

    /// First log position whose event was received at or after `cutoff`
    pub async fn position_after(&self, cutoff: Timestamp) -> EngineResult<StreamPos> {
        Ok(position_after(self.log.as_ref(), cutoff).await?)
    }

    /// Newest position whose event is at least the minimum action age old
    ///
    /// An event received exactly the minimum age ago is old enough.
    /// [`StreamPos::START`] when the log is empty or every event is younger.
    pub async fn rotation_target(&self) -> EngineResult<StreamPos> {
        let Some(max) = self.log.max_position().await? else {
            return Ok(StreamPos::START);
        };
        let cutoff = self
            .clock
            .now()
            .saturating_sub_millis(self.rotation.min_action_age_millis());
        // First event received strictly after the cutoff
        let first_too_young = self.position_after(cutoff.saturating_add_millis(1)).await?;
        Ok(first_too_young.prev().min(max))
    }

    /// Fold receipts and rotate live actions up to `target`
    ///
    /// Runs batches on the blocking pool until the pass has caught up.
    pub async fn run_rotation_pass(&self, target: StreamPos) -> EngineResult<RotationReport> {
        let store = self.store.clone();
        let report = tokio::task::spawn_blocking(move || store.rotation().run_pass(target)).await??;
        Ok(report)
    }

    /// Run a rotation pass up to the current [`rotation_target`](Self::rotation_target)
    #[instrument(skip_all)]
    pub async fn rotate_now(&self) -> EngineResult<RotationReport> {
        let target = self.rotation_target().await?;
        let report = self.run_rotation_pass(target).await?;
        debug!(
            target = %target,
            pairs = report.pairs_processed,
            rotated = report.actions_rotated,
            skipped = report.skipped,
            "Rotation finished"
        );
        Ok(report)
    }
}
