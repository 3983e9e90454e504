//! Staging buffer and live action store
//!
//! Actions are staged against an event before the event has a position.
//! Promotion binds them to the committed position and moves them into the
//! live table in a single write transaction, so a retried promotion can
//! never land the same actions twice.

use std::sync::Arc;

use redb::ReadableTable;
use tracing::{debug, instrument, warn};

use pushtally_core::{EventId, PushAction, RoomId, StreamPos, UserId};

use crate::error::StorageError;
use crate::records::{ActionRecord, StagedActionRecord, decode, encode};
use crate::tables::{ACTIVE_PAIRS, LIVE_ACTIONS, PushDatabase, STAGED_ACTIONS, scan_actions};

/// Staged and live notification actions
pub struct StagingStore {
    storage: Arc<PushDatabase>,
}

impl StagingStore {
    /// Create a new staging store
    pub fn new(storage: Arc<PushDatabase>) -> Self {
        Self { storage }
    }

    /// Stage `actions` for an event that has not been committed yet
    ///
    /// An event carries at most one action per recipient; a later action for
    /// the same recipient replaces the earlier one, including actions staged
    /// by a previous call for the same event. Returns the number of
    /// recipients now staged for the event.
    #[instrument(skip_all, fields(event_id = %event_id, room = %room, actions = actions.len()))]
    pub fn stage(
        &self,
        event_id: &EventId,
        room: &RoomId,
        actions: &[PushAction],
    ) -> Result<usize, StorageError> {
        let write_txn = self.storage.db().begin_write()?;
        {
            let mut staged = write_txn.open_table(STAGED_ACTIONS)?;
            for action in actions {
                let record = StagedActionRecord {
                    room: room.clone(),
                    thread: action.thread.clone(),
                    kind: action.kind,
                };
                let value = encode(&record)?;
                staged.insert(
                    (event_id.as_str(), action.recipient.as_str()),
                    value.as_slice(),
                )?;
            }
        }
        write_txn.commit()?;

        let count = self.staged_count(event_id)?;
        debug!(staged = count, "Staged actions");
        Ok(count)
    }

    /// Move every staged action of `event_id` into the live store at `position`
    ///
    /// Returns the number of actions promoted. Promoting an event with
    /// nothing staged (already promoted, abandoned, or never staged) is a
    /// no-op returning zero.
    #[instrument(skip_all, fields(event_id = %event_id, position = %position))]
    pub fn promote(&self, event_id: &EventId, position: StreamPos) -> Result<usize, StorageError> {
        let write_txn = self.storage.db().begin_write()?;
        let promoted = {
            let mut staged = write_txn.open_table(STAGED_ACTIONS)?;
            let mut live = write_txn.open_table(LIVE_ACTIONS)?;
            let mut active = write_txn.open_table(ACTIVE_PAIRS)?;

            let entries = staged_for(&staged, event_id)?;
            for (recipient, record) in &entries {
                let row = ActionRecord {
                    thread: record.thread.clone(),
                    kind: record.kind,
                };
                let value = encode(&row)?;
                live.insert(
                    (record.room.as_str(), recipient.as_str(), position.get()),
                    value.as_slice(),
                )?;
                active.insert((record.room.as_str(), recipient.as_str()), ())?;
                staged.remove((event_id.as_str(), recipient.as_str()))?;
            }
            entries.len()
        };
        write_txn.commit()?;

        if promoted == 0 {
            debug!("Nothing staged, promotion is a no-op");
        } else {
            debug!(promoted, "Promoted staged actions");
        }
        Ok(promoted)
    }

    /// Discard the staged actions of an event that will never be committed
    ///
    /// Returns the number of actions discarded.
    #[instrument(skip_all, fields(event_id = %event_id))]
    pub fn abandon(&self, event_id: &EventId) -> Result<usize, StorageError> {
        let write_txn = self.storage.db().begin_write()?;
        let discarded = {
            let mut staged = write_txn.open_table(STAGED_ACTIONS)?;
            let entries = staged_for(&staged, event_id)?;
            for (recipient, _) in &entries {
                staged.remove((event_id.as_str(), recipient.as_str()))?;
            }
            entries.len()
        };
        write_txn.commit()?;

        if discarded > 0 {
            warn!(discarded, "Abandoned staged actions");
        }
        Ok(discarded)
    }

    /// Number of actions currently staged for an event
    pub fn staged_count(&self, event_id: &EventId) -> Result<usize, StorageError> {
        let read_txn = self.storage.db().begin_read()?;
        let staged = read_txn.open_table(STAGED_ACTIONS)?;
        Ok(staged_for(&staged, event_id)?.len())
    }

    /// Number of live (not yet rotated) actions for a (room, recipient)
    pub fn live_count(&self, room: &RoomId, recipient: &UserId) -> Result<usize, StorageError> {
        let read_txn = self.storage.db().begin_read()?;
        let live = read_txn.open_table(LIVE_ACTIONS)?;
        Ok(scan_actions(&live, room.as_str(), recipient.as_str(), ..)?.len())
    }
}

/// Staged actions of one event, keyed by recipient
fn staged_for<T>(
    table: &T,
    event_id: &EventId,
) -> Result<Vec<(UserId, StagedActionRecord)>, StorageError>
where
    T: ReadableTable<(&'static str, &'static str), &'static [u8]>,
{
    let mut entries = Vec::new();
    for entry in table.range((event_id.as_str(), "")..)? {
        let (key, value) = entry?;
        let (key_event, recipient) = key.value();

        // Stop when we're past the event
        if key_event != event_id.as_str() {
            break;
        }

        entries.push((UserId::from(recipient), decode(value.value())?));
    }
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pushtally_core::ActionKind;

    fn create_store() -> StagingStore {
        StagingStore::new(Arc::new(PushDatabase::in_memory().unwrap()))
    }

    fn actions() -> Vec<PushAction> {
        vec![
            PushAction::new("@alice", ActionKind::Notify),
            PushAction::new("@bob", ActionKind::Highlight).in_thread("$root"),
        ]
    }

    #[test]
    fn test_stage_and_promote() {
        let store = create_store();
        let event = EventId::from("$e1");
        let room = RoomId::from("!room");

        assert_eq!(store.stage(&event, &room, &actions()).unwrap(), 2);
        assert_eq!(store.promote(&event, StreamPos::new(7)).unwrap(), 2);

        assert_eq!(store.staged_count(&event).unwrap(), 0);
        assert_eq!(store.live_count(&room, &UserId::from("@alice")).unwrap(), 1);
        assert_eq!(store.live_count(&room, &UserId::from("@bob")).unwrap(), 1);
    }

    #[test]
    fn test_promote_is_idempotent() {
        let store = create_store();
        let event = EventId::from("$e1");
        let room = RoomId::from("!room");

        store.stage(&event, &room, &actions()).unwrap();
        assert_eq!(store.promote(&event, StreamPos::new(7)).unwrap(), 2);
        assert_eq!(store.promote(&event, StreamPos::new(7)).unwrap(), 0);
        assert_eq!(store.live_count(&room, &UserId::from("@alice")).unwrap(), 1);
    }

    #[test]
    fn test_abandon_discards_staged() {
        let store = create_store();
        let event = EventId::from("$e1");
        let room = RoomId::from("!room");

        store.stage(&event, &room, &actions()).unwrap();
        assert_eq!(store.abandon(&event).unwrap(), 2);
        assert_eq!(store.promote(&event, StreamPos::new(7)).unwrap(), 0);
        assert_eq!(store.live_count(&room, &UserId::from("@alice")).unwrap(), 0);
    }

    #[test]
    fn test_restage_replaces_recipient_action() {
        let store = create_store();
        let event = EventId::from("$e1");
        let room = RoomId::from("!room");

        store.stage(&event, &room, &actions()).unwrap();
        let count = store
            .stage(&event, &room, &[PushAction::new("@alice", ActionKind::Highlight)])
            .unwrap();
        assert_eq!(count, 2);
    }

    #[test]
    fn test_events_do_not_share_staging() {
        let store = create_store();
        let room = RoomId::from("!room");

        store.stage(&EventId::from("$e1"), &room, &actions()).unwrap();
        store.stage(&EventId::from("$e10"), &room, &actions()[..1]).unwrap();

        assert_eq!(store.abandon(&EventId::from("$e1")).unwrap(), 2);
        assert_eq!(store.staged_count(&EventId::from("$e10")).unwrap(), 1);
    }
}
