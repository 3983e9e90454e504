//! Receipt tracker
//!
//! Stores the latest read position per (room, recipient). A receipt that
//! advances read state also queues the pair for a fold on the next rotation
//! pass; the summaries themselves are left untouched here.

use std::sync::Arc;

use redb::{ReadableTable, ReadableTableMetadata};
use tracing::{debug, instrument};

use pushtally_core::{RoomId, StreamPos, UserId};

use crate::error::StorageError;
use crate::tables::{PENDING_FOLDS, PushDatabase, RECEIPTS};

/// Latest read position per (room, recipient)
pub struct ReceiptStore {
    storage: Arc<PushDatabase>,
}

impl ReceiptStore {
    /// Create a new receipt store
    pub fn new(storage: Arc<PushDatabase>) -> Self {
        Self { storage }
    }

    /// Record that `recipient` has read `room` up to `position`
    ///
    /// Returns `true` if the stored receipt advanced. Receipts at or below
    /// the current one are ignored, and a recipient without a receipt reads
    /// from [`StreamPos::START`].
    #[instrument(skip_all, fields(room = %room, recipient = %recipient, position = %position))]
    pub fn record_receipt(
        &self,
        room: &RoomId,
        recipient: &UserId,
        position: StreamPos,
    ) -> Result<bool, StorageError> {
        let key = (room.as_str(), recipient.as_str());

        let write_txn = self.storage.db().begin_write()?;
        let current = {
            let mut receipts = write_txn.open_table(RECEIPTS)?;
            let current = receipts
                .get(key)?
                .map(|v| StreamPos::new(v.value()))
                .unwrap_or(StreamPos::START);

            if position > current {
                receipts.insert(key, position.get())?;
                let mut folds = write_txn.open_table(PENDING_FOLDS)?;
                folds.insert(key, position.get())?;
            }
            current
        };

        if position <= current {
            write_txn.abort()?;
            debug!(current = %current, "Ignored receipt that does not advance read state");
            return Ok(false);
        }

        write_txn.commit()?;
        debug!(previous = %current, "Receipt advanced");
        Ok(true)
    }

    /// Current receipt for a (room, recipient), `None` if none was recorded
    pub fn receipt(
        &self,
        room: &RoomId,
        recipient: &UserId,
    ) -> Result<Option<StreamPos>, StorageError> {
        let read_txn = self.storage.db().begin_read()?;
        let receipts = read_txn.open_table(RECEIPTS)?;
        Ok(receipts
            .get((room.as_str(), recipient.as_str()))?
            .map(|v| StreamPos::new(v.value())))
    }

    /// Number of pairs with a receipt not yet folded into their summaries
    pub fn pending_folds(&self) -> Result<u64, StorageError> {
        let read_txn = self.storage.db().begin_read()?;
        let folds = read_txn.open_table(PENDING_FOLDS)?;
        Ok(folds.len()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_store() -> ReceiptStore {
        ReceiptStore::new(Arc::new(PushDatabase::in_memory().unwrap()))
    }

    #[test]
    fn test_receipt_only_advances() {
        let store = create_store();
        let room = RoomId::from("!room");
        let user = UserId::from("@alice");

        assert_eq!(store.receipt(&room, &user).unwrap(), None);
        assert!(store.record_receipt(&room, &user, StreamPos::new(5)).unwrap());
        assert!(!store.record_receipt(&room, &user, StreamPos::new(3)).unwrap());
        assert!(!store.record_receipt(&room, &user, StreamPos::new(5)).unwrap());
        assert_eq!(store.receipt(&room, &user).unwrap(), Some(StreamPos::new(5)));

        assert!(store.record_receipt(&room, &user, StreamPos::new(9)).unwrap());
        assert_eq!(store.receipt(&room, &user).unwrap(), Some(StreamPos::new(9)));
    }

    #[test]
    fn test_receipt_at_start_does_not_advance() {
        let store = create_store();
        let room = RoomId::from("!room");
        let user = UserId::from("@alice");

        assert!(!store.record_receipt(&room, &user, StreamPos::START).unwrap());
        assert_eq!(store.receipt(&room, &user).unwrap(), None);
        assert_eq!(store.pending_folds().unwrap(), 0);
    }

    #[test]
    fn test_advance_queues_fold() {
        let store = create_store();
        let room = RoomId::from("!room");

        store
            .record_receipt(&room, &UserId::from("@alice"), StreamPos::new(2))
            .unwrap();
        store
            .record_receipt(&room, &UserId::from("@alice"), StreamPos::new(4))
            .unwrap();
        store
            .record_receipt(&room, &UserId::from("@bob"), StreamPos::new(1))
            .unwrap();

        assert_eq!(store.pending_folds().unwrap(), 2);
    }
}
