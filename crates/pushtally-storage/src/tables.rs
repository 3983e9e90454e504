//! redb table definitions and database manager
//!
//! Every table is keyed by tuples whose leading elements are the room and
//! the recipient, so all rows of one (room, recipient) pair are contiguous
//! and a pair can be scanned with a single range.

use std::ops::{Bound, RangeBounds};
use std::path::PathBuf;

use redb::{Database, ReadableTable, TableDefinition};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

use pushtally_core::{RoomId, StreamPos, ThreadId, UserId};

use crate::error::StorageError;
use crate::records::{ActionRecord, SummaryRecord, decode};

/// Key of the position-ordered action tables: (room, recipient, position)
pub(crate) type ActionKey = (&'static str, &'static str, u64);
/// Key of the summary table: (room, recipient, thread key)
pub(crate) type SummaryKey = (&'static str, &'static str, &'static str);
/// Key of the per-pair tables: (room, recipient)
pub(crate) type PairKey = (&'static str, &'static str);

// Key: (event_id, recipient), Value: serialized StagedActionRecord
pub(crate) const STAGED_ACTIONS: TableDefinition<(&str, &str), &[u8]> =
    TableDefinition::new("staged_actions");

// Key: (room, recipient, position), Value: serialized ActionRecord
pub(crate) const LIVE_ACTIONS: TableDefinition<ActionKey, &[u8]> =
    TableDefinition::new("live_actions");

// Actions already folded into a summary, kept until a receipt passes them.
// Key: (room, recipient, position), Value: serialized ActionRecord
pub(crate) const ROTATED_ACTIONS: TableDefinition<ActionKey, &[u8]> =
    TableDefinition::new("rotated_actions");

// Key: (room, recipient, thread key), Value: serialized SummaryRecord
pub(crate) const SUMMARIES: TableDefinition<SummaryKey, &[u8]> =
    TableDefinition::new("rotation_summaries");

// Key: (room, recipient), Value: receipt position
pub(crate) const RECEIPTS: TableDefinition<PairKey, u64> = TableDefinition::new("receipts");

// Pairs whose receipt advanced since the last fold.
// Key: (room, recipient), Value: receipt position at enqueue time
pub(crate) const PENDING_FOLDS: TableDefinition<PairKey, u64> =
    TableDefinition::new("pending_folds");

// Pairs with at least one live action. Key: (room, recipient)
pub(crate) const ACTIVE_PAIRS: TableDefinition<PairKey, ()> = TableDefinition::new("active_pairs");

/// Thread key used for the main timeline
///
/// Thread ids are event ids and are never empty.
pub(crate) const MAIN_THREAD_KEY: &str = "";

/// Encode an optional thread as a summary key component
pub(crate) fn thread_key(thread: Option<&ThreadId>) -> &str {
    thread.map(ThreadId::as_str).unwrap_or(MAIN_THREAD_KEY)
}

/// Decode a summary key component back into an optional thread
pub(crate) fn thread_from_key(key: &str) -> Option<ThreadId> {
    (key != MAIN_THREAD_KEY).then(|| ThreadId::from(key))
}

/// Configuration for the push action database
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PushStoreConfig {
    /// Path to the database file
    pub db_path: PathBuf,
    /// Cache size in bytes
    pub cache_size: usize,
    /// Keep the database in memory instead of at `db_path`
    pub in_memory: bool,
}

impl Default for PushStoreConfig {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from("./data/pushtally.redb"),
            cache_size: 64 * 1024 * 1024, // 64MB
            in_memory: false,
        }
    }
}

impl PushStoreConfig {
    /// Configuration for a throwaway in-memory database
    pub fn in_memory() -> Self {
        Self {
            in_memory: true,
            ..Default::default()
        }
    }

    /// Configuration for a database file at `db_path`
    pub fn at(db_path: impl Into<PathBuf>) -> Self {
        Self {
            db_path: db_path.into(),
            ..Default::default()
        }
    }
}

/// The redb database holding every push action table
pub struct PushDatabase {
    db: Database,
    config: PushStoreConfig,
}

impl PushDatabase {
    /// Open or create the database
    #[instrument(skip(config), fields(path = %config.db_path.display(), in_memory = config.in_memory))]
    pub fn open(config: PushStoreConfig) -> Result<Self, StorageError> {
        let mut builder = Database::builder();
        builder.set_cache_size(config.cache_size);

        let db = if config.in_memory {
            builder.create_with_backend(redb::backends::InMemoryBackend::new())?
        } else {
            if let Some(parent) = config.db_path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            builder.create(&config.db_path)?
        };

        info!("Opened push action database");

        let database = Self { db, config };
        database.init_tables()?;
        Ok(database)
    }

    /// Open a fresh in-memory database
    pub fn in_memory() -> Result<Self, StorageError> {
        Self::open(PushStoreConfig::in_memory())
    }

    /// Create every table so read transactions never see a missing one
    fn init_tables(&self) -> Result<(), StorageError> {
        let write_txn = self.db.begin_write()?;
        write_txn.open_table(STAGED_ACTIONS)?;
        write_txn.open_table(LIVE_ACTIONS)?;
        write_txn.open_table(ROTATED_ACTIONS)?;
        write_txn.open_table(SUMMARIES)?;
        write_txn.open_table(RECEIPTS)?;
        write_txn.open_table(PENDING_FOLDS)?;
        write_txn.open_table(ACTIVE_PAIRS)?;
        write_txn.commit()?;

        debug!("Initialized push action tables");
        Ok(())
    }

    /// Get a reference to the database
    pub fn db(&self) -> &Database {
        &self.db
    }

    /// Get the configuration
    pub fn config(&self) -> &PushStoreConfig {
        &self.config
    }
}

/// Inclusive position bounds of `range`, `None` if it is empty
fn inclusive_bounds(range: &impl RangeBounds<u64>) -> Option<(u64, u64)> {
    let first = match range.start_bound() {
        Bound::Included(&p) => p,
        Bound::Excluded(&p) => p.checked_add(1)?,
        Bound::Unbounded => 0,
    };
    let last = match range.end_bound() {
        Bound::Included(&p) => p,
        Bound::Excluded(&p) => p.checked_sub(1)?,
        Bound::Unbounded => u64::MAX,
    };
    (first <= last).then_some((first, last))
}

/// Actions of one (room, recipient) pair whose position lies in `positions`
pub(crate) fn scan_actions<T>(
    table: &T,
    room: &str,
    recipient: &str,
    positions: impl RangeBounds<u64>,
) -> Result<Vec<(StreamPos, ActionRecord)>, StorageError>
where
    T: ReadableTable<ActionKey, &'static [u8]>,
{
    let Some((first, last)) = inclusive_bounds(&positions) else {
        return Ok(Vec::new());
    };

    let mut rows = Vec::new();
    for entry in table.range((room, recipient, first)..=(room, recipient, last))? {
        let (key, value) = entry?;
        let (_, _, position) = key.value();
        rows.push((StreamPos::new(position), decode(value.value())?));
    }
    Ok(rows)
}

/// All rotation summaries of one (room, recipient) pair
pub(crate) fn scan_summaries<T>(
    table: &T,
    room: &str,
    recipient: &str,
) -> Result<Vec<(Option<ThreadId>, SummaryRecord)>, StorageError>
where
    T: ReadableTable<SummaryKey, &'static [u8]>,
{
    let mut rows = Vec::new();
    for entry in table.range((room, recipient, MAIN_THREAD_KEY)..)? {
        let (key, value) = entry?;
        let (key_room, key_recipient, key_thread) = key.value();

        // Stop when we're past the pair
        if key_room != room || key_recipient != recipient {
            break;
        }

        rows.push((thread_from_key(key_thread), decode(value.value())?));
    }
    Ok(rows)
}

/// Up to `limit` (room, recipient) pairs from a per-pair table, in key
/// order, starting after `after`
pub(crate) fn scan_pairs<T, V>(
    table: &T,
    after: Option<(&str, &str)>,
    limit: usize,
) -> Result<Vec<(RoomId, UserId)>, StorageError>
where
    T: ReadableTable<PairKey, V>,
    V: redb::Value + 'static,
{
    let entries = match after {
        Some(key) => table.range((Bound::Excluded(key), Bound::Unbounded))?,
        None => table.iter()?,
    };

    let mut pairs = Vec::new();
    for entry in entries.take(limit) {
        let (key, _) = entry?;
        let (room, recipient) = key.value();
        pairs.push((RoomId::from(room), UserId::from(recipient)));
    }
    Ok(pairs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::encode;
    use pushtally_core::ActionKind;
    use tempfile::TempDir;

    fn put_action(db: &PushDatabase, room: &str, user: &str, position: u64) {
        let write_txn = db.db().begin_write().unwrap();
        {
            let mut table = write_txn.open_table(LIVE_ACTIONS).unwrap();
            let record = ActionRecord {
                thread: None,
                kind: ActionKind::Notify,
            };
            table
                .insert((room, user, position), encode(&record).unwrap().as_slice())
                .unwrap();
        }
        write_txn.commit().unwrap();
    }

    #[test]
    fn test_open_on_disk() {
        let temp_dir = TempDir::new().unwrap();
        let config = PushStoreConfig::at(temp_dir.path().join("nested").join("push.redb"));
        let db = PushDatabase::open(config).unwrap();
        assert!(db.config().db_path.exists());
    }

    #[test]
    fn test_scan_actions_is_scoped_to_pair() {
        let db = PushDatabase::in_memory().unwrap();
        for position in [1, 5, 9] {
            put_action(&db, "!a", "@u", position);
        }
        put_action(&db, "!a", "@v", 3);
        put_action(&db, "!b", "@u", 4);

        let read_txn = db.db().begin_read().unwrap();
        let table = read_txn.open_table(LIVE_ACTIONS).unwrap();

        let all = scan_actions(&table, "!a", "@u", ..).unwrap();
        let positions: Vec<u64> = all.iter().map(|(p, _)| p.get()).collect();
        assert_eq!(positions, vec![1, 5, 9]);

        let after = scan_actions(&table, "!a", "@u", (Bound::Excluded(5), Bound::Unbounded)).unwrap();
        assert_eq!(after.len(), 1);

        let up_to = scan_actions(&table, "!a", "@u", ..=5).unwrap();
        assert_eq!(up_to.len(), 2);

        assert!(scan_actions(&table, "!a", "@u", (Bound::Excluded(u64::MAX), Bound::Unbounded))
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_thread_key_round_trip() {
        let thread = ThreadId::from("$root");
        assert_eq!(thread_from_key(thread_key(Some(&thread))), Some(thread));
        assert_eq!(thread_from_key(thread_key(None)), None);
    }
}
