//! # Pushtally Storage
//!
//! Storage engine for unread notification counts.
//!
//! All state lives in one redb database, so every mutation is a single
//! atomic write transaction and every read is a consistent snapshot.
//!
//! ## Components
//!
//! - **StagingStore**: stages actions for uncommitted events and promotes
//!   them into the live store at commit
//! - **ReceiptStore**: forward-only read receipts per (room, recipient)
//! - **CountAggregator**: unread counts from live actions plus summaries
//! - **RotationCompactor**: folds receipts into summaries and rotates live
//!   actions behind them
//! - **FileEventLog**: durable append-only event log
//!
//! ## Example
//!
//! ```rust,ignore
//! use pushtally_core::{ActionKind, EventId, PushAction, RoomId, StreamPos, UserId};
//! use pushtally_storage::{PushStore, PushStoreConfig};
//!
//! let store = PushStore::open(PushStoreConfig::in_memory())?;
//! let room = RoomId::from("!room");
//! let event = EventId::from("$event");
//!
//! store.staging().stage(&event, &room, &[PushAction::new("@alice", ActionKind::Notify)])?;
//! store.staging().promote(&event, StreamPos::new(1))?;
//!
//! let counts = store.counts().counts_at(&room, &UserId::from("@alice"), StreamPos::START)?;
//! assert_eq!(counts.main.notify_count, 1);
//! ```

pub mod append_log;
pub mod counts;
pub mod error;
pub mod receipts;
pub mod records;
pub mod rotation;
pub mod staging;
pub mod tables;

use std::sync::Arc;

use tracing::{info, instrument};

// Re-exports
pub use append_log::{EventLogConfig, FileEventLog};
pub use counts::CountAggregator;
pub use error::StorageError;
pub use receipts::ReceiptStore;
pub use records::SummaryRow;
pub use rotation::{
    DEFAULT_MAX_PAIRS_PER_BATCH, RotationCompactor, RotationCursor, RotationReport,
};
pub use staging::StagingStore;
pub use tables::{PushDatabase, PushStoreConfig};

/// All push action stores over one shared database
pub struct PushStore {
    /// Shared database
    db: Arc<PushDatabase>,
    /// Staged and live actions
    staging: StagingStore,
    /// Read receipts
    receipts: ReceiptStore,
    /// Read path
    counts: CountAggregator,
    /// Background compaction
    rotation: RotationCompactor,
}

impl PushStore {
    /// Open the stores with the default rotation batch size
    pub fn open(config: PushStoreConfig) -> Result<Self, StorageError> {
        Self::open_with_batch_size(config, DEFAULT_MAX_PAIRS_PER_BATCH)
    }

    /// Open the stores, rotating at most `max_pairs_per_batch` pairs per batch
    #[instrument(skip(config), fields(in_memory = config.in_memory))]
    pub fn open_with_batch_size(
        config: PushStoreConfig,
        max_pairs_per_batch: usize,
    ) -> Result<Self, StorageError> {
        let db = Arc::new(PushDatabase::open(config)?);

        let staging = StagingStore::new(db.clone());
        let receipts = ReceiptStore::new(db.clone());
        let counts = CountAggregator::new(db.clone());
        let rotation =
            RotationCompactor::new(db.clone()).with_max_pairs_per_batch(max_pairs_per_batch);

        info!(max_pairs_per_batch, "Push store initialized");

        Ok(Self {
            db,
            staging,
            receipts,
            counts,
            rotation,
        })
    }

    /// Get the staging store
    pub fn staging(&self) -> &StagingStore {
        &self.staging
    }

    /// Get the receipt store
    pub fn receipts(&self) -> &ReceiptStore {
        &self.receipts
    }

    /// Get the count aggregator
    pub fn counts(&self) -> &CountAggregator {
        &self.counts
    }

    /// Get the rotation compactor
    pub fn rotation(&self) -> &RotationCompactor {
        &self.rotation
    }

    /// Get the underlying database
    pub fn database(&self) -> &PushDatabase {
        &self.db
    }
}
