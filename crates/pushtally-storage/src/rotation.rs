//! Rotation compactor
//!
//! Moves live actions at or below a target position behind per-thread
//! summaries, after first folding the pair's latest receipt into those
//! summaries. Both steps for one (room, recipient) pair run in a single
//! write transaction, so a rotation can never advance a boundary past a
//! receipt that has not been folded, and a failure leaves the pair exactly
//! as it was.
//!
//! ## Pass structure
//!
//! ```text
//! run_pass(target)
//!   ├─ pairs with a pending receipt fold   (batches of max_pairs_per_batch)
//!   └─ pairs with live actions             (batches of max_pairs_per_batch)
//!        └─ fold_and_rotate(room, recipient, target)   one write txn
//!             ├─ fold:    recount summaries from rotated rows above the receipt
//!             └─ rotate:  move live rows <= target behind summaries
//! ```
//!
//! Summary counts cover the rotated rows above the folded receipt, which
//! answers the common query at that receipt in one read. Rotated rows stay
//! behind as detail so every other query position, including one below the
//! receipt, is still answered exactly.

use std::collections::BTreeMap;
use std::ops::{AddAssign, Bound};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use redb::ReadableTable;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

use pushtally_core::{NotifCounts, RoomId, StreamPos, ThreadId, UserId};

use crate::error::StorageError;
use crate::records::{SummaryRecord, SummaryRow, encode};
use crate::tables::{
    ACTIVE_PAIRS, LIVE_ACTIONS, PENDING_FOLDS, PushDatabase, RECEIPTS, ROTATED_ACTIONS,
    SUMMARIES, scan_actions, scan_pairs, scan_summaries, thread_key,
};

/// Default number of (room, recipient) pairs per batch
pub const DEFAULT_MAX_PAIRS_PER_BATCH: usize = 500;

/// Outcome of a rotation step, batch, or pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RotationReport {
    /// Number of (room, recipient) fold-and-rotate steps run
    pub pairs_processed: usize,
    /// Number of pairs whose summaries were recounted for a newer receipt
    pub receipts_folded: usize,
    /// Number of live actions moved behind a summary
    pub actions_rotated: u64,
    /// Rotated actions a receipt already covered, which add no count
    pub actions_already_read: u64,
    /// Whether every queued pair has been visited
    pub caught_up: bool,
    /// Whether the pass was skipped because another pass was running
    pub skipped: bool,
}

impl RotationReport {
    /// Report for a pass that did not run
    pub fn skipped() -> Self {
        Self {
            skipped: true,
            ..Default::default()
        }
    }
}

impl AddAssign for RotationReport {
    fn add_assign(&mut self, rhs: Self) {
        self.pairs_processed += rhs.pairs_processed;
        self.receipts_folded += rhs.receipts_folded;
        self.actions_rotated += rhs.actions_rotated;
        self.actions_already_read += rhs.actions_already_read;
        self.caught_up = rhs.caught_up;
        self.skipped |= rhs.skipped;
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
enum Phase {
    #[default]
    PendingFolds,
    ActivePairs,
    Done,
}

/// Resume point of a pass that runs in several batches
#[derive(Debug, Clone, Default)]
pub struct RotationCursor {
    phase: Phase,
    after: Option<(RoomId, UserId)>,
}

impl RotationCursor {
    /// Cursor at the start of a pass
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether every queued pair has been visited
    pub fn is_done(&self) -> bool {
        self.phase == Phase::Done
    }

    fn next_phase(&mut self) {
        self.phase = match self.phase {
            Phase::PendingFolds => Phase::ActivePairs,
            Phase::ActivePairs | Phase::Done => Phase::Done,
        };
        self.after = None;
    }
}

/// Clears the running flag when a pass ends, including on error
struct PassGuard<'a>(&'a AtomicBool);

impl<'a> PassGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for PassGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Folds receipts into summaries and rotates live actions behind them
pub struct RotationCompactor {
    storage: Arc<PushDatabase>,
    max_pairs_per_batch: usize,
    running: AtomicBool,
}

impl RotationCompactor {
    /// Create a new compactor
    pub fn new(storage: Arc<PushDatabase>) -> Self {
        Self {
            storage,
            max_pairs_per_batch: DEFAULT_MAX_PAIRS_PER_BATCH,
            running: AtomicBool::new(false),
        }
    }

    /// Set the number of pairs processed per batch (at least one)
    pub fn with_max_pairs_per_batch(mut self, max_pairs_per_batch: usize) -> Self {
        self.max_pairs_per_batch = max_pairs_per_batch.max(1);
        self
    }

    /// Number of pairs processed per batch
    pub fn max_pairs_per_batch(&self) -> usize {
        self.max_pairs_per_batch
    }

    /// Run batches until every queued pair has been folded and rotated
    ///
    /// Only one pass runs at a time; a call made while another pass is in
    /// progress returns [`RotationReport::skipped`] immediately. Re-running
    /// a completed pass with the same target changes nothing.
    #[instrument(skip_all, fields(target = %target))]
    pub fn run_pass(&self, target: StreamPos) -> Result<RotationReport, StorageError> {
        let Some(_guard) = PassGuard::acquire(&self.running) else {
            debug!("Rotation pass already running, skipping");
            return Ok(RotationReport::skipped());
        };

        let mut cursor = RotationCursor::new();
        let mut report = RotationReport::default();
        let mut batches = 0usize;
        while !cursor.is_done() {
            report += self.run_batch(target, &mut cursor)?;
            batches += 1;
        }
        report.caught_up = true;

        info!(
            batches,
            pairs = report.pairs_processed,
            folded = report.receipts_folded,
            rotated = report.actions_rotated,
            already_read = report.actions_already_read,
            "Rotation pass complete"
        );
        Ok(report)
    }

    /// Process up to one batch of pairs, resuming from `cursor`
    pub fn run_batch(
        &self,
        target: StreamPos,
        cursor: &mut RotationCursor,
    ) -> Result<RotationReport, StorageError> {
        let mut report = RotationReport::default();

        while !cursor.is_done() && report.pairs_processed < self.max_pairs_per_batch {
            let wanted = self.max_pairs_per_batch - report.pairs_processed;
            let pairs = self.next_pairs(cursor, wanted)?;
            let exhausted = pairs.len() < wanted;

            for (room, recipient) in &pairs {
                report += self.fold_and_rotate(room, recipient, target)?;
            }

            if exhausted {
                cursor.next_phase();
            } else {
                cursor.after = pairs.into_iter().last();
            }
        }

        report.caught_up = cursor.is_done();
        debug!(
            pairs = report.pairs_processed,
            caught_up = report.caught_up,
            "Rotation batch complete"
        );
        Ok(report)
    }

    fn next_pairs(
        &self,
        cursor: &RotationCursor,
        limit: usize,
    ) -> Result<Vec<(RoomId, UserId)>, StorageError> {
        let after = cursor
            .after
            .as_ref()
            .map(|(room, recipient)| (room.as_str(), recipient.as_str()));

        let read_txn = self.storage.db().begin_read()?;
        match cursor.phase {
            Phase::PendingFolds => {
                let table = read_txn.open_table(PENDING_FOLDS)?;
                scan_pairs(&table, after, limit)
            }
            Phase::ActivePairs => {
                let table = read_txn.open_table(ACTIVE_PAIRS)?;
                scan_pairs(&table, after, limit)
            }
            Phase::Done => Ok(Vec::new()),
        }
    }

    /// Fold the pair's receipt into its summaries, then rotate up to `target`
    ///
    /// Runs as one write transaction.
    #[instrument(skip_all, fields(room = %room, recipient = %recipient, target = %target))]
    pub fn fold_and_rotate(
        &self,
        room: &RoomId,
        recipient: &UserId,
        target: StreamPos,
    ) -> Result<RotationReport, StorageError> {
        let (room, recipient) = (room.as_str(), recipient.as_str());
        let pair = (room, recipient);
        let mut report = RotationReport {
            pairs_processed: 1,
            ..Default::default()
        };

        let write_txn = self.storage.db().begin_write()?;
        {
            let receipts = write_txn.open_table(RECEIPTS)?;
            let receipt = receipts
                .get(pair)?
                .map(|v| StreamPos::new(v.value()))
                .unwrap_or(StreamPos::START);

            let mut pending = write_txn.open_table(PENDING_FOLDS)?;
            let mut summary_table = write_txn.open_table(SUMMARIES)?;
            let mut rotated = write_txn.open_table(ROTATED_ACTIONS)?;
            let mut live = write_txn.open_table(LIVE_ACTIONS)?;
            let mut active = write_txn.open_table(ACTIVE_PAIRS)?;

            let stored: BTreeMap<Option<ThreadId>, SummaryRecord> =
                scan_summaries(&summary_table, room, recipient)?
                    .into_iter()
                    .collect();
            let mut summaries = stored.clone();

            // Fold. Must complete before any boundary below moves.
            pending.remove(pair)?;
            if summaries.values().any(|s| s.last_receipt < receipt) {
                for summary in summaries.values_mut() {
                    summary.counts = NotifCounts::default();
                    summary.last_receipt = summary.last_receipt.max(receipt);
                }
                let unread = scan_actions(
                    &rotated,
                    room,
                    recipient,
                    (Bound::Excluded(receipt.get()), Bound::Unbounded),
                )?;
                for (_, row) in unread {
                    summaries
                        .entry(row.thread)
                        .or_insert_with(|| SummaryRecord::new(receipt))
                        .counts
                        .record(row.kind);
                }
                report.receipts_folded = 1;
            }

            // Rotate. Rows the recipient has read move too but add nothing.
            let eligible = scan_actions(&live, room, recipient, ..=target.get())?;
            for (position, row) in eligible {
                live.remove((room, recipient, position.get()))?;
                rotated.insert((room, recipient, position.get()), encode(&row)?.as_slice())?;

                let summary = summaries
                    .entry(row.thread)
                    .or_insert_with(|| SummaryRecord::new(receipt));
                if position > summary.last_receipt {
                    summary.counts.record(row.kind);
                } else {
                    report.actions_already_read += 1;
                }
                summary.boundary = summary.boundary.max(position);
                report.actions_rotated += 1;
            }

            for (thread, summary) in &summaries {
                if stored.get(thread) != Some(summary) {
                    summary_table.insert(
                        (room, recipient, thread_key(thread.as_ref())),
                        encode(summary)?.as_slice(),
                    )?;
                }
            }

            let has_live = live
                .range((room, recipient, 0)..=(room, recipient, u64::MAX))?
                .next()
                .is_some();
            if !has_live {
                active.remove(pair)?;
            }
        }
        write_txn.commit()?;

        if report.actions_rotated > 0 || report.receipts_folded > 0 {
            debug!(
                folded = report.receipts_folded,
                rotated = report.actions_rotated,
                already_read = report.actions_already_read,
                "Folded and rotated pair"
            );
        }
        Ok(report)
    }

    /// Rotation summaries of a (room, recipient), main timeline first
    pub fn summaries(
        &self,
        room: &RoomId,
        recipient: &UserId,
    ) -> Result<Vec<SummaryRow>, StorageError> {
        let read_txn = self.storage.db().begin_read()?;
        let table = read_txn.open_table(SUMMARIES)?;
        Ok(scan_summaries(&table, room.as_str(), recipient.as_str())?
            .into_iter()
            .map(|(thread, record)| SummaryRow {
                room: room.clone(),
                recipient: recipient.clone(),
                thread,
                counts: record.counts,
                boundary: record.boundary,
                last_receipt: record.last_receipt,
            })
            .collect())
    }

    /// Number of rotated actions held as detail for a (room, recipient)
    pub fn rotated_count(&self, room: &RoomId, recipient: &UserId) -> Result<usize, StorageError> {
        let read_txn = self.storage.db().begin_read()?;
        let table = read_txn.open_table(ROTATED_ACTIONS)?;
        Ok(scan_actions(&table, room.as_str(), recipient.as_str(), ..)?.len())
    }
}
