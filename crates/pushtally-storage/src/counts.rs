//! Count aggregator
//!
//! Answers unread counts for a (room, recipient) by combining the rotation
//! summaries with the live actions, all inside one read transaction. A
//! concurrent rotation commits atomically, so the snapshot either sees an
//! action as live or as rotated, never neither or both.
//!
//! A summary's counts cover exactly the rotated actions in
//! `(last_receipt, boundary]` for its key. For a query position `Q`:
//!
//! - `Q >= boundary`: nothing rotated lies above `Q`, the summary contributes
//!   zero
//! - `Q == last_receipt`: use the counts as is
//! - otherwise: count the rotated detail in `(Q, boundary]` directly. This
//!   covers a receipt that moved since the last fold as well as positions
//!   below the receipt.

use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::Arc;

use redb::ReadableTable;
use tracing::{instrument, trace};

use pushtally_core::{NotifCounts, RoomCounts, RoomId, StreamPos, ThreadId, UserId};

use crate::error::StorageError;
use crate::tables::{
    LIVE_ACTIONS, PushDatabase, ROTATED_ACTIONS, SUMMARIES, scan_actions,
    scan_summaries,
};

/// Read path combining live actions, summaries and rotated detail
pub struct CountAggregator {
    storage: Arc<PushDatabase>,
}

impl CountAggregator {
    /// Create a new count aggregator
    pub fn new(storage: Arc<PushDatabase>) -> Self {
        Self { storage }
    }

    /// Unread counts for `recipient` in `room` after `position`
    ///
    /// Counts every action with a position above `position`, whatever the
    /// recipient's receipt. Unknown rooms, recipients and threads report
    /// zero.
    #[instrument(skip_all, fields(room = %room, recipient = %recipient, position = %position))]
    pub fn counts_at(
        &self,
        room: &RoomId,
        recipient: &UserId,
        position: StreamPos,
    ) -> Result<RoomCounts, StorageError> {
        let (room, recipient) = (room.as_str(), recipient.as_str());
        let read_txn = self.storage.db().begin_read()?;

        let mut totals: BTreeMap<Option<ThreadId>, NotifCounts> = BTreeMap::new();
        totals.insert(None, NotifCounts::default());

        let summaries = read_txn.open_table(SUMMARIES)?;
        let rotated = read_txn.open_table(ROTATED_ACTIONS)?;
        for (thread, summary) in scan_summaries(&summaries, room, recipient)? {
            if position >= summary.boundary {
                continue;
            }

            let contribution = if position == summary.last_receipt {
                summary.counts
            } else {
                let mut counts = NotifCounts::default();
                let unread = scan_actions(
                    &rotated,
                    room,
                    recipient,
                    (
                        Bound::Excluded(position.get()),
                        Bound::Included(summary.boundary.get()),
                    ),
                )?;
                for (_, row) in unread.into_iter().filter(|(_, row)| row.thread == thread) {
                    counts.record(row.kind);
                }
                counts
            };
            *totals.entry(thread).or_default() += contribution;
        }

        let live = read_txn.open_table(LIVE_ACTIONS)?;
        let unread = scan_actions(
            &live,
            room,
            recipient,
            (Bound::Excluded(position.get()), Bound::Unbounded),
        )?;
        for (_, row) in unread {
            totals.entry(row.thread).or_default().record(row.kind);
        }

        let counts = RoomCounts::from_totals(totals);
        trace!(
            notify = counts.main.notify_count,
            highlight = counts.main.highlight_count,
            threads = counts.threads.len(),
            "Computed counts"
        );
        Ok(counts)
    }
}
