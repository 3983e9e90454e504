//! Timestamp to position lookup
//!
//! There is no index on receive time, but receive time grows with position,
//! so a cutoff time can be mapped to a position by binary search over the
//! position space of the log.

use tracing::{debug, instrument};

use crate::error::LogError;
use crate::traits::EventLog;
use crate::types::{StreamPos, Timestamp};

/// First log position whose event was received at or after `cutoff`
///
/// Returns [`StreamPos::START`] for an empty log, and one past the largest
/// position when every event was received before `cutoff`. When several
/// events share a receive time the earliest of them wins.
///
/// Positions need not be contiguous. A gap takes the receive time of the
/// event before it, so the search always lands on a real event (or on one
/// past the end). Receive times must be non-decreasing in position.
#[instrument(skip_all, fields(cutoff = %cutoff))]
pub async fn position_after<L>(log: &L, cutoff: Timestamp) -> Result<StreamPos, LogError>
where
    L: EventLog + ?Sized,
{
    let Some(max) = log.max_position().await? else {
        return Ok(StreamPos::START);
    };

    // Invariant: the answer X satisfies start <= X <= end.
    let mut start = StreamPos::START.get();
    let mut end = max.get().saturating_add(1);
    let mut steps = 0u32;

    while start < end {
        let middle = start + (end - start) / 2;
        steps += 1;

        match log.last_at_or_before(StreamPos::new(middle)).await? {
            // Nothing at or before the midpoint: the answer lies above it.
            None => start = middle + 1,
            Some(event) if event.received_at < cutoff => start = middle + 1,
            Some(_) => end = middle,
        }
    }

    debug!(position = end, steps, "Resolved position for cutoff");
    Ok(StreamPos::new(end))
}
