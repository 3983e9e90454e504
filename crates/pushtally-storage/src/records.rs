//! Values stored in the redb tables
//!
//! Keys carry the (room, recipient, ...) coordinates; values carry the rest,
//! postcard-encoded.

use pushtally_core::{ActionKind, NotifCounts, RoomId, StreamPos, ThreadId, UserId};
use serde::{Deserialize, Serialize, de::DeserializeOwned};

use crate::error::StorageError;

/// Staged action, keyed by (event_id, recipient)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct StagedActionRecord {
    pub room: RoomId,
    pub thread: Option<ThreadId>,
    pub kind: ActionKind,
}

/// Live or rotated action, keyed by (room, recipient, position)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct ActionRecord {
    pub thread: Option<ThreadId>,
    pub kind: ActionKind,
}

/// Rotation summary, keyed by (room, recipient, thread key)
///
/// `counts` covers exactly the rotated actions of the key, all of which sit
/// in `(last_receipt, boundary]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct SummaryRecord {
    pub counts: NotifCounts,
    pub boundary: StreamPos,
    pub last_receipt: StreamPos,
}

impl SummaryRecord {
    /// Empty summary whose folded receipt is `last_receipt`
    pub fn new(last_receipt: StreamPos) -> Self {
        Self {
            counts: NotifCounts::default(),
            boundary: StreamPos::START,
            last_receipt,
        }
    }
}

/// Public view of one rotation summary
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SummaryRow {
    /// Room of the summarized key
    pub room: RoomId,
    /// Recipient of the summarized key
    pub recipient: UserId,
    /// Thread of the summarized key (`None` for the main timeline)
    pub thread: Option<ThreadId>,
    /// Unread actions folded into the summary
    pub counts: NotifCounts,
    /// Highest position folded into the summary
    pub boundary: StreamPos,
    /// Receipt the counts were last reconciled with
    pub last_receipt: StreamPos,
}

pub(crate) fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>, StorageError> {
    postcard::to_allocvec(value).map_err(|e| StorageError::serialization(e.to_string()))
}

pub(crate) fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, StorageError> {
    Ok(postcard::from_bytes(bytes)?)
}
