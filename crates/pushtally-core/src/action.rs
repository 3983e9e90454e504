//! Notification actions and counts

use std::collections::BTreeMap;
use std::ops::AddAssign;

use serde::{Deserialize, Serialize};

use crate::types::{RoomId, StreamPos, ThreadId, UserId};

/// What an event asks the server to do for one recipient
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ActionKind {
    /// Plain notification
    Notify,
    /// Highlighted notification (mentions, keywords). Also notifies.
    Highlight,
}

impl ActionKind {
    /// Whether this action is a highlight
    pub fn is_highlight(self) -> bool {
        matches!(self, Self::Highlight)
    }
}

impl std::fmt::Display for ActionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Notify => write!(f, "notify"),
            Self::Highlight => write!(f, "highlight"),
        }
    }
}

/// An action for one recipient, as produced by the action computer
///
/// Carries no position: it is computed before the event is committed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PushAction {
    /// Who the action is for
    pub recipient: UserId,
    /// Thread the event belongs to (`None` for the main timeline)
    pub thread: Option<ThreadId>,
    /// Notify or highlight
    pub kind: ActionKind,
}

impl PushAction {
    /// Create a main-timeline action
    pub fn new(recipient: impl Into<UserId>, kind: ActionKind) -> Self {
        Self {
            recipient: recipient.into(),
            thread: None,
            kind,
        }
    }

    /// Scope the action to a thread
    pub fn in_thread(mut self, thread: impl Into<ThreadId>) -> Self {
        self.thread = Some(thread.into());
        self
    }
}

/// A notification action bound to a committed log position
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PendingAction {
    /// Position of the event that produced the action
    pub position: StreamPos,
    /// Room the event was sent in
    pub room: RoomId,
    /// Who the action is for
    pub recipient: UserId,
    /// Thread the event belongs to (`None` for the main timeline)
    pub thread: Option<ThreadId>,
    /// Notify or highlight
    pub kind: ActionKind,
}

/// Unread notification counts for one (room, recipient, thread) key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct NotifCounts {
    /// Number of unread notifying actions (highlights included)
    pub notify_count: u64,
    /// Number of unread highlight actions
    pub highlight_count: u64,
}

impl NotifCounts {
    /// Create counts from raw values
    pub const fn new(notify_count: u64, highlight_count: u64) -> Self {
        Self {
            notify_count,
            highlight_count,
        }
    }

    /// Count one more action of the given kind
    pub fn record(&mut self, kind: ActionKind) {
        self.notify_count += 1;
        if kind.is_highlight() {
            self.highlight_count += 1;
        }
    }

    /// Whether both counts are zero
    pub fn is_zero(&self) -> bool {
        self.notify_count == 0 && self.highlight_count == 0
    }
}

impl AddAssign for NotifCounts {
    fn add_assign(&mut self, rhs: Self) {
        self.notify_count += rhs.notify_count;
        self.highlight_count += rhs.highlight_count;
    }
}

/// Unread counts for a (room, recipient): main timeline plus threads
///
/// The main timeline is always reported. Threads with nothing unread are
/// omitted.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RoomCounts {
    /// Counts for the room's main timeline
    pub main: NotifCounts,
    /// Counts per thread, nonzero entries only
    pub threads: BTreeMap<ThreadId, NotifCounts>,
}

impl RoomCounts {
    /// Build room counts from per-thread totals, dropping empty threads
    pub fn from_totals(totals: BTreeMap<Option<ThreadId>, NotifCounts>) -> Self {
        let mut counts = Self::default();
        for (thread, total) in totals {
            match thread {
                None => counts.main = total,
                Some(thread) if !total.is_zero() => {
                    counts.threads.insert(thread, total);
                }
                Some(_) => {}
            }
        }
        counts
    }

    /// Counts for one thread, zero if the thread has nothing unread
    pub fn thread(&self, thread: &ThreadId) -> NotifCounts {
        self.threads.get(thread).copied().unwrap_or_default()
    }
}
