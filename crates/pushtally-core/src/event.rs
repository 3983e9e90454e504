//! Events as seen by the notification engine
//!
//! The engine only needs an event's identity, room, position, and receive
//! time. Content and membership live elsewhere.

use serde::{Deserialize, Serialize};

use crate::types::{EventId, RoomId, StreamPos, Timestamp};

/// An event that has not been committed to the log yet
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewEvent {
    /// Event identifier
    pub event_id: EventId,
    /// Room the event was sent in
    pub room: RoomId,
    /// When the server received the event
    pub received_at: Timestamp,
}

impl NewEvent {
    /// Create an event received now
    pub fn new(event_id: impl Into<EventId>, room: impl Into<RoomId>) -> Self {
        Self {
            event_id: event_id.into(),
            room: room.into(),
            received_at: Timestamp::now(),
        }
    }

    /// Set the receive time
    pub fn with_received_at(mut self, received_at: Timestamp) -> Self {
        self.received_at = received_at;
        self
    }

    /// Bind the event to the position assigned at commit
    pub fn committed_at(self, position: StreamPos) -> Event {
        Event {
            event_id: self.event_id,
            position,
            room: self.room,
            received_at: self.received_at,
        }
    }
}

/// A committed event. Immutable once written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    /// Event identifier
    pub event_id: EventId,
    /// Position assigned at commit
    pub position: StreamPos,
    /// Room the event was sent in
    pub room: RoomId,
    /// When the server received the event
    pub received_at: Timestamp,
}
