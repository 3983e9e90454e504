//! Identifiers and positions
//!
//! Rooms, users, threads, and events are identified by opaque strings. Log
//! positions are plain `u64` values wrapped in [`StreamPos`].

use std::fmt::Display;

use serde::{Deserialize, Serialize};

/// Position of an event in the global append-only log
///
/// Positions are assigned once at commit time, are strictly increasing, and
/// are never reused. They need not be contiguous.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
pub struct StreamPos(pub u64);

impl StreamPos {
    /// Start of the log. Every committed position is strictly greater.
    pub const START: StreamPos = StreamPos(0);

    /// Create a position from a raw value
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    /// Get the raw value
    pub const fn get(self) -> u64 {
        self.0
    }

    /// The position immediately after this one
    pub const fn next(self) -> Self {
        Self(self.0.saturating_add(1))
    }

    /// The position immediately before this one, saturating at the start
    pub const fn prev(self) -> Self {
        Self(self.0.saturating_sub(1))
    }
}

impl Display for StreamPos {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for StreamPos {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

/// Wall-clock time at which the server received an event (Unix millis)
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
pub struct Timestamp(pub i64);

impl Timestamp {
    /// Create a timestamp from Unix milliseconds
    pub const fn from_millis(millis: i64) -> Self {
        Self(millis)
    }

    /// Get the Unix milliseconds
    pub const fn as_millis(self) -> i64 {
        self.0
    }

    /// The current wall-clock time
    pub fn now() -> Self {
        Self(chrono::Utc::now().timestamp_millis())
    }

    /// This timestamp moved back by `millis`, saturating
    pub fn saturating_sub_millis(self, millis: i64) -> Self {
        Self(self.0.saturating_sub(millis))
    }

    /// This timestamp moved forward by `millis`, saturating
    pub fn saturating_add_millis(self, millis: i64) -> Self {
        Self(self.0.saturating_add(millis))
    }
}

impl Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}ms", self.0)
    }
}

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        pub struct $name(String);

        impl $name {
            /// Create an identifier from any string-like value
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            /// Borrow the identifier as a string slice
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(id: &str) -> Self {
                Self(id.to_owned())
            }
        }

        impl From<String> for $name {
            fn from(id: String) -> Self {
                Self(id)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

string_id!(
    /// Identifier of a room
    RoomId
);

string_id!(
    /// Identifier of a user (a notification recipient)
    UserId
);

string_id!(
    /// Identifier of a conversation thread within a room
    ///
    /// The room's main timeline has no thread id; it is modelled as
    /// `Option<ThreadId>::None` throughout.
    ThreadId
);

string_id!(
    /// Identifier of an event, known before the event is committed
    EventId
);
