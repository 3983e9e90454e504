//! # Pushtally Core
//!
//! Core types, collaborator traits, and errors for the pushtally unread
//! notification counter.
//!
//! This crate provides the shared data model used by the storage engine and
//! the engine façade, together with the interfaces of the two external
//! collaborators the engine consumes: the append-only event log and the
//! action computer.
//!
//! ## Key Traits
//!
//! - [`EventLog`]: Append-only, position-ordered log of committed events
//! - [`ActionComputer`]: Pure function deciding who gets notified by an event
//! - [`Clock`]: Time abstraction for testability
//!
//! ## Key Types
//!
//! - [`StreamPos`]: Totally ordered position of an event in the log
//! - [`PendingAction`]: A notify/highlight directive for one recipient
//! - [`RoomCounts`]: Main-timeline and per-thread unread counts
//!
//! ## Position Index
//!
//! [`position_after`] maps a wall-clock cutoff to the first log position
//! received at or after it, by binary search over the log.

pub mod action;
pub mod error;
pub mod event;
pub mod memory_log;
pub mod position_index;
pub mod traits;
pub mod types;

// Re-export main types
pub use action::*;
pub use error::*;
pub use event::*;
pub use memory_log::MemoryEventLog;
pub use position_index::position_after;
pub use traits::*;
pub use types::*;
