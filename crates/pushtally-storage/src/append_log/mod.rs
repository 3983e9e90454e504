//! Durable append-only event log
//!
//! A file-backed implementation of the [`EventLog`](pushtally_core::EventLog)
//! collaborator. Events are written sequentially and never modified; an
//! in-memory index from position to file offset is rebuilt by replaying the
//! file on open.
//!
//! ## Storage Format
//!
//! The log file contains length-prefixed, postcard-serialized events:
//! ```text
//! [4 bytes: len][len bytes: serialized event][4 bytes: len][...]
//! ```
//!
//! A torn frame at the tail (crash mid-append) is cut off during replay.

pub mod event_log;

pub use event_log::{EventLogConfig, FileEventLog};
