//! Collaborator traits
//!
//! The engine consumes two external collaborators, abstracted here so the
//! same counting logic runs against an in-memory log in tests and a durable
//! log in production.
//!
//! - [`EventLog`]: append-only, position-ordered log of committed events
//! - [`ActionComputer`]: decides which recipients an event notifies
//! - [`Clock`]: wall-clock abstraction for testability

use std::sync::atomic::{AtomicI64, Ordering};

use async_trait::async_trait;

use crate::action::PushAction;
use crate::error::LogError;
use crate::event::{Event, NewEvent};
use crate::types::{StreamPos, Timestamp, UserId};

/// Append-only log of committed events
///
/// Positions are assigned by [`append`](EventLog::append), strictly
/// increasing, and never reused. Receive timestamps are expected to be
/// non-decreasing in position; the log does not enforce it.
#[async_trait]
pub trait EventLog: Send + Sync {
    /// Commit an event, assigning its position
    async fn append(&self, event: NewEvent) -> Result<Event, LogError>;

    /// All events with `from <= position <= to`, in position order
    async fn range_scan(&self, from: StreamPos, to: StreamPos) -> Result<Vec<Event>, LogError>;

    /// Smallest committed position, `None` if the log is empty
    async fn min_position(&self) -> Result<Option<StreamPos>, LogError>;

    /// Largest committed position, `None` if the log is empty
    async fn max_position(&self) -> Result<Option<StreamPos>, LogError>;

    /// The newest event at or before `position`
    ///
    /// The default goes through [`range_scan`](EventLog::range_scan);
    /// implementations with an ordered index should override it.
    async fn last_at_or_before(&self, position: StreamPos) -> Result<Option<Event>, LogError> {
        let Some(min) = self.min_position().await? else {
            return Ok(None);
        };
        if position < min {
            return Ok(None);
        }
        Ok(self.range_scan(min, position).await?.pop())
    }
}

/// Decides which notification actions an event produces
///
/// Must be pure: it may be retried freely and has no side effects.
pub trait ActionComputer: Send + Sync {
    /// Compute the actions `event` produces for `recipients`
    fn compute_actions(&self, event: &NewEvent, recipients: &[UserId]) -> Vec<PushAction>;
}

impl<F> ActionComputer for F
where
    F: Fn(&NewEvent, &[UserId]) -> Vec<PushAction> + Send + Sync,
{
    fn compute_actions(&self, event: &NewEvent, recipients: &[UserId]) -> Vec<PushAction> {
        self(event, recipients)
    }
}

/// Time abstraction for testability
pub trait Clock: Send + Sync {
    /// The current wall-clock time
    fn now(&self) -> Timestamp;
}

/// Real clock implementation using system time
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        Timestamp::now()
    }
}

/// Manually driven clock for tests
#[derive(Debug, Default)]
pub struct ManualClock {
    millis: AtomicI64,
}

impl ManualClock {
    /// Create a clock frozen at `start`
    pub fn new(start: Timestamp) -> Self {
        Self {
            millis: AtomicI64::new(start.as_millis()),
        }
    }

    /// Move the clock forward
    pub fn advance_millis(&self, millis: i64) {
        self.millis.fetch_add(millis, Ordering::SeqCst);
    }

    /// Jump the clock to `at`
    pub fn set(&self, at: Timestamp) {
        self.millis.store(at.as_millis(), Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Timestamp {
        Timestamp::from_millis(self.millis.load(Ordering::SeqCst))
    }
}
