//! In-memory event log
//!
//! Suitable for testing and simulation. Positions are allocated from 1
//! upward by [`append`](EventLog::append); [`MemoryEventLog::insert`] places
//! an event at an explicit position, which lets tests build logs with gaps.

use std::collections::BTreeMap;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::trace;

use crate::error::LogError;
use crate::event::{Event, NewEvent};
use crate::traits::EventLog;
use crate::types::StreamPos;

/// In-memory implementation of [`EventLog`]
#[derive(Debug, Default)]
pub struct MemoryEventLog {
    events: RwLock<BTreeMap<StreamPos, Event>>,
}

impl MemoryEventLog {
    /// Create an empty log
    pub fn new() -> Self {
        Self::default()
    }

    /// Commit an event at an explicit position
    ///
    /// The position must be greater than every position already in the log.
    pub async fn insert(&self, event: Event) -> Result<(), LogError> {
        let mut events = self.events.write().await;
        if let Some((&head, _)) = events.last_key_value()
            && event.position <= head
        {
            return Err(LogError::PositionConflict {
                attempted: event.position,
                head,
            });
        }
        trace!(position = %event.position, room = %event.room, "Inserted event");
        events.insert(event.position, event);
        Ok(())
    }

    /// Number of committed events
    pub async fn len(&self) -> usize {
        self.events.read().await.len()
    }

    /// Whether the log is empty
    pub async fn is_empty(&self) -> bool {
        self.events.read().await.is_empty()
    }
}

#[async_trait]
impl EventLog for MemoryEventLog {
    async fn append(&self, event: NewEvent) -> Result<Event, LogError> {
        let mut events = self.events.write().await;
        let position = events
            .last_key_value()
            .map(|(&head, _)| head.next())
            .unwrap_or(StreamPos::new(1));
        let event = event.committed_at(position);
        events.insert(position, event.clone());
        trace!(position = %position, room = %event.room, "Appended event");
        Ok(event)
    }

    async fn range_scan(&self, from: StreamPos, to: StreamPos) -> Result<Vec<Event>, LogError> {
        if from > to {
            return Ok(Vec::new());
        }
        let events = self.events.read().await;
        Ok(events.range(from..=to).map(|(_, e)| e.clone()).collect())
    }

    async fn min_position(&self) -> Result<Option<StreamPos>, LogError> {
        Ok(self.events.read().await.first_key_value().map(|(&p, _)| p))
    }

    async fn max_position(&self) -> Result<Option<StreamPos>, LogError> {
        Ok(self.events.read().await.last_key_value().map(|(&p, _)| p))
    }

    async fn last_at_or_before(&self, position: StreamPos) -> Result<Option<Event>, LogError> {
        let events = self.events.read().await;
        Ok(events
            .range(..=position)
            .next_back()
            .map(|(_, e)| e.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{EventId, RoomId, Timestamp};

    fn event_at(position: u64, ts: i64) -> Event {
        Event {
            event_id: EventId::new(format!("$event{position}")),
            position: StreamPos::new(position),
            room: RoomId::from("!room"),
            received_at: Timestamp::from_millis(ts),
        }
    }

    #[tokio::test]
    async fn test_append_assigns_increasing_positions() {
        let log = MemoryEventLog::new();
        let first = log.append(NewEvent::new("$a", "!room")).await.unwrap();
        let second = log.append(NewEvent::new("$b", "!room")).await.unwrap();
        assert_eq!(first.position, StreamPos::new(1));
        assert_eq!(second.position, StreamPos::new(2));
        assert_eq!(log.len().await, 2);
    }

    #[tokio::test]
    async fn test_insert_rejects_non_increasing_position() {
        let log = MemoryEventLog::new();
        log.insert(event_at(5, 10)).await.unwrap();
        let err = log.insert(event_at(5, 20)).await.unwrap_err();
        assert!(matches!(err, LogError::PositionConflict { .. }));

        // Appends continue after the highest inserted position
        let next = log.append(NewEvent::new("$c", "!room")).await.unwrap();
        assert_eq!(next.position, StreamPos::new(6));
    }

    #[tokio::test]
    async fn test_range_scan_and_bounds() {
        let log = MemoryEventLog::new();
        assert_eq!(log.min_position().await.unwrap(), None);
        assert_eq!(log.max_position().await.unwrap(), None);

        for (p, ts) in [(2, 10), (3, 20), (10, 30)] {
            log.insert(event_at(p, ts)).await.unwrap();
        }

        let scanned = log
            .range_scan(StreamPos::new(3), StreamPos::new(10))
            .await
            .unwrap();
        assert_eq!(scanned.len(), 2);
        assert!(log
            .range_scan(StreamPos::new(10), StreamPos::new(3))
            .await
            .unwrap()
            .is_empty());

        assert_eq!(log.min_position().await.unwrap(), Some(StreamPos::new(2)));
        assert_eq!(log.max_position().await.unwrap(), Some(StreamPos::new(10)));

        let before = log.last_at_or_before(StreamPos::new(9)).await.unwrap();
        assert_eq!(before.map(|e| e.position), Some(StreamPos::new(3)));
        assert!(log.last_at_or_before(StreamPos::new(1)).await.unwrap().is_none());
    }
}
