//! Stress tests for pushtally-storage
//!
//! These tests run promotions, receipts and rotation passes concurrently and
//! verify the counts once everything has settled.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Instant;

use pushtally_core::{ActionKind, EventId, NotifCounts, PushAction, RoomId, StreamPos, UserId};
use pushtally_storage::{PushStore, PushStoreConfig};
use tempfile::TempDir;

const WRITERS: usize = 8;
const EVENTS_PER_WRITER: u64 = 200;

/// Concurrent promotions into distinct rooms while rotation runs
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_promotion_and_rotation() {
    let temp_dir = TempDir::new().unwrap();
    let store = Arc::new(
        PushStore::open_with_batch_size(PushStoreConfig::at(temp_dir.path().join("stress.redb")), 3)
            .unwrap(),
    );
    let next_position = Arc::new(AtomicU64::new(1));
    let writers_done = Arc::new(AtomicBool::new(false));
    let start = Instant::now();

    let mut writers = Vec::new();
    for writer in 0..WRITERS {
        let store = store.clone();
        let next_position = next_position.clone();
        writers.push(tokio::task::spawn_blocking(move || {
            let room = RoomId::new(format!("!room{writer}"));
            for i in 0..EVENTS_PER_WRITER {
                let event = EventId::new(format!("$w{writer}e{i}"));
                let kind = if i % 5 == 0 {
                    ActionKind::Highlight
                } else {
                    ActionKind::Notify
                };
                let actions = [
                    PushAction::new("@alice", kind),
                    PushAction::new("@bob", ActionKind::Notify),
                ];
                store.staging().stage(&event, &room, &actions).unwrap();
                let position = StreamPos::new(next_position.fetch_add(1, Ordering::SeqCst));
                assert_eq!(store.staging().promote(&event, position).unwrap(), 2);
            }
        }));
    }

    let rotator = {
        let store = store.clone();
        let next_position = next_position.clone();
        let writers_done = writers_done.clone();
        tokio::task::spawn_blocking(move || {
            let mut passes = 0u32;
            while !writers_done.load(Ordering::SeqCst) {
                let target = StreamPos::new(next_position.load(Ordering::SeqCst) / 2);
                store.rotation().run_pass(target).unwrap();
                passes += 1;
            }
            passes
        })
    };

    for writer in writers {
        writer.await.unwrap();
    }
    writers_done.store(true, Ordering::SeqCst);
    let passes = rotator.await.unwrap();

    println!(
        "Promoted {} events with {} concurrent rotation passes in {:?}",
        WRITERS as u64 * EVENTS_PER_WRITER,
        passes,
        start.elapsed()
    );

    let head = next_position.load(Ordering::SeqCst);
    store.rotation().run_pass(StreamPos::new(head)).unwrap();

    for writer in 0..WRITERS {
        let room = RoomId::new(format!("!room{writer}"));
        let alice = store
            .counts()
            .counts_at(&room, &UserId::from("@alice"), StreamPos::START)
            .unwrap();
        assert_eq!(
            alice.main,
            NotifCounts::new(EVENTS_PER_WRITER, EVENTS_PER_WRITER / 5)
        );
        let bob = store
            .counts()
            .counts_at(&room, &UserId::from("@bob"), StreamPos::START)
            .unwrap();
        assert_eq!(bob.main, NotifCounts::new(EVENTS_PER_WRITER, 0));
        assert_eq!(store.staging().live_count(&room, &UserId::from("@alice")).unwrap(), 0);
    }
}

/// Receipts racing rotation never change the counts at any position
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_receipts_racing_rotation() {
    let store = Arc::new(PushStore::open(PushStoreConfig::in_memory()).unwrap());
    let room = RoomId::from("!busy");
    let alice = UserId::from("@alice");
    let total: u64 = 500;

    for position in 1..=total {
        let event = EventId::new(format!("$e{position}"));
        store
            .staging()
            .stage(&event, &room, &[PushAction::new(alice.clone(), ActionKind::Notify)])
            .unwrap();
        store
            .staging()
            .promote(&event, StreamPos::new(position))
            .unwrap();
    }

    let reader = {
        let store = store.clone();
        let room = room.clone();
        let alice = alice.clone();
        tokio::task::spawn_blocking(move || {
            for position in (10..=total).step_by(10) {
                store
                    .receipts()
                    .record_receipt(&room, &alice, StreamPos::new(position))
                    .unwrap();
                let counts = store
                    .counts()
                    .counts_at(&room, &alice, StreamPos::new(position))
                    .unwrap();
                assert_eq!(counts.main.notify_count, total - position);
                let everything = store
                    .counts()
                    .counts_at(&room, &alice, StreamPos::START)
                    .unwrap();
                assert_eq!(everything.main.notify_count, total);
            }
        })
    };

    let rotator = {
        let store = store.clone();
        tokio::task::spawn_blocking(move || {
            for target in (25..=total).step_by(25) {
                store.rotation().run_pass(StreamPos::new(target)).unwrap();
            }
        })
    };

    reader.await.unwrap();
    rotator.await.unwrap();
    store.rotation().run_pass(StreamPos::new(total)).unwrap();

    let counts = store.counts().counts_at(&room, &alice, StreamPos::new(total)).unwrap();
    assert_eq!(counts.main, NotifCounts::default());
    let counts = store.counts().counts_at(&room, &alice, StreamPos::START).unwrap();
    assert_eq!(counts.main, NotifCounts::new(total, 0));
    assert_eq!(store.rotation().rotated_count(&room, &alice).unwrap(), total as usize);
    assert_eq!(store.receipts().pending_folds().unwrap(), 0);
}
