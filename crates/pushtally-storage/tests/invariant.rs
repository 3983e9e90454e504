//! Property tests for the count invariant
//!
//! Random interleavings of promotion, abandoned staging, receipts and
//! rotation passes are applied to a store and to a plain list of every
//! promoted action. After each step, the counts reported for every pair and
//! every query position must equal a full rescan of that list.

use std::collections::{BTreeMap, HashMap};

use proptest::prelude::*;
use pushtally_core::{
    ActionKind, EventId, NotifCounts, PushAction, RoomCounts, RoomId, StreamPos, ThreadId, UserId,
};
use pushtally_storage::{PushStore, PushStoreConfig};

const ROOMS: usize = 2;
const USERS: usize = 3;
const THREADS: usize = 2;

#[derive(Debug, Clone)]
enum Op {
    Push {
        room: usize,
        user: usize,
        thread: Option<usize>,
        highlight: bool,
    },
    Abandon {
        room: usize,
        user: usize,
    },
    Receipt {
        room: usize,
        user: usize,
        back: u64,
    },
    Rotate {
        lag: u64,
    },
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        5 => (0..ROOMS, 0..USERS, prop::option::of(0..THREADS), any::<bool>()).prop_map(
            |(room, user, thread, highlight)| Op::Push { room, user, thread, highlight }
        ),
        1 => (0..ROOMS, 0..USERS).prop_map(|(room, user)| Op::Abandon { room, user }),
        2 => (0..ROOMS, 0..USERS, 0..5u64).prop_map(|(room, user, back)| Op::Receipt { room, user, back }),
        2 => (0..4u64).prop_map(|lag| Op::Rotate { lag }),
    ]
}

fn room_id(room: usize) -> RoomId {
    RoomId::new(format!("!room{room}"))
}

fn user_id(user: usize) -> UserId {
    UserId::new(format!("@user{user}"))
}

fn thread_id(thread: usize) -> ThreadId {
    ThreadId::new(format!("$thread{thread}"))
}

/// Every promoted action, plus the receipts, kept the obvious way
#[derive(Default)]
struct Model {
    actions: Vec<(u64, usize, usize, Option<usize>, ActionKind)>,
    receipts: HashMap<(usize, usize), u64>,
}

impl Model {
    fn counts_at(&self, room: usize, user: usize, position: u64) -> RoomCounts {
        let mut totals: BTreeMap<Option<ThreadId>, NotifCounts> = BTreeMap::new();
        totals.insert(None, NotifCounts::default());
        for &(pos, r, u, thread, kind) in &self.actions {
            if r == room && u == user && pos > position {
                totals
                    .entry(thread.map(thread_id))
                    .or_default()
                    .record(kind);
            }
        }
        RoomCounts::from_totals(totals)
    }
}

fn check(store: &PushStore, model: &Model, head: u64) -> Result<(), TestCaseError> {
    for room in 0..ROOMS {
        for user in 0..USERS {
            for position in 0..=head + 1 {
                let actual = store
                    .counts()
                    .counts_at(&room_id(room), &user_id(user), StreamPos::new(position))
                    .map_err(|e| TestCaseError::fail(e.to_string()))?;
                prop_assert_eq!(
                    actual,
                    model.counts_at(room, user, position),
                    "room {} user {} at {}",
                    room,
                    user,
                    position
                );
            }
        }
    }
    Ok(())
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn counts_match_full_rescan(ops in prop::collection::vec(op_strategy(), 1..40)) {
        let store = PushStore::open_with_batch_size(PushStoreConfig::in_memory(), 2).unwrap();
        let mut model = Model::default();
        let mut head = 0u64;

        for op in ops {
            match op {
                Op::Push { room, user, thread, highlight } => {
                    head += 1;
                    let kind = if highlight { ActionKind::Highlight } else { ActionKind::Notify };
                    let mut action = PushAction::new(user_id(user), kind);
                    if let Some(thread) = thread {
                        action = action.in_thread(thread_id(thread));
                    }
                    let event = EventId::new(format!("$e{head}"));
                    store.staging().stage(&event, &room_id(room), &[action]).unwrap();
                    store.staging().promote(&event, StreamPos::new(head)).unwrap();
                    model.actions.push((head, room, user, thread, kind));
                }
                Op::Abandon { room, user } => {
                    head += 1;
                    let event = EventId::new(format!("$e{head}"));
                    let action = PushAction::new(user_id(user), ActionKind::Highlight);
                    store.staging().stage(&event, &room_id(room), &[action]).unwrap();
                    store.staging().abandon(&event).unwrap();
                }
                Op::Receipt { room, user, back } => {
                    let position = head.saturating_sub(back);
                    let advanced = store
                        .receipts()
                        .record_receipt(&room_id(room), &user_id(user), StreamPos::new(position))
                        .unwrap();
                    let current = model.receipts.entry((room, user)).or_insert(0);
                    prop_assert_eq!(advanced, position > *current);
                    *current = (*current).max(position);
                }
                Op::Rotate { lag } => {
                    let report = store
                        .rotation()
                        .run_pass(StreamPos::new(head.saturating_sub(lag)))
                        .unwrap();
                    prop_assert!(report.caught_up);
                }
            }
            check(&store, &model, head)?;
        }
    }

    #[test]
    fn repeated_pass_is_idempotent(ops in prop::collection::vec(op_strategy(), 1..30)) {
        let store = PushStore::open(PushStoreConfig::in_memory()).unwrap();
        let mut head = 0u64;

        for op in ops {
            match op {
                Op::Push { room, user, thread, highlight } => {
                    head += 1;
                    let kind = if highlight { ActionKind::Highlight } else { ActionKind::Notify };
                    let mut action = PushAction::new(user_id(user), kind);
                    if let Some(thread) = thread {
                        action = action.in_thread(thread_id(thread));
                    }
                    let event = EventId::new(format!("$e{head}"));
                    store.staging().stage(&event, &room_id(room), &[action]).unwrap();
                    store.staging().promote(&event, StreamPos::new(head)).unwrap();
                }
                Op::Receipt { room, user, back } => {
                    store
                        .receipts()
                        .record_receipt(&room_id(room), &user_id(user), StreamPos::new(head.saturating_sub(back)))
                        .unwrap();
                }
                Op::Abandon { .. } | Op::Rotate { .. } => {}
            }
        }

        let target = StreamPos::new(head);
        store.rotation().run_pass(target).unwrap();
        let snapshot = |store: &PushStore| {
            let mut rows = Vec::new();
            for room in 0..ROOMS {
                for user in 0..USERS {
                    rows.extend(store.rotation().summaries(&room_id(room), &user_id(user)).unwrap());
                }
            }
            rows
        };
        let before = snapshot(&store);

        let report = store.rotation().run_pass(target).unwrap();
        prop_assert_eq!(report.actions_rotated, 0);
        prop_assert_eq!(report.receipts_folded, 0);
        prop_assert_eq!(snapshot(&store), before);
    }
}
