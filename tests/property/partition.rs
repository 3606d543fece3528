//! Property-based tests for splitting a task list into participant columns.
//!
//! Uses proptest to verify, for any task order:
//! 1. A task appears only in its owner's column.
//! 2. Every task of a roster member appears exactly once.
//! 3. Tasks of users outside the roster are never shown.
//! 4. Columns are sorted and split into active and completed.

use chrono::{DateTime, Utc};
use proptest::prelude::*;
use studyroom::board::view::partition;
use studyroom::board::{ItemState, SortOrder};
use studyroom_proto::{Participant, SessionId, Task, TaskId, UserId};

const ANA: UserId = UserId(1);
const BEN: UserId = UserId(2);
const OUTSIDER: UserId = UserId(9);

fn roster() -> Vec<Participant> {
    vec![Participant::new(ANA, "ana"), Participant::new(BEN, "ben")]
}

/// Strategy for a task list with unique ids and owners drawn from the
/// roster plus one outsider, in arbitrary order.
fn arb_tasks() -> impl Strategy<Value = Vec<Task>> {
    prop::collection::vec(
        (
            prop::sample::select(vec![ANA, BEN, OUTSIDER]),
            0i64..1_000,
            any::<bool>(),
        ),
        0..40,
    )
    .prop_map(|specs| {
        specs
            .into_iter()
            .enumerate()
            .map(|(i, (user, secs, is_done))| {
                let at = DateTime::<Utc>::from_timestamp(1_700_000_000 + secs, 0)
                    .unwrap_or_default();
                Task {
                    id: TaskId(i as u64 + 1),
                    session: SessionId::new("s1"),
                    user,
                    text: format!("task {i}"),
                    is_done,
                    created_at: at,
                    updated_at: at,
                }
            })
            .collect::<Vec<_>>()
    })
    .prop_shuffle()
}

fn arb_order() -> impl Strategy<Value = SortOrder> {
    prop_oneof![Just(SortOrder::NewestFirst), Just(SortOrder::OldestFirst)]
}

fn idle(_: &Task) -> (ItemState, Option<String>) {
    (ItemState::Idle, None)
}

proptest! {
    #[test]
    fn tasks_only_appear_under_their_owner(tasks in arb_tasks(), order in arb_order()) {
        let columns = partition(&tasks, &roster(), ANA, order, idle);
        prop_assert_eq!(columns.len(), 2);
        for column in &columns {
            for view in column.active.iter().chain(&column.completed) {
                prop_assert_eq!(view.task.user, column.participant.user_id);
            }
        }
    }

    #[test]
    fn every_member_task_shown_once_and_outsiders_never(tasks in arb_tasks(), order in arb_order()) {
        let columns = partition(&tasks, &roster(), ANA, order, idle);
        let mut shown: Vec<TaskId> = columns
            .iter()
            .flat_map(|c| c.active.iter().chain(&c.completed))
            .map(|v| v.task.id)
            .collect();
        shown.sort();

        let mut expected: Vec<TaskId> = tasks
            .iter()
            .filter(|t| t.user != OUTSIDER)
            .map(|t| t.id)
            .collect();
        expected.sort();
        prop_assert_eq!(shown, expected);
    }

    #[test]
    fn columns_are_split_and_sorted(tasks in arb_tasks(), order in arb_order()) {
        let columns = partition(&tasks, &roster(), BEN, order, idle);
        for column in &columns {
            prop_assert!(column.active.iter().all(|v| !v.task.is_done));
            prop_assert!(column.completed.iter().all(|v| v.task.is_done));
            for list in [&column.active, &column.completed] {
                for pair in list.windows(2) {
                    prop_assert_ne!(
                        order.compare(&pair[0].task, &pair[1].task),
                        std::cmp::Ordering::Greater
                    );
                }
            }
            let mine = column.participant.user_id == BEN;
            prop_assert_eq!(column.is_mine, mine);
            prop_assert!(column
                .active
                .iter()
                .chain(&column.completed)
                .all(|v| v.can_mutate == mine));
        }
    }

    #[test]
    fn result_does_not_depend_on_input_order(tasks in arb_tasks(), order in arb_order()) {
        let mut reversed = tasks.clone();
        reversed.reverse();
        let a = partition(&tasks, &roster(), ANA, order, idle);
        let b = partition(&reversed, &roster(), ANA, order, idle);
        prop_assert_eq!(a, b);
    }
}
