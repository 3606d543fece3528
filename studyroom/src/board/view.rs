//! Participant partitioning and view projection.
//!
//! Turns the flat task list and the session roster into one column per
//! participant, each split into active and completed tasks and sorted by
//! creation time. Only the current user's column is mutable.

use std::cmp::Ordering;
use std::str::FromStr;

use studyroom_proto::{Participant, Session, Task, UserId};

use super::state::{ActionState, AddState, ItemState, ViewPhase};

/// Display order of tasks within a column.
///
/// A presentation preference only; stored data is never reordered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Deserialize)]
pub enum SortOrder {
    /// Most recently created first.
    #[default]
    #[serde(rename = "newest")]
    NewestFirst,
    /// Oldest first.
    #[serde(rename = "oldest")]
    OldestFirst,
}

impl SortOrder {
    /// Compares two tasks by creation time, breaking ties by id.
    #[must_use]
    pub fn compare(self, a: &Task, b: &Task) -> Ordering {
        let ascending = a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id));
        match self {
            Self::NewestFirst => ascending.reverse(),
            Self::OldestFirst => ascending,
        }
    }
}

impl FromStr for SortOrder {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "newest" => Ok(Self::NewestFirst),
            "oldest" => Ok(Self::OldestFirst),
            other => Err(format!("unknown sort order: {other}")),
        }
    }
}

/// Whether the current user may see and change the board.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    /// The session record has not loaded yet.
    Loading,
    /// The current user is on the roster.
    Participant,
    /// The current user is not on the roster; nothing is shown.
    NotParticipant,
}

/// One task as rendered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskView {
    pub task: Task,
    pub state: ItemState,
    /// Error message currently shown for this task.
    pub error: Option<String>,
    /// Whether toggle/edit/delete controls are enabled.
    pub can_mutate: bool,
}

/// One participant's tasks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParticipantColumn {
    pub participant: Participant,
    /// Whether this column belongs to the current user.
    pub is_mine: bool,
    pub active: Vec<TaskView>,
    pub completed: Vec<TaskView>,
    /// Add affordance, present on the current user's column only.
    pub add: Option<AddState>,
}

/// Render-ready snapshot of a board.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoardView {
    pub phase: ViewPhase,
    pub access: Access,
    /// Session display name, once loaded.
    pub session_name: Option<String>,
    /// One column per roster entry, in roster order. Empty unless
    /// `access` is [`Access::Participant`].
    pub columns: Vec<ParticipantColumn>,
    /// Rename affordance, for the session creator only.
    pub rename: Option<ActionState>,
}

/// Access of `me` to `session`.
#[must_use]
pub fn access(session: Option<&Session>, me: UserId) -> Access {
    match session {
        None => Access::Loading,
        Some(s) if s.is_participant(me) => Access::Participant,
        Some(_) => Access::NotParticipant,
    }
}

/// Partitions `tasks` into one column per participant.
///
/// Tasks whose owner is not on the roster are dropped. `interaction`
/// supplies each task's pending state and visible error.
pub fn partition<F>(
    tasks: &[Task],
    participants: &[Participant],
    me: UserId,
    order: SortOrder,
    interaction: F,
) -> Vec<ParticipantColumn>
where
    F: Fn(&Task) -> (ItemState, Option<String>),
{
    participants
        .iter()
        .map(|participant| {
            let is_mine = participant.user_id == me;
            let mut owned: Vec<&Task> = tasks
                .iter()
                .filter(|t| t.user == participant.user_id)
                .collect();
            owned.sort_by(|a, b| order.compare(a, b));

            let (completed, active): (Vec<&Task>, Vec<&Task>) =
                owned.into_iter().partition(|t| t.is_done);
            let to_view = |task: &Task| {
                let (state, error) = interaction(task);
                TaskView {
                    task: task.clone(),
                    state,
                    error,
                    can_mutate: is_mine && state == ItemState::Idle,
                }
            };

            ParticipantColumn {
                participant: participant.clone(),
                is_mine,
                active: active.into_iter().map(to_view).collect(),
                completed: completed.into_iter().map(to_view).collect(),
                add: None,
            }
        })
        .collect()
}
