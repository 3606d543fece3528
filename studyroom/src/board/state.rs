//! Mutable state behind a [`SessionBoard`](super::SessionBoard).
//!
//! Holds the last-known session record and task list, the poll-cycle
//! flags, and the per-item interaction state of the mutation engine.

use std::collections::HashMap;

use tokio::time::Instant;

use studyroom_proto::{Session, Task, TaskId};

use super::merge::{LocalChange, MergeGuard, MergePolicy, merge_tasks};

/// In-flight operation on a single task.
///
/// At most one operation per task can be pending; the board refuses to
/// start another while the task is not [`ItemState::Idle`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ItemState {
    /// No request in flight.
    #[default]
    Idle,
    /// A completion flip is in flight.
    TogglePending,
    /// A delete is in flight.
    DeletePending,
    /// A text edit is in flight; the task shows the new text meanwhile.
    EditPending,
}

/// Error shown next to a single task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemError {
    /// User-facing message.
    pub message: String,
    /// When the message stops being shown, for destructive actions.
    pub expires_at: Option<Instant>,
}

impl ItemError {
    pub(crate) fn new(message: &str) -> Self {
        Self {
            message: message.to_string(),
            expires_at: None,
        }
    }

    pub(crate) fn expiring(message: &str, expires_at: Instant) -> Self {
        Self {
            message: message.to_string(),
            expires_at: Some(expires_at),
        }
    }

    /// Whether the message is still shown at `now`.
    #[must_use]
    pub fn is_visible(&self, now: Instant) -> bool {
        self.expires_at.is_none_or(|at| now < at)
    }
}

/// Text before and after an in-flight edit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct PendingEdit {
    pub prior: String,
    pub proposed: String,
}

/// Interaction state of one task.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ItemInteraction {
    /// Operation in flight, if any.
    pub state: ItemState,
    /// Last failure on this task.
    pub error: Option<ItemError>,
    pub(crate) edit: Option<PendingEdit>,
}

impl ItemInteraction {
    /// Error message still visible at `now`.
    #[must_use]
    pub fn visible_error(&self, now: Instant) -> Option<&str> {
        self.error
            .as_ref()
            .filter(|e| e.is_visible(now))
            .map(|e| e.message.as_str())
    }

    fn is_settled(&self) -> bool {
        self.state == ItemState::Idle && self.error.is_none()
    }
}

/// State of the "add task" affordance.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AddState {
    /// An add request is in flight.
    pub pending: bool,
    /// Last add failure.
    pub error: Option<String>,
}

/// State of a board-level action such as renaming the session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActionState {
    /// The request is in flight.
    pub pending: bool,
    /// Last failure.
    pub error: Option<String>,
}

/// Page-level phase of a board, derived from its fetch flags.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ViewPhase {
    /// The first fetch has not finished yet.
    LoadingInitial,
    /// Data is loaded and nothing is being fetched.
    Ready,
    /// Data is loaded and a background fetch is in flight.
    Refreshing,
    /// The initial load failed; stays until the board is reloaded.
    Errored(String),
}

#[derive(Debug, Default)]
pub(crate) struct BoardState {
    pub session: Option<Session>,
    pub tasks: Vec<Task>,

    pub loading: bool,
    pub session_loaded: bool,
    pub tasks_loaded: bool,
    pub load_error: Option<String>,
    pub background_fetches: u32,

    pub items: HashMap<TaskId, ItemInteraction>,
    pub add: AddState,
    pub rename: ActionState,

    /// Bumped every time a mutation settles.
    pub mutation_seq: u64,
    /// Mutation sequence at the start of each task fetch still in flight.
    pub fetches_in_flight: Vec<u64>,
    /// Local changes made by settled mutations, with the sequence they
    /// settled at, kept until no older task fetch can land.
    pub settled: HashMap<TaskId, (u64, LocalChange)>,

    pub detached: bool,
}

impl BoardState {
    pub fn phase(&self) -> ViewPhase {
        if let Some(message) = &self.load_error {
            ViewPhase::Errored(message.clone())
        } else if self.loading || !(self.session_loaded && self.tasks_loaded) {
            ViewPhase::LoadingInitial
        } else if self.background_fetches > 0 {
            ViewPhase::Refreshing
        } else {
            ViewPhase::Ready
        }
    }

    pub fn task(&self, id: TaskId) -> Option<&Task> {
        self.tasks.iter().find(|t| t.id == id)
    }

    pub fn item_state(&self, id: TaskId) -> ItemState {
        self.items.get(&id).map_or(ItemState::Idle, |i| i.state)
    }

    /// Moves a task into `state`, clearing its previous error.
    pub fn begin_item(&mut self, id: TaskId, state: ItemState) -> &mut ItemInteraction {
        let item = self.items.entry(id).or_default();
        item.state = state;
        item.error = None;
        item
    }

    /// Returns a task to idle, recording `error` if the operation failed.
    pub fn settle_item(&mut self, id: TaskId, error: Option<ItemError>) -> Option<PendingEdit> {
        let item = self.items.entry(id).or_default();
        item.state = ItemState::Idle;
        item.error = error;
        let edit = item.edit.take();
        if item.is_settled() {
            self.items.remove(&id);
        }
        edit
    }

    /// Replaces or appends a single task.
    pub fn upsert_task(&mut self, task: Task) {
        self.record_change(task.id, LocalChange::Upserted);
        if let Some(slot) = self.tasks.iter_mut().find(|t| t.id == task.id) {
            *slot = task;
        } else {
            self.tasks.push(task);
        }
    }

    /// Removes a single task and its interaction state.
    pub fn remove_task(&mut self, id: TaskId) {
        self.record_change(id, LocalChange::Removed);
        self.tasks.retain(|t| t.id != id);
        self.items.remove(&id);
    }

    fn record_change(&mut self, id: TaskId, change: LocalChange) {
        self.mutation_seq += 1;
        if !self.fetches_in_flight.is_empty() {
            self.settled.insert(id, (self.mutation_seq, change));
        }
    }

    /// Registers a task fetch and returns its start marker.
    pub fn begin_task_fetch(&mut self) -> u64 {
        self.fetches_in_flight.push(self.mutation_seq);
        self.mutation_seq
    }

    /// Unregisters a task fetch without applying a result.
    pub fn end_task_fetch(&mut self, started_at: u64) {
        if let Some(pos) = self.fetches_in_flight.iter().position(|s| *s == started_at) {
            self.fetches_in_flight.swap_remove(pos);
        }
        let oldest = self.fetches_in_flight.iter().copied().min();
        match oldest {
            Some(oldest) => self.settled.retain(|_, (seq, _)| *seq > oldest),
            None => self.settled.clear(),
        }
    }

    /// Applies a fetched task list under `policy`.
    pub fn apply_remote_tasks(&mut self, policy: MergePolicy, remote: Vec<Task>, started_at: u64) {
        let guard = self.merge_guard(started_at);
        self.tasks = merge_tasks(policy, &self.tasks, remote, &guard);
        let tasks = &self.tasks;
        self.items
            .retain(|id, item| item.state != ItemState::Idle || tasks.iter().any(|t| t.id == *id));
        self.end_task_fetch(started_at);
    }

    fn merge_guard(&self, started_at: u64) -> MergeGuard {
        let mut guard = MergeGuard::default();
        for (id, item) in &self.items {
            if item.state != ItemState::Idle {
                guard.pending.insert(*id);
            }
            if let Some(edit) = &item.edit {
                guard.optimistic_text.insert(*id, edit.proposed.clone());
            }
        }
        for (id, (seq, change)) in &self.settled {
            if *seq > started_at {
                guard.settled.insert(*id, *change);
            }
        }
        guard
    }

    /// Drops errors that are no longer visible at `now`.
    pub fn expire_errors(&mut self, now: Instant) {
        for item in self.items.values_mut() {
            if item.error.as_ref().is_some_and(|e| !e.is_visible(now)) {
                item.error = None;
            }
        }
        self.items.retain(|_, item| !item.is_settled());
    }
}
