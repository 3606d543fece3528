//! Session board: the synchronized view of one session's tasks.
//!
//! A [`SessionBoard`] keeps the last-known session record and task list
//! for one session id, refreshed by the fetcher in [`fetch`], mutated
//! through the optimistic operations in [`mutate`], reconciled by the
//! [`merge`] policy, and projected into per-participant columns by
//! [`view`].
//!
//! State lives behind a `parking_lot::Mutex` that is only ever taken
//! inside synchronous closures, never across a store request.

pub mod fetch;
pub mod merge;
pub mod mutate;
pub mod state;
pub mod view;

use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::time::Instant;

use studyroom_proto::task::{MAX_TASK_TEXT_LENGTH, TextError};
use studyroom_proto::{Session, SessionId, Task, TaskId, User};

use crate::store::StoreError;

pub use merge::MergePolicy;
pub use state::{ActionState, AddState, ItemError, ItemInteraction, ItemState, ViewPhase};
pub use view::{Access, BoardView, ParticipantColumn, SortOrder, TaskView};

use state::BoardState;

/// Errors returned by board mutations.
///
/// Every variant except [`MutationError::Store`] is a local rejection:
/// no request was sent and no state changed.
#[derive(Debug, thiserror::Error)]
pub enum MutationError {
    /// Task text or session name failed validation.
    #[error(transparent)]
    InvalidText(#[from] TextError),

    /// The session record has not been loaded yet.
    #[error("session not loaded yet")]
    NotLoaded,

    /// The current user is not on the session roster.
    #[error("you are not a participant of this session")]
    NotParticipant,

    /// The task belongs to another participant.
    #[error("task {0} belongs to another participant")]
    NotOwner(TaskId),

    /// Tasks can only be added to the current user's own list.
    #[error("cannot add tasks to participant {0}'s list")]
    ForeignList(studyroom_proto::UserId),

    /// Only the session creator may do this.
    #[error("only the session creator can do this")]
    NotCreator,

    /// No task with this id is on the board.
    #[error("task {0} not found")]
    TaskNotFound(TaskId),

    /// Another operation on this task is still in flight.
    #[error("task {0} has an operation in flight")]
    Busy(TaskId),

    /// An add is already in flight.
    #[error("a task is already being added")]
    AddInProgress,

    /// A rename is already in flight.
    #[error("the session is already being renamed")]
    RenameInProgress,

    /// The board was closed before the response arrived.
    #[error("board closed")]
    Detached,

    /// The task store rejected the request.
    #[error("task store request failed: {0}")]
    Store(#[from] StoreError),
}

pub(crate) const LOAD_ERROR: &str = "Failed to load study room. Please try again.";
pub(crate) const ADD_ERROR: &str = "Failed to add task. Please try again.";
pub(crate) const TOGGLE_ERROR: &str = "Failed to update task. Please try again.";
pub(crate) const EDIT_ERROR: &str = "Failed to save task. Please try again.";
pub(crate) const DELETE_ERROR: &str = "Failed to delete task. Please try again.";
pub(crate) const RENAME_ERROR: &str = "Failed to update session name. Please try again.";

/// Tunables of a [`SessionBoard`].
#[derive(Debug, Clone)]
pub struct BoardSettings {
    /// Column sort order.
    pub sort_order: SortOrder,
    /// How long destructive-action errors stay visible.
    pub error_display: Duration,
    /// How polled task lists are reconciled with local state.
    pub merge_policy: MergePolicy,
    /// Maximum task text length in characters.
    pub max_task_text_len: usize,
    /// Interval of the task poll, used for [`SessionBoard::staleness_bound`].
    pub task_poll_interval: Duration,
}

impl Default for BoardSettings {
    fn default() -> Self {
        Self {
            sort_order: SortOrder::default(),
            error_display: Duration::from_secs(1),
            merge_policy: MergePolicy::default(),
            max_task_text_len: MAX_TASK_TEXT_LENGTH,
            task_poll_interval: Duration::from_secs(5),
        }
    }
}

/// Synchronized task board for one session, as seen by one user.
pub struct SessionBoard<S> {
    store: S,
    session_id: SessionId,
    me: User,
    settings: BoardSettings,
    state: Mutex<BoardState>,
    changes: watch::Sender<u64>,
}

impl<S> SessionBoard<S> {
    /// Creates an empty board; call [`load_initial`](Self::load_initial)
    /// or start a [`Poller`](crate::poll::Poller) to fill it.
    pub fn new(store: S, session_id: SessionId, me: User, settings: BoardSettings) -> Self {
        let (changes, _) = watch::channel(0);
        Self {
            store,
            session_id,
            me,
            settings,
            state: Mutex::new(BoardState::default()),
            changes,
        }
    }

    /// The session this board shows.
    pub const fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    /// The user the board acts as.
    pub const fn me(&self) -> &User {
        &self.me
    }

    pub const fn settings(&self) -> &BoardSettings {
        &self.settings
    }

    pub const fn store(&self) -> &S {
        &self.store
    }

    /// Longest time a settled mutation may appear undone by a poll.
    pub const fn staleness_bound(&self) -> Duration {
        self.settings
            .merge_policy
            .staleness_bound(self.settings.task_poll_interval)
    }

    /// Subscribes to change notifications.
    ///
    /// The value is a revision counter bumped after every fetch or
    /// mutation that settles.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.changes.subscribe()
    }

    /// Current page-level phase.
    pub fn phase(&self) -> ViewPhase {
        self.with_state(|s| s.phase())
    }

    /// Last-known session record.
    pub fn session(&self) -> Option<Session> {
        self.with_state(|s| s.session.clone())
    }

    /// Last-known task list, in the order the store returned it.
    pub fn tasks(&self) -> Vec<Task> {
        self.with_state(|s| s.tasks.clone())
    }

    /// Interaction state of one task.
    pub fn interaction(&self, id: TaskId) -> ItemInteraction {
        self.with_state(|s| s.items.get(&id).cloned().unwrap_or_default())
    }

    /// State of the add affordance.
    pub fn add_state(&self) -> AddState {
        self.with_state(|s| s.add.clone())
    }

    /// State of the rename action.
    pub fn rename_state(&self) -> ActionState {
        self.with_state(|s| s.rename.clone())
    }

    /// Projects the board for rendering now.
    pub fn view(&self) -> BoardView {
        self.view_at(Instant::now())
    }

    /// Projects the board as it looks at `now`.
    ///
    /// Errors whose display window ended before `now` are hidden.
    pub fn view_at(&self, now: Instant) -> BoardView {
        let me = self.me.id;
        let order = self.settings.sort_order;
        self.with_state(|s| {
            let access = view::access(s.session.as_ref(), me);
            let (session_name, columns, rename) = match (&s.session, access) {
                (Some(session), Access::Participant) => {
                    let mut columns =
                        view::partition(&s.tasks, &session.participants, me, order, |task| {
                            s.items.get(&task.id).map_or((ItemState::Idle, None), |item| {
                                (item.state, item.visible_error(now).map(str::to_string))
                            })
                        });
                    for column in columns.iter_mut().filter(|c| c.is_mine) {
                        column.add = Some(s.add.clone());
                    }
                    let rename = session.is_creator(me).then(|| s.rename.clone());
                    (Some(session.name.clone()), columns, rename)
                }
                (Some(session), _) => (Some(session.name.clone()), Vec::new(), None),
                (None, _) => (None, Vec::new(), None),
            };
            BoardView {
                phase: s.phase(),
                access,
                session_name,
                columns,
                rename,
            }
        })
    }

    /// Drops task errors whose display window ended before `now`.
    pub fn expire_errors(&self, now: Instant) {
        self.with_state(|s| s.expire_errors(now));
    }

    /// Detaches the board. Responses arriving afterwards are ignored.
    pub fn close(&self) {
        self.with_state(|s| s.detached = true);
        tracing::debug!(session_id = %self.session_id, "board closed");
    }

    /// Whether [`close`](Self::close) has been called.
    pub fn is_closed(&self) -> bool {
        self.with_state(|s| s.detached)
    }

    fn with_state<R>(&self, f: impl FnOnce(&mut BoardState) -> R) -> R {
        let mut state = self.state.lock();
        f(&mut state)
    }

    fn notify(&self) {
        self.changes.send_modify(|rev| *rev += 1);
    }
}
