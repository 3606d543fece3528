//! The current user's list of study rooms.
//!
//! [`SessionDirectory`] loads every session the user belongs to and
//! offers create, delete and leave. Delete and leave remove a session
//! from the list only after the store confirms, and share one
//! [`SessionAction`] slot whose error is shown for a short window.

use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::Instant;

use studyroom_proto::task::{TextError, normalize_session_name};
use studyroom_proto::{Session, SessionId, UserId};

use crate::store::{StoreError, TaskStore};

const LOAD_ERROR: &str = "Failed to load study rooms. Please try again.";
const CREATE_ERROR: &str = "Failed to create study room. Please try again.";
const DELETE_ERROR: &str = "Failed to delete study room. Please try again.";
const LEAVE_ERROR: &str = "Failed to leave study room. Please try again.";

/// Errors returned by directory operations.
#[derive(Debug, thiserror::Error)]
pub enum DirectoryError {
    /// The session name failed validation.
    #[error(transparent)]
    InvalidName(#[from] TextError),

    /// No session with this id is in the list.
    #[error("session {0} not found")]
    UnknownSession(SessionId),

    /// Only the creator may delete a session.
    #[error("only the creator can delete this study room")]
    NotCreator,

    /// The creator cannot leave; they must delete the session.
    #[error("the creator cannot leave; delete the study room instead")]
    CreatorCannotLeave,

    /// Another delete or leave is in flight.
    #[error("another study room action is in progress")]
    Busy,

    /// The task store rejected the request.
    #[error("task store request failed: {0}")]
    Store(#[from] StoreError),
}

/// Destructive action on one session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionKind {
    Delete,
    Leave,
}

/// State of the last delete or leave.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionAction {
    pub session_id: SessionId,
    pub kind: ActionKind,
    pub pending: bool,
    pub error: Option<String>,
    expires_at: Option<Instant>,
}

#[derive(Debug, Default)]
struct DirectoryState {
    sessions: Vec<Session>,
    loading: bool,
    loaded: bool,
    error: Option<String>,
    creating: bool,
    create_error: Option<String>,
    action: Option<SessionAction>,
}

/// Sessions the current user participates in.
pub struct SessionDirectory<S> {
    store: S,
    me: UserId,
    error_display: Duration,
    state: Mutex<DirectoryState>,
}

impl<S: TaskStore> SessionDirectory<S> {
    pub fn new(store: S, me: UserId, error_display: Duration) -> Self {
        Self {
            store,
            me,
            error_display,
            state: Mutex::new(DirectoryState::default()),
        }
    }

    /// Fetches the session list.
    ///
    /// # Errors
    ///
    /// Returns the store error; the previous list is kept and a load
    /// error recorded.
    pub async fn load(&self) -> Result<(), DirectoryError> {
        self.with_state(|s| {
            s.loading = true;
            s.error = None;
        });
        let result = self.store.list_sessions().await;
        self.with_state(|s| {
            s.loading = false;
            s.loaded = true;
            match result {
                Ok(sessions) => {
                    s.sessions = sessions;
                    Ok(())
                }
                Err(e) => {
                    tracing::warn!(error = %e, "session list fetch failed");
                    s.error = Some(LOAD_ERROR.to_string());
                    Err(DirectoryError::Store(e))
                }
            }
        })
    }

    /// Whether a load is in flight.
    pub fn is_loading(&self) -> bool {
        self.with_state(|s| s.loading)
    }

    /// Whether a load has completed, successfully or not.
    pub fn is_loaded(&self) -> bool {
        self.with_state(|s| s.loaded)
    }

    /// Load error, if the last load failed.
    pub fn load_error(&self) -> Option<String> {
        self.with_state(|s| s.error.clone())
    }

    /// Create error, if the last create failed.
    pub fn create_error(&self) -> Option<String> {
        self.with_state(|s| s.create_error.clone())
    }

    /// Sessions, newest first.
    pub fn sessions(&self) -> Vec<Session> {
        let mut sessions = self.with_state(|s| s.sessions.clone());
        sessions.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| b.id.as_str().cmp(a.id.as_str()))
        });
        sessions
    }

    /// The most recently created session.
    pub fn latest(&self) -> Option<Session> {
        self.sessions().into_iter().next()
    }

    /// Creates a session with the current user as creator.
    ///
    /// # Errors
    ///
    /// Returns [`DirectoryError::InvalidName`] without a request for an
    /// empty or over-long name, [`DirectoryError::Busy`] if a create is in
    /// flight, or the store error.
    pub async fn create(&self, name: &str) -> Result<Session, DirectoryError> {
        let name = normalize_session_name(name)?;
        self.with_state(|s| {
            if s.creating {
                return Err(DirectoryError::Busy);
            }
            s.creating = true;
            s.create_error = None;
            Ok(())
        })?;
        let result = self.store.create_session(name).await;
        self.with_state(|s| {
            s.creating = false;
            match result {
                Ok(session) => {
                    tracing::debug!(session_id = %session.id, "study room created");
                    s.sessions.push(session.clone());
                    Ok(session)
                }
                Err(e) => {
                    tracing::warn!(error = %e, "study room create failed");
                    s.create_error = Some(CREATE_ERROR.to_string());
                    Err(DirectoryError::Store(e))
                }
            }
        })
    }

    /// Deletes a session. Creator only.
    ///
    /// # Errors
    ///
    /// Local rejections return without a request; a store failure leaves
    /// the session listed and records an expiring error.
    pub async fn delete(&self, id: &SessionId) -> Result<(), DirectoryError> {
        let me = self.me;
        self.begin_action(id, ActionKind::Delete, |session| {
            if session.is_creator(me) {
                Ok(())
            } else {
                Err(DirectoryError::NotCreator)
            }
        })?;
        let result = self.store.delete_session(id).await;
        self.finish_action(id, ActionKind::Delete, result)
    }

    /// Leaves a session. Not allowed for its creator.
    ///
    /// # Errors
    ///
    /// Local rejections return without a request; a store failure leaves
    /// the session listed and records an expiring error.
    pub async fn leave(&self, id: &SessionId) -> Result<(), DirectoryError> {
        let me = self.me;
        self.begin_action(id, ActionKind::Leave, |session| {
            if session.is_creator(me) {
                Err(DirectoryError::CreatorCannotLeave)
            } else {
                Ok(())
            }
        })?;
        let result = self.store.leave_session(id).await;
        self.finish_action(id, ActionKind::Leave, result)
    }

    /// The delete/leave action as shown at `now`.
    ///
    /// A failed action disappears once its error display window ends.
    pub fn action_at(&self, now: Instant) -> Option<SessionAction> {
        self.with_state(|s| {
            if s
                .action
                .as_ref()
                .is_some_and(|a| !a.pending && a.expires_at.is_some_and(|at| now >= at))
            {
                s.action = None;
            }
            s.action.clone()
        })
    }

    fn begin_action(
        &self,
        id: &SessionId,
        kind: ActionKind,
        allowed: impl FnOnce(&Session) -> Result<(), DirectoryError>,
    ) -> Result<(), DirectoryError> {
        self.with_state(|s| {
            if s.action.as_ref().is_some_and(|a| a.pending) {
                return Err(DirectoryError::Busy);
            }
            let session = s
                .sessions
                .iter()
                .find(|session| &session.id == id)
                .ok_or_else(|| DirectoryError::UnknownSession(id.clone()))?;
            allowed(session)?;
            s.action = Some(SessionAction {
                session_id: id.clone(),
                kind,
                pending: true,
                error: None,
                expires_at: None,
            });
            Ok(())
        })
    }

    fn finish_action(
        &self,
        id: &SessionId,
        kind: ActionKind,
        result: Result<(), StoreError>,
    ) -> Result<(), DirectoryError> {
        let expires_at = Instant::now() + self.error_display;
        self.with_state(|s| match result {
            Ok(()) => {
                tracing::debug!(session_id = %id, ?kind, "study room action applied");
                s.sessions.retain(|session| &session.id != id);
                s.action = None;
                Ok(())
            }
            Err(e) => {
                tracing::warn!(session_id = %id, ?kind, error = %e, "study room action failed");
                let message = match kind {
                    ActionKind::Delete => DELETE_ERROR,
                    ActionKind::Leave => LEAVE_ERROR,
                };
                s.action = Some(SessionAction {
                    session_id: id.clone(),
                    kind,
                    pending: false,
                    error: Some(message.to_string()),
                    expires_at: Some(expires_at),
                });
                Err(DirectoryError::Store(e))
            }
        })
    }

    fn with_state<R>(&self, f: impl FnOnce(&mut DirectoryState) -> R) -> R {
        let mut state = self.state.lock();
        f(&mut state)
    }
}
