//! In-memory tables behind the development server.
//!
//! [`TaskDatabase`] owns the accounts, sessions and tasks and enforces the
//! access rules of the task store API: only participants read or add
//! tasks, only a task's owner changes it, only a session's creator renames
//! or deletes it.

use std::collections::{BTreeMap, HashMap};

use chrono::Utc;
use studyroom_proto::api::{AddTaskRequest, TaskPatch};
use studyroom_proto::task::{normalize_session_name, normalize_task_text};
use studyroom_proto::{Participant, Session, SessionId, Task, TaskId, User, UserId};
use tokio::sync::RwLock;

use crate::error::ApiError;

/// Default number of participants a session admits.
pub const DEFAULT_MAX_PARTICIPANTS: usize = 2;

/// A user together with the token that authenticates them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Account {
    pub user: User,
    pub token: String,
}

impl Account {
    pub fn new(user: User, token: impl Into<String>) -> Self {
        Self {
            user,
            token: token.into(),
        }
    }
}

#[derive(Debug, Default)]
struct Tables {
    sessions: HashMap<SessionId, Session>,
    tasks: BTreeMap<TaskId, Task>,
    next_task_id: u64,
}

impl Tables {
    fn session(&self, id: &SessionId) -> Result<&Session, ApiError> {
        self.sessions
            .get(id)
            .ok_or_else(|| ApiError::not_found("session", id))
    }

    fn session_mut(&mut self, id: &SessionId) -> Result<&mut Session, ApiError> {
        self.sessions
            .get_mut(id)
            .ok_or_else(|| ApiError::not_found("session", id))
    }

    fn member_session(&self, id: &SessionId, user: UserId) -> Result<&Session, ApiError> {
        let session = self.session(id)?;
        if session.is_participant(user) {
            Ok(session)
        } else {
            Err(ApiError::forbidden("you are not a participant of this session"))
        }
    }

    fn owned_task_mut(
        &mut self,
        id: &SessionId,
        task_id: TaskId,
        user: UserId,
    ) -> Result<&mut Task, ApiError> {
        self.member_session(id, user)?;
        let task = self
            .tasks
            .get_mut(&task_id)
            .filter(|t| &t.session == id)
            .ok_or_else(|| ApiError::not_found("task", task_id))?;
        if task.user != user {
            return Err(ApiError::forbidden("only the owner may change this task"));
        }
        Ok(task)
    }
}

/// Accounts plus the session and task tables.
///
/// Thread-safe via [`RwLock`]; accounts are fixed at construction.
#[derive(Debug)]
pub struct TaskDatabase {
    accounts: Vec<Account>,
    tables: RwLock<Tables>,
    max_participants: usize,
}

impl TaskDatabase {
    #[must_use]
    pub fn new(accounts: Vec<Account>, max_participants: usize) -> Self {
        Self {
            accounts,
            tables: RwLock::new(Tables {
                next_task_id: 1,
                ..Tables::default()
            }),
            max_participants,
        }
    }

    /// Looks up the user a token belongs to.
    #[must_use]
    pub fn authenticate(&self, token: &str) -> Option<&User> {
        self.accounts
            .iter()
            .find(|a| a.token == token)
            .map(|a| &a.user)
    }

    /// Sessions `me` participates in, oldest first.
    pub async fn list_sessions(&self, me: UserId) -> Vec<Session> {
        let tables = self.tables.read().await;
        let mut sessions: Vec<Session> = tables
            .sessions
            .values()
            .filter(|s| s.is_participant(me))
            .cloned()
            .collect();
        drop(tables);
        sessions.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        sessions
    }

    /// Fetches a session, seating `me` first if they are not a
    /// participant and a seat is free. A full session is returned as is.
    ///
    /// # Errors
    ///
    /// [`ApiError::NotFound`] if the session does not exist.
    pub async fn get_session(&self, me: &User, id: &SessionId) -> Result<Session, ApiError> {
        let mut tables = self.tables.write().await;
        let session = tables.session_mut(id)?;
        if !session.is_participant(me.id) && session.participants.len() < self.max_participants {
            session
                .participants
                .push(Participant::new(me.id, me.username.clone()));
            tracing::info!(session_id = %id, user_id = %me.id, "participant joined");
        }
        Ok(session.clone())
    }

    /// Creates a session with `me` as creator and sole participant.
    ///
    /// # Errors
    ///
    /// [`ApiError::Validation`] for an empty or overlong name.
    pub async fn create_session(&self, me: &User, name: &str) -> Result<Session, ApiError> {
        let name = normalize_session_name(name)?;
        let session = Session {
            id: SessionId::new(uuid::Uuid::now_v7().to_string()),
            name: name.to_string(),
            creator: me.id,
            participants: vec![Participant::new(me.id, me.username.clone())],
            created_at: Utc::now(),
        };
        self.tables
            .write()
            .await
            .sessions
            .insert(session.id.clone(), session.clone());
        tracing::info!(session_id = %session.id, user_id = %me.id, "session created");
        Ok(session)
    }

    /// Renames a session.
    ///
    /// # Errors
    ///
    /// [`ApiError::Validation`] for a bad name, [`ApiError::NotFound`] for
    /// an unknown session, [`ApiError::Forbidden`] unless `me` created it.
    pub async fn rename_session(
        &self,
        me: UserId,
        id: &SessionId,
        name: &str,
    ) -> Result<Session, ApiError> {
        let name = normalize_session_name(name)?;
        let mut tables = self.tables.write().await;
        let session = tables.session_mut(id)?;
        if !session.is_creator(me) {
            return Err(ApiError::forbidden("only the creator may rename this session"));
        }
        session.name = name.to_string();
        Ok(session.clone())
    }

    /// Deletes a session and every task in it.
    ///
    /// # Errors
    ///
    /// [`ApiError::NotFound`] or [`ApiError::Forbidden`] as for renaming.
    pub async fn delete_session(&self, me: UserId, id: &SessionId) -> Result<(), ApiError> {
        let mut tables = self.tables.write().await;
        if !tables.session(id)?.is_creator(me) {
            return Err(ApiError::forbidden("only the creator may delete this session"));
        }
        tables.sessions.remove(id);
        tables.tasks.retain(|_, t| &t.session != id);
        drop(tables);
        tracing::info!(session_id = %id, "session deleted");
        Ok(())
    }

    /// Removes `me` from a session together with their tasks.
    ///
    /// # Errors
    ///
    /// [`ApiError::Forbidden`] for a non-participant and
    /// [`ApiError::BadRequest`] for the creator.
    pub async fn leave_session(&self, me: UserId, id: &SessionId) -> Result<(), ApiError> {
        let mut tables = self.tables.write().await;
        if tables.member_session(id, me)?.is_creator(me) {
            return Err(ApiError::bad_request(
                "the creator cannot leave; delete the session instead",
            ));
        }
        tables.session_mut(id)?.participants.retain(|p| p.user_id != me);
        tables.tasks.retain(|_, t| !(&t.session == id && t.user == me));
        drop(tables);
        tracing::info!(session_id = %id, user_id = %me, "participant left");
        Ok(())
    }

    /// Every task of a session, in id order.
    ///
    /// # Errors
    ///
    /// [`ApiError::Forbidden`] unless `me` participates.
    pub async fn list_tasks(&self, me: UserId, id: &SessionId) -> Result<Vec<Task>, ApiError> {
        let tables = self.tables.read().await;
        tables.member_session(id, me)?;
        Ok(tables
            .tasks
            .values()
            .filter(|t| &t.session == id)
            .cloned()
            .collect())
    }

    /// Adds a task to `me`'s own list.
    ///
    /// # Errors
    ///
    /// [`ApiError::Validation`] for bad text, [`ApiError::Forbidden`] for
    /// a non-participant or when `request.user_id` is someone else.
    pub async fn add_task(
        &self,
        me: UserId,
        id: &SessionId,
        request: &AddTaskRequest,
    ) -> Result<Task, ApiError> {
        let text = normalize_task_text(&request.text)?;
        let mut tables = self.tables.write().await;
        tables.member_session(id, me)?;
        if request.user_id != me {
            return Err(ApiError::forbidden("tasks can only be added to your own list"));
        }
        let now = Utc::now();
        let task = Task {
            id: TaskId(tables.next_task_id),
            session: id.clone(),
            user: me,
            text: text.to_string(),
            is_done: false,
            created_at: now,
            updated_at: now,
        };
        tables.next_task_id += 1;
        tables.tasks.insert(task.id, task.clone());
        Ok(task)
    }

    /// Applies a patch to one of `me`'s tasks.
    ///
    /// # Errors
    ///
    /// [`ApiError::Validation`] for bad text, [`ApiError::NotFound`] for a
    /// task outside the session, [`ApiError::Forbidden`] for someone
    /// else's task.
    pub async fn update_task(
        &self,
        me: UserId,
        id: &SessionId,
        task_id: TaskId,
        patch: &TaskPatch,
    ) -> Result<Task, ApiError> {
        let text = patch.text.as_deref().map(normalize_task_text).transpose()?;
        let mut tables = self.tables.write().await;
        let task = tables.owned_task_mut(id, task_id, me)?;
        if let Some(text) = text {
            task.text = text.to_string();
        }
        if let Some(done) = patch.is_done {
            task.is_done = done;
        }
        task.updated_at = Utc::now();
        Ok(task.clone())
    }

    /// Deletes one of `me`'s tasks.
    ///
    /// # Errors
    ///
    /// As for [`Self::update_task`].
    pub async fn delete_task(
        &self,
        me: UserId,
        id: &SessionId,
        task_id: TaskId,
    ) -> Result<(), ApiError> {
        let mut tables = self.tables.write().await;
        tables.owned_task_mut(id, task_id, me)?;
        tables.tasks.remove(&task_id);
        Ok(())
    }
}
