//! Task store abstraction for `StudyRoom`.
//!
//! Defines the [`TaskStore`] trait that every backend must satisfy.
//! Concrete implementations include:
//! - [`http::HttpTaskStore`]: authenticated JSON-over-HTTP client for the remote store
//! - [`memory::InMemoryTaskStore`]: shared in-process backend for tests and demos

pub mod http;
pub mod memory;

use std::fmt;
use std::future::Future;

use studyroom_proto::api::{AddTaskRequest, TaskPatch};
use studyroom_proto::{Session, SessionId, Task, TaskId, User};

/// Identifies one task store endpoint.
///
/// Used for logging and by the in-memory store's failure injection and
/// call accounting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreOp {
    /// `GET /auth/me`
    CurrentUser,
    /// `GET /sessions/`
    ListSessions,
    /// `GET /sessions/{id}`
    GetSession,
    /// `POST /sessions/create`
    CreateSession,
    /// `PUT /sessions/{id}`
    RenameSession,
    /// `DELETE /sessions/{id}`
    DeleteSession,
    /// `POST /sessions/{id}/leave`
    LeaveSession,
    /// `GET /sessions/{id}/tasks`
    ListTasks,
    /// `POST /sessions/{id}/tasks/add`
    AddTask,
    /// `PUT /sessions/{id}/tasks/{task_id}`
    UpdateTask,
    /// `DELETE /sessions/{id}/tasks/{task_id}`
    DeleteTask,
}

impl fmt::Display for StoreOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::CurrentUser => "current_user",
            Self::ListSessions => "list_sessions",
            Self::GetSession => "get_session",
            Self::CreateSession => "create_session",
            Self::RenameSession => "rename_session",
            Self::DeleteSession => "delete_session",
            Self::LeaveSession => "leave_session",
            Self::ListTasks => "list_tasks",
            Self::AddTask => "add_task",
            Self::UpdateTask => "update_task",
            Self::DeleteTask => "delete_task",
        };
        f.write_str(name)
    }
}

/// Errors surfaced by a task store.
///
/// The board never branches on the variant: any error is a plain failure
/// of the operation that issued the request.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The store answered with a non-2xx status.
    #[error("request failed with status {status}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Response body, for logging.
        body: String,
    },

    /// The request did not complete in time.
    #[error("request timed out")]
    Timeout,

    /// The store could not be reached.
    #[error("connection failed: {0}")]
    Connection(String),

    /// The response body could not be decoded.
    #[error("invalid response body: {0}")]
    Decode(String),

    /// The configured base URL or a request path is invalid.
    #[error("invalid request url: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// A session id that cannot be used as a single path segment
    /// (empty, `.` or `..`).
    #[error("invalid session id: {0:?}")]
    InvalidSessionId(String),

    /// The auth token cannot be sent as a header value.
    #[error("auth token contains characters not allowed in a header")]
    InvalidToken,
}

/// Async client for the remote task store.
///
/// One method per endpoint. Implementations attach authentication to
/// every request and map any non-success response to [`StoreError`].
pub trait TaskStore: Send + Sync {
    /// Fetch the authenticated user.
    fn current_user(&self) -> impl Future<Output = Result<User, StoreError>> + Send;

    /// Fetch every session the authenticated user participates in.
    fn list_sessions(&self) -> impl Future<Output = Result<Vec<Session>, StoreError>> + Send;

    /// Fetch one session record.
    fn get_session(
        &self,
        id: &SessionId,
    ) -> impl Future<Output = Result<Session, StoreError>> + Send;

    /// Create a session with the caller as creator.
    fn create_session(&self, name: &str)
    -> impl Future<Output = Result<Session, StoreError>> + Send;

    /// Rename a session, returning the updated record.
    fn rename_session(
        &self,
        id: &SessionId,
        name: &str,
    ) -> impl Future<Output = Result<Session, StoreError>> + Send;

    /// Delete a session and, server-side, all of its tasks.
    fn delete_session(&self, id: &SessionId)
    -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Leave a session.
    fn leave_session(&self, id: &SessionId) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Fetch the full task list of a session.
    fn list_tasks(
        &self,
        id: &SessionId,
    ) -> impl Future<Output = Result<Vec<Task>, StoreError>> + Send;

    /// Add a task; the store assigns id and timestamps.
    fn add_task(
        &self,
        id: &SessionId,
        request: &AddTaskRequest,
    ) -> impl Future<Output = Result<Task, StoreError>> + Send;

    /// Apply a patch to a task, returning the updated record.
    fn update_task(
        &self,
        id: &SessionId,
        task_id: TaskId,
        patch: &TaskPatch,
    ) -> impl Future<Output = Result<Task, StoreError>> + Send;

    /// Delete a task.
    fn delete_task(
        &self,
        id: &SessionId,
        task_id: TaskId,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;
}
