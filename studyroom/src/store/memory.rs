//! In-memory task store for testing and offline demos.
//!
//! All handles created from one [`InMemoryTaskStore`] share a single
//! backend, so two handles acting as different users behave like two
//! participants talking to the same remote store. The backend applies the
//! same membership and ownership rules as the remote store and adds test
//! controls: injected failures, per-endpoint call counters, and pause
//! gates that hold a request in flight until released.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use tokio::sync::Semaphore;

use studyroom_proto::api::{AddTaskRequest, TaskPatch};
use studyroom_proto::task::{normalize_session_name, normalize_task_text};
use studyroom_proto::{Participant, Session, SessionId, Task, TaskId, User, UserId};

use super::{StoreError, StoreOp, TaskStore};

/// First logical timestamp handed out by the backend.
const EPOCH_SECS: i64 = 1_704_067_200;

/// Default seat count of a study room.
const DEFAULT_MAX_PARTICIPANTS: usize = 2;

#[derive(Debug)]
struct BackendState {
    users: HashMap<UserId, User>,
    sessions: Vec<Session>,
    tasks: BTreeMap<TaskId, Task>,
    next_task_id: u64,
    next_session_seq: u64,
    tick: i64,
    failures: HashMap<StoreOp, u32>,
    calls: HashMap<StoreOp, u32>,
    max_participants: usize,
}

impl Default for BackendState {
    fn default() -> Self {
        Self {
            users: HashMap::new(),
            sessions: Vec::new(),
            tasks: BTreeMap::new(),
            next_task_id: 1,
            next_session_seq: 1,
            tick: 0,
            failures: HashMap::new(),
            calls: HashMap::new(),
            max_participants: DEFAULT_MAX_PARTICIPANTS,
        }
    }
}

impl BackendState {
    /// Returns a strictly increasing logical timestamp.
    fn now(&mut self) -> DateTime<Utc> {
        self.tick += 1;
        DateTime::from_timestamp(EPOCH_SECS, 0).unwrap_or_default() + Duration::seconds(self.tick)
    }

    fn session(&self, id: &SessionId) -> Result<&Session, StoreError> {
        self.sessions
            .iter()
            .find(|s| &s.id == id)
            .ok_or_else(|| not_found(&format!("session {id}")))
    }

    fn session_mut(&mut self, id: &SessionId) -> Result<&mut Session, StoreError> {
        self.sessions
            .iter_mut()
            .find(|s| &s.id == id)
            .ok_or_else(|| not_found(&format!("session {id}")))
    }

    fn member_session(&self, id: &SessionId, user: UserId) -> Result<&Session, StoreError> {
        let session = self.session(id)?;
        if session.is_participant(user) {
            Ok(session)
        } else {
            Err(status(403, "not a participant of this session"))
        }
    }

    fn owned_task_mut(
        &mut self,
        id: &SessionId,
        task_id: TaskId,
        user: UserId,
    ) -> Result<&mut Task, StoreError> {
        self.member_session(id, user)?;
        let task = self
            .tasks
            .get_mut(&task_id)
            .filter(|t| &t.session == id)
            .ok_or_else(|| not_found(&format!("task {task_id}")))?;
        if task.user != user {
            return Err(status(403, "only the owner may change this task"));
        }
        Ok(task)
    }
}

fn status(code: u16, body: &str) -> StoreError {
    StoreError::Status {
        status: code,
        body: body.to_string(),
    }
}

fn not_found(what: &str) -> StoreError {
    status(404, &format!("{what} not found"))
}

#[derive(Debug, Default)]
struct Backend {
    state: Mutex<BackendState>,
    gates: Mutex<HashMap<StoreOp, Arc<Semaphore>>>,
    response_gates: Mutex<HashMap<StoreOp, Arc<Semaphore>>>,
}

/// A handle onto a shared in-memory backend, acting as one user.
#[derive(Debug, Clone)]
pub struct InMemoryTaskStore {
    backend: Arc<Backend>,
    user: UserId,
}

impl InMemoryTaskStore {
    /// Creates a fresh backend and a handle acting as `user`.
    #[must_use]
    pub fn new(user: User) -> Self {
        let store = Self {
            backend: Arc::new(Backend::default()),
            user: user.id,
        };
        store.with_state(|s| s.users.insert(user.id, user));
        store
    }

    /// Returns a handle on the same backend acting as `user`.
    #[must_use]
    pub fn as_user(&self, user: User) -> Self {
        let id = user.id;
        self.with_state(|s| s.users.insert(id, user));
        Self {
            backend: Arc::clone(&self.backend),
            user: id,
        }
    }

    /// The user this handle authenticates as.
    #[must_use]
    pub const fn user_id(&self) -> UserId {
        self.user
    }

    /// Sets how many participants a session accepts.
    pub fn set_max_participants(&self, max: usize) {
        self.with_state(|s| s.max_participants = max);
    }

    /// Adds the acting user to a session's roster, the way opening a
    /// shared session link does.
    ///
    /// # Errors
    ///
    /// Returns a 404 status if the session does not exist, or 403 if it
    /// is already full.
    pub fn join_session(&self, id: &SessionId) -> Result<Session, StoreError> {
        let user = self.user;
        self.with_state(|s| {
            let username = s
                .users
                .get(&user)
                .map(|u| u.username.clone())
                .unwrap_or_default();
            let max = s.max_participants;
            let session = s.session_mut(id)?;
            if !session.is_participant(user) {
                if session.participants.len() >= max {
                    return Err(status(403, "session is full"));
                }
                session.participants.push(Participant::new(user, username));
            }
            Ok(session.clone())
        })
    }

    /// Inserts a task directly, bypassing call accounting and gates.
    ///
    /// # Errors
    ///
    /// Returns a 404 status if the session does not exist.
    pub fn seed_task(
        &self,
        id: &SessionId,
        owner: UserId,
        text: &str,
        is_done: bool,
    ) -> Result<Task, StoreError> {
        self.with_state(|s| {
            s.session(id)?;
            let now = s.now();
            let task = Task {
                id: TaskId(s.next_task_id),
                session: id.clone(),
                user: owner,
                text: text.to_string(),
                is_done,
                created_at: now,
                updated_at: now,
            };
            s.next_task_id += 1;
            s.tasks.insert(task.id, task.clone());
            Ok(task)
        })
    }

    /// Returns the backend's current tasks for a session, in id order.
    #[must_use]
    pub fn tasks_snapshot(&self, id: &SessionId) -> Vec<Task> {
        self.with_state(|s| {
            s.tasks
                .values()
                .filter(|t| &t.session == id)
                .cloned()
                .collect()
        })
    }

    /// Makes the next call to `op` fail with a 500 status.
    ///
    /// Calling this repeatedly queues that many failures.
    pub fn fail_next(&self, op: StoreOp) {
        self.with_state(|s| *s.failures.entry(op).or_default() += 1);
    }

    /// Number of requests issued to `op` across all handles.
    #[must_use]
    pub fn calls(&self, op: StoreOp) -> u32 {
        self.with_state(|s| s.calls.get(&op).copied().unwrap_or(0))
    }

    /// Holds every subsequent `op` request in flight until
    /// [`release`](Self::release) is called.
    pub fn pause(&self, op: StoreOp) {
        self.backend
            .gates
            .lock()
            .insert(op, Arc::new(Semaphore::new(0)));
    }

    /// Holds every subsequent `op` response until
    /// [`release`](Self::release) is called. Unlike [`pause`](Self::pause),
    /// the response is read when the request arrives, so it reflects the
    /// backend as it was then. Applies to the read operations
    /// (`GetSession`, `ListTasks`).
    pub fn hold_response(&self, op: StoreOp) {
        self.backend
            .response_gates
            .lock()
            .insert(op, Arc::new(Semaphore::new(0)));
    }

    /// Lets every request held by [`pause`](Self::pause) or
    /// [`hold_response`](Self::hold_response) proceed.
    pub fn release(&self, op: StoreOp) {
        if let Some(gate) = self.backend.gates.lock().remove(&op) {
            gate.close();
        }
        if let Some(gate) = self.backend.response_gates.lock().remove(&op) {
            gate.close();
        }
    }

    fn with_state<R>(&self, f: impl FnOnce(&mut BackendState) -> R) -> R {
        let mut state = self.backend.state.lock();
        f(&mut state)
    }

    /// Records the call, waits at the gate if paused, then applies any
    /// injected failure.
    async fn begin(&self, op: StoreOp) -> Result<(), StoreError> {
        self.with_state(|s| *s.calls.entry(op).or_default() += 1);
        let gate = self.backend.gates.lock().get(&op).cloned();
        if let Some(gate) = gate {
            // A closed gate means release() was called.
            let _ = gate.acquire().await;
        }
        self.with_state(|s| match s.failures.get_mut(&op) {
            Some(n) if *n > 0 => {
                *n -= 1;
                Err(status(500, "injected failure"))
            }
            _ => Ok(()),
        })
    }

    /// Waits at the response gate of `op`, if held, before handing back
    /// an already computed result.
    async fn respond<T>(
        &self,
        op: StoreOp,
        result: Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        let gate = self.backend.response_gates.lock().get(&op).cloned();
        if let Some(gate) = gate {
            let _ = gate.acquire().await;
        }
        result
    }
}

impl TaskStore for InMemoryTaskStore {
    async fn current_user(&self) -> Result<User, StoreError> {
        self.begin(StoreOp::CurrentUser).await?;
        let user = self.user;
        self.with_state(|s| {
            s.users
                .get(&user)
                .cloned()
                .ok_or_else(|| status(401, "unknown user"))
        })
    }

    async fn list_sessions(&self) -> Result<Vec<Session>, StoreError> {
        self.begin(StoreOp::ListSessions).await?;
        let user = self.user;
        self.with_state(|s| {
            Ok(s.sessions
                .iter()
                .filter(|session| session.is_participant(user))
                .cloned()
                .collect())
        })
    }

    async fn get_session(&self, id: &SessionId) -> Result<Session, StoreError> {
        self.begin(StoreOp::GetSession).await?;
        let result = self.with_state(|s| s.session(id).cloned());
        self.respond(StoreOp::GetSession, result).await
    }

    async fn create_session(&self, name: &str) -> Result<Session, StoreError> {
        self.begin(StoreOp::CreateSession).await?;
        let name = normalize_session_name(name).map_err(|e| status(400, &e.to_string()))?;
        let user = self.user;
        self.with_state(|s| {
            let username = s
                .users
                .get(&user)
                .map(|u| u.username.clone())
                .unwrap_or_default();
            let session = Session {
                id: SessionId::new(format!("session-{}", s.next_session_seq)),
                name: name.to_string(),
                creator: user,
                participants: vec![Participant::new(user, username)],
                created_at: s.now(),
            };
            s.next_session_seq += 1;
            s.sessions.push(session.clone());
            Ok(session)
        })
    }

    async fn rename_session(&self, id: &SessionId, name: &str) -> Result<Session, StoreError> {
        self.begin(StoreOp::RenameSession).await?;
        let name = normalize_session_name(name).map_err(|e| status(400, &e.to_string()))?;
        let user = self.user;
        self.with_state(|s| {
            let session = s.session_mut(id)?;
            if !session.is_creator(user) {
                return Err(status(403, "only the creator may rename this session"));
            }
            session.name = name.to_string();
            Ok(session.clone())
        })
    }

    async fn delete_session(&self, id: &SessionId) -> Result<(), StoreError> {
        self.begin(StoreOp::DeleteSession).await?;
        let user = self.user;
        self.with_state(|s| {
            if !s.session(id)?.is_creator(user) {
                return Err(status(403, "only the creator may delete this session"));
            }
            s.sessions.retain(|session| &session.id != id);
            s.tasks.retain(|_, t| &t.session != id);
            Ok(())
        })
    }

    async fn leave_session(&self, id: &SessionId) -> Result<(), StoreError> {
        self.begin(StoreOp::LeaveSession).await?;
        let user = self.user;
        self.with_state(|s| {
            let session = s.member_session(id, user)?;
            if session.is_creator(user) {
                return Err(status(400, "the creator cannot leave; delete the session instead"));
            }
            s.session_mut(id)?.participants.retain(|p| p.user_id != user);
            s.tasks.retain(|_, t| !(&t.session == id && t.user == user));
            Ok(())
        })
    }

    async fn list_tasks(&self, id: &SessionId) -> Result<Vec<Task>, StoreError> {
        self.begin(StoreOp::ListTasks).await?;
        let user = self.user;
        let result = self.with_state(|s| {
            s.member_session(id, user)?;
            Ok(s.tasks
                .values()
                .filter(|t| &t.session == id)
                .cloned()
                .collect())
        });
        self.respond(StoreOp::ListTasks, result).await
    }

    async fn add_task(&self, id: &SessionId, request: &AddTaskRequest) -> Result<Task, StoreError> {
        self.begin(StoreOp::AddTask).await?;
        let text = normalize_task_text(&request.text).map_err(|e| status(400, &e.to_string()))?;
        let user = self.user;
        self.with_state(|s| {
            s.member_session(id, user)?;
            if request.user_id != user {
                return Err(status(403, "tasks can only be added to your own list"));
            }
            let now = s.now();
            let task = Task {
                id: TaskId(s.next_task_id),
                session: id.clone(),
                user,
                text: text.to_string(),
                is_done: false,
                created_at: now,
                updated_at: now,
            };
            s.next_task_id += 1;
            s.tasks.insert(task.id, task.clone());
            Ok(task)
        })
    }

    async fn update_task(
        &self,
        id: &SessionId,
        task_id: TaskId,
        patch: &TaskPatch,
    ) -> Result<Task, StoreError> {
        self.begin(StoreOp::UpdateTask).await?;
        let text = patch
            .text
            .as_deref()
            .map(normalize_task_text)
            .transpose()
            .map_err(|e| status(400, &e.to_string()))?;
        let user = self.user;
        self.with_state(|s| {
            let now = s.now();
            let task = s.owned_task_mut(id, task_id, user)?;
            if let Some(text) = text {
                task.text = text.to_string();
            }
            if let Some(done) = patch.is_done {
                task.is_done = done;
            }
            task.updated_at = now;
            Ok(task.clone())
        })
    }

    async fn delete_task(&self, id: &SessionId, task_id: TaskId) -> Result<(), StoreError> {
        self.begin(StoreOp::DeleteTask).await?;
        let user = self.user;
        self.with_state(|s| {
            s.owned_task_mut(id, task_id, user)?;
            s.tasks.remove(&task_id);
            Ok(())
        })
    }
}
