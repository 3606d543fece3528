//! HTTP surface of the development task store.
//!
//! Routes live under `/api` and mirror the endpoints the client calls.
//! Every route requires an `Authorization: Token <token>` (or `Bearer`)
//! header naming a configured account; anything else is a 401.

use std::sync::Arc;

use axum::extract::{FromRequestParts, Path, State};
use axum::http::StatusCode;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use axum::routing::{get, post, put};
use axum::{Json, Router};
use studyroom_proto::api::{AddTaskRequest, CreateSessionRequest, RenameSessionRequest, TaskPatch};
use studyroom_proto::{Session, SessionId, Task, TaskId, User};

use crate::config::DevStoreConfig;
use crate::error::ApiError;
use crate::store::TaskDatabase;

/// Shared server state.
#[derive(Debug)]
pub struct DevState {
    pub db: TaskDatabase,
}

impl DevState {
    #[must_use]
    pub const fn new(db: TaskDatabase) -> Self {
        Self { db }
    }

    /// Builds the state from a resolved [`DevStoreConfig`].
    #[must_use]
    pub fn from_config(config: &DevStoreConfig) -> Self {
        Self::new(TaskDatabase::new(
            config.accounts.clone(),
            config.max_participants,
        ))
    }
}

/// The authenticated caller of a request.
struct Caller(User);

impl FromRequestParts<Arc<DevState>> for Caller {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<DevState>,
    ) -> Result<Self, Self::Rejection> {
        let token = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(parse_authorization)
            .ok_or(ApiError::Unauthorized)?;
        state
            .db
            .authenticate(token)
            .cloned()
            .map(Caller)
            .ok_or(ApiError::Unauthorized)
    }
}

/// Extracts the token from `Token <t>` or `Bearer <t>`, scheme
/// case-insensitive.
fn parse_authorization(value: &str) -> Option<&str> {
    let (scheme, token) = value.trim().split_once(' ')?;
    let token = token.trim();
    let known = scheme.eq_ignore_ascii_case("token") || scheme.eq_ignore_ascii_case("bearer");
    (known && !token.is_empty()).then_some(token)
}

/// Builds the application router.
pub fn router(state: Arc<DevState>) -> Router {
    let api = Router::new()
        .route("/auth/me", get(current_user))
        .route("/sessions/", get(list_sessions))
        .route("/sessions/create", post(create_session))
        .route(
            "/sessions/{id}",
            get(get_session).put(rename_session).delete(delete_session),
        )
        .route("/sessions/{id}/leave", post(leave_session))
        .route("/sessions/{id}/tasks", get(list_tasks))
        .route("/sessions/{id}/tasks/add", post(add_task))
        .route(
            "/sessions/{id}/tasks/{task_id}",
            put(update_task).delete(delete_task),
        );
    Router::new().nest("/api", api).with_state(state)
}

/// Starts the server on `addr` and returns the bound address and a join
/// handle.
///
/// # Errors
///
/// Returns an error if the TCP listener cannot bind to the given address.
pub async fn start_server_with_state(
    addr: &str,
    state: Arc<DevState>,
) -> Result<
    (std::net::SocketAddr, tokio::task::JoinHandle<()>),
    Box<dyn std::error::Error + Send + Sync>,
> {
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    let bound_addr = listener.local_addr()?;

    let handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            tracing::error!(error = %e, "devstore server error");
        }
    });

    Ok((bound_addr, handle))
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

async fn current_user(Caller(me): Caller) -> Json<User> {
    Json(me)
}

async fn list_sessions(State(state): State<Arc<DevState>>, Caller(me): Caller) -> Json<Vec<Session>> {
    Json(state.db.list_sessions(me.id).await)
}

async fn create_session(
    State(state): State<Arc<DevState>>,
    Caller(me): Caller,
    Json(body): Json<CreateSessionRequest>,
) -> Result<(StatusCode, Json<Session>), ApiError> {
    let session = state.db.create_session(&me, &body.name).await?;
    Ok((StatusCode::CREATED, Json(session)))
}

async fn get_session(
    State(state): State<Arc<DevState>>,
    Caller(me): Caller,
    Path(id): Path<String>,
) -> Result<Json<Session>, ApiError> {
    Ok(Json(state.db.get_session(&me, &SessionId::new(id)).await?))
}

async fn rename_session(
    State(state): State<Arc<DevState>>,
    Caller(me): Caller,
    Path(id): Path<String>,
    Json(body): Json<RenameSessionRequest>,
) -> Result<Json<Session>, ApiError> {
    let session = state
        .db
        .rename_session(me.id, &SessionId::new(id), &body.name)
        .await?;
    Ok(Json(session))
}

async fn delete_session(
    State(state): State<Arc<DevState>>,
    Caller(me): Caller,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    state.db.delete_session(me.id, &SessionId::new(id)).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn leave_session(
    State(state): State<Arc<DevState>>,
    Caller(me): Caller,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    state.db.leave_session(me.id, &SessionId::new(id)).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn list_tasks(
    State(state): State<Arc<DevState>>,
    Caller(me): Caller,
    Path(id): Path<String>,
) -> Result<Json<Vec<Task>>, ApiError> {
    Ok(Json(state.db.list_tasks(me.id, &SessionId::new(id)).await?))
}

async fn add_task(
    State(state): State<Arc<DevState>>,
    Caller(me): Caller,
    Path(id): Path<String>,
    Json(body): Json<AddTaskRequest>,
) -> Result<(StatusCode, Json<Task>), ApiError> {
    let task = state
        .db
        .add_task(me.id, &SessionId::new(id), &body)
        .await?;
    Ok((StatusCode::CREATED, Json(task)))
}

async fn update_task(
    State(state): State<Arc<DevState>>,
    Caller(me): Caller,
    Path((id, task_id)): Path<(String, u64)>,
    Json(patch): Json<TaskPatch>,
) -> Result<Json<Task>, ApiError> {
    let task = state
        .db
        .update_task(me.id, &SessionId::new(id), TaskId(task_id), &patch)
        .await?;
    Ok(Json(task))
}

async fn delete_task(
    State(state): State<Arc<DevState>>,
    Caller(me): Caller,
    Path((id, task_id)): Path<(String, u64)>,
) -> Result<StatusCode, ApiError> {
    state
        .db
        .delete_task(me.id, &SessionId::new(id), TaskId(task_id))
        .await?;
    Ok(StatusCode::NO_CONTENT)
}
