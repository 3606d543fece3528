//! HTTP task store client.
//!
//! Issues authenticated JSON requests against the remote task store and
//! returns parsed payloads. Every request carries the configured auth
//! header, installed once as a client default header. Any non-2xx
//! response becomes [`StoreError::Status`].

use std::time::Duration;

use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue};
use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use url::Url;

use studyroom_proto::api::{AddTaskRequest, CreateSessionRequest, RenameSessionRequest, TaskPatch};
use studyroom_proto::{Session, SessionId, Task, TaskId, User};

use super::{StoreError, StoreOp, TaskStore};

/// Default per-request timeout.
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Scheme word placed before the token in the `Authorization` header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthScheme {
    /// `Authorization: Token <token>`
    #[default]
    Token,
    /// `Authorization: Bearer <token>`
    Bearer,
}

impl AuthScheme {
    /// The scheme word as sent on the wire.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Token => "Token",
            Self::Bearer => "Bearer",
        }
    }
}

impl std::str::FromStr for AuthScheme {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "token" => Ok(Self::Token),
            "bearer" => Ok(Self::Bearer),
            other => Err(format!("unknown auth scheme: {other}")),
        }
    }
}

/// Connection settings for [`HttpTaskStore`].
#[derive(Debug, Clone)]
pub struct HttpStoreConfig {
    /// Base URL of the task store API (e.g. `http://127.0.0.1:8000/api`).
    pub base_url: String,
    /// Auth token; requests are sent unauthenticated when `None`.
    pub token: Option<String>,
    /// Scheme word for the auth header.
    pub auth_scheme: AuthScheme,
    /// Per-request timeout.
    pub request_timeout: Duration,
}

impl HttpStoreConfig {
    /// Creates a config with the default scheme and timeout.
    pub fn new(base_url: impl Into<String>, token: Option<String>) -> Self {
        Self {
            base_url: base_url.into(),
            token,
            auth_scheme: AuthScheme::default(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }
}

/// [`TaskStore`] backed by the remote HTTP API.
///
/// Cheap to clone; clones share the underlying connection pool.
#[derive(Debug, Clone)]
pub struct HttpTaskStore {
    client: Client,
    base_url: Url,
}

impl HttpTaskStore {
    /// Builds a client for the given configuration.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::InvalidUrl`] if the base URL does not parse,
    /// [`StoreError::InvalidToken`] if the token cannot be used as a header
    /// value, or [`StoreError::Connection`] if the HTTP client cannot be built.
    pub fn new(config: &HttpStoreConfig) -> Result<Self, StoreError> {
        let mut base_url = Url::parse(&config.base_url)?;
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        let mut headers = HeaderMap::new();
        if let Some(token) = &config.token {
            let value = HeaderValue::from_str(&format!("{} {token}", config.auth_scheme.as_str()))
                .map_err(|_| StoreError::InvalidToken)?;
            headers.insert(AUTHORIZATION, value);
        }

        let client = Client::builder()
            .default_headers(headers)
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| StoreError::Connection(e.to_string()))?;

        Ok(Self { client, base_url })
    }

    /// Returns the normalized base URL (always ends with `/`).
    #[must_use]
    pub const fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn url(&self, path: &str) -> Result<Url, StoreError> {
        Ok(self.base_url.join(path.trim_start_matches('/'))?)
    }

    /// URL of `sessions/{id}/{rest..}`. The id is percent-encoded as one
    /// segment, so `/`, `?` or `#` in it cannot reach another endpoint.
    fn session_url(&self, id: &SessionId, rest: &[&str]) -> Result<Url, StoreError> {
        let raw = id.as_str();
        if matches!(raw, "" | "." | "..") {
            return Err(StoreError::InvalidSessionId(raw.to_string()));
        }
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| url::ParseError::RelativeUrlWithCannotBeABaseBase)?
            .pop_if_empty()
            .push("sessions")
            .push(raw)
            .extend(rest);
        Ok(url)
    }

    /// Sends a request and turns transport failures and non-2xx statuses
    /// into [`StoreError`].
    async fn execute(&self, op: StoreOp, request: RequestBuilder) -> Result<Response, StoreError> {
        tracing::debug!(op = %op, "sending task store request");
        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                StoreError::Timeout
            } else {
                StoreError::Connection(e.to_string())
            }
        })?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        tracing::debug!(op = %op, status = status.as_u16(), "task store rejected request");
        Err(StoreError::Status {
            status: status.as_u16(),
            body,
        })
    }

    async fn fetch_json<T: DeserializeOwned>(
        &self,
        op: StoreOp,
        request: RequestBuilder,
    ) -> Result<T, StoreError> {
        let response = self.execute(op, request).await?;
        response.json::<T>().await.map_err(|e| {
            if e.is_timeout() {
                StoreError::Timeout
            } else {
                StoreError::Decode(e.to_string())
            }
        })
    }

    async fn fetch_empty(&self, op: StoreOp, request: RequestBuilder) -> Result<(), StoreError> {
        self.execute(op, request).await.map(drop)
    }
}

impl TaskStore for HttpTaskStore {
    async fn current_user(&self) -> Result<User, StoreError> {
        let url = self.url("auth/me")?;
        self.fetch_json(StoreOp::CurrentUser, self.client.get(url)).await
    }

    async fn list_sessions(&self) -> Result<Vec<Session>, StoreError> {
        let url = self.url("sessions/")?;
        self.fetch_json(StoreOp::ListSessions, self.client.get(url)).await
    }

    async fn get_session(&self, id: &SessionId) -> Result<Session, StoreError> {
        let url = self.session_url(id, &[])?;
        self.fetch_json(StoreOp::GetSession, self.client.get(url)).await
    }

    async fn create_session(&self, name: &str) -> Result<Session, StoreError> {
        let url = self.url("sessions/create")?;
        let body = CreateSessionRequest {
            name: name.to_string(),
        };
        self.fetch_json(StoreOp::CreateSession, self.client.post(url).json(&body))
            .await
    }

    async fn rename_session(&self, id: &SessionId, name: &str) -> Result<Session, StoreError> {
        let url = self.session_url(id, &[])?;
        let body = RenameSessionRequest {
            name: name.to_string(),
        };
        self.fetch_json(StoreOp::RenameSession, self.client.put(url).json(&body))
            .await
    }

    async fn delete_session(&self, id: &SessionId) -> Result<(), StoreError> {
        let url = self.session_url(id, &[])?;
        self.fetch_empty(StoreOp::DeleteSession, self.client.delete(url))
            .await
    }

    async fn leave_session(&self, id: &SessionId) -> Result<(), StoreError> {
        let url = self.session_url(id, &["leave"])?;
        self.fetch_empty(StoreOp::LeaveSession, self.client.post(url))
            .await
    }

    async fn list_tasks(&self, id: &SessionId) -> Result<Vec<Task>, StoreError> {
        let url = self.session_url(id, &["tasks"])?;
        self.fetch_json(StoreOp::ListTasks, self.client.get(url)).await
    }

    async fn add_task(&self, id: &SessionId, request: &AddTaskRequest) -> Result<Task, StoreError> {
        let url = self.session_url(id, &["tasks", "add"])?;
        self.fetch_json(StoreOp::AddTask, self.client.post(url).json(request))
            .await
    }

    async fn update_task(
        &self,
        id: &SessionId,
        task_id: TaskId,
        patch: &TaskPatch,
    ) -> Result<Task, StoreError> {
        let url = self.session_url(id, &["tasks", task_id.to_string().as_str()])?;
        self.fetch_json(StoreOp::UpdateTask, self.client.put(url).json(patch))
            .await
    }

    async fn delete_task(&self, id: &SessionId, task_id: TaskId) -> Result<(), StoreError> {
        let url = self.session_url(id, &["tasks", task_id.to_string().as_str()])?;
        self.fetch_empty(StoreOp::DeleteTask, self.client.delete(url))
            .await
    }
}
