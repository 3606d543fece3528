//! Request bodies for the task store endpoints.

use serde::{Deserialize, Serialize};

use crate::user::UserId;

/// Body of `POST /sessions/create`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateSessionRequest {
    /// Display name of the new session.
    pub name: String,
}

/// Body of `PUT /sessions/{id}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenameSessionRequest {
    /// New display name.
    pub name: String,
}

/// Body of `POST /sessions/{id}/tasks/add`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddTaskRequest {
    /// Task content.
    pub text: String,
    /// Owning participant.
    pub user_id: UserId,
}

/// Body of `PUT /sessions/{id}/tasks/{task_id}`.
///
/// Absent fields are left unchanged by the store.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskPatch {
    /// Replacement text.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    /// Replacement completion flag.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_done: Option<bool>,
}

impl TaskPatch {
    /// A patch that only replaces the text.
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            is_done: None,
        }
    }

    /// Whether the patch changes nothing.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.text.is_none() && self.is_done.is_none()
    }
}
