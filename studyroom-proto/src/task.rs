//! Task wire types and text validation.
//!
//! A task is a single to-do item owned by one participant of a session.
//! Ids and timestamps are assigned by the task store; the client only
//! ever supplies text, the owner, and the completion flag.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::session::{MAX_SESSION_NAME_LENGTH, SessionId};
use crate::user::UserId;

/// Maximum allowed task text length in characters.
pub const MAX_TASK_TEXT_LENGTH: usize = 256;

/// Server-assigned task identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(pub u64);

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A to-do item as stored by the task store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    /// Server-assigned identifier.
    pub id: TaskId,
    /// Session the task belongs to.
    pub session: SessionId,
    /// Participant who owns the task.
    pub user: UserId,
    /// Free-text content.
    pub text: String,
    /// Completion flag.
    pub is_done: bool,
    /// When the task was created.
    pub created_at: DateTime<Utc>,
    /// When the task was last modified.
    pub updated_at: DateTime<Utc>,
}

impl Task {
    /// Builds the patch a toggle sends: the task's mutable record with the
    /// completion flag flipped.
    #[must_use]
    pub fn toggled_patch(&self) -> crate::api::TaskPatch {
        crate::api::TaskPatch {
            text: Some(self.text.clone()),
            is_done: Some(!self.is_done),
        }
    }
}

/// Reasons a task text or session name is rejected before any request.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TextError {
    /// Empty or whitespace-only input.
    #[error("text cannot be empty")]
    Empty,
    /// Input longer than the allowed maximum.
    #[error("text too long (max {max} characters)")]
    TooLong {
        /// Maximum number of characters.
        max: usize,
    },
}

/// Trims `text` and checks it against `max` characters.
///
/// # Errors
///
/// Returns [`TextError::Empty`] for whitespace-only input and
/// [`TextError::TooLong`] when the trimmed text exceeds `max` characters.
pub fn normalize_text(text: &str, max: usize) -> Result<&str, TextError> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(TextError::Empty);
    }
    if trimmed.chars().count() > max {
        return Err(TextError::TooLong { max });
    }
    Ok(trimmed)
}

/// [`normalize_text`] with the default task limit.
///
/// # Errors
///
/// See [`normalize_text`].
pub fn normalize_task_text(text: &str) -> Result<&str, TextError> {
    normalize_text(text, MAX_TASK_TEXT_LENGTH)
}

/// [`normalize_text`] with the session name limit.
///
/// # Errors
///
/// See [`normalize_text`].
pub fn normalize_session_name(name: &str) -> Result<&str, TextError> {
    normalize_text(name, MAX_SESSION_NAME_LENGTH)
}
