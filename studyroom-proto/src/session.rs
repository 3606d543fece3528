//! Study room (session) wire types.
//!
//! A session is a named board joined by a fixed roster of participants.
//! The session id is opaque and stays stable across renames.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::user::UserId;

/// Maximum allowed session name length in characters.
pub const MAX_SESSION_NAME_LENGTH: usize = 100;

/// Opaque session identifier assigned by the task store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    /// Wraps an identifier string.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for SessionId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// A member of a session, with the username captured when they joined.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Participant {
    /// The member's user id.
    pub user_id: UserId,
    /// Username snapshot at the time of membership.
    pub username: String,
}

impl Participant {
    /// Creates a participant entry.
    pub fn new(user_id: UserId, username: impl Into<String>) -> Self {
        Self {
            user_id,
            username: username.into(),
        }
    }
}

/// A study room record as returned by `GET /sessions/{id}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    /// Stable identifier.
    pub id: SessionId,
    /// Display name (mutable via rename).
    pub name: String,
    /// User who created the session.
    pub creator: UserId,
    /// Ordered roster; the creator is always a member.
    pub participants: Vec<Participant>,
    /// When the session was created.
    pub created_at: DateTime<Utc>,
}

impl Session {
    /// Returns the roster entry for `user`, if they are a member.
    #[must_use]
    pub fn participant(&self, user: UserId) -> Option<&Participant> {
        self.participants.iter().find(|p| p.user_id == user)
    }

    /// Whether `user` is on the roster.
    #[must_use]
    pub fn is_participant(&self, user: UserId) -> bool {
        self.participant(user).is_some()
    }

    /// Whether `user` created this session.
    #[must_use]
    pub fn is_creator(&self, user: UserId) -> bool {
        self.creator == user
    }

    /// Checks the roster invariant: the creator must be a participant.
    #[must_use]
    pub fn creator_is_participant(&self) -> bool {
        self.is_participant(self.creator)
    }
}
