//! Shared wire definitions for the `StudyRoom` task store API.
//!
//! Every type here is exchanged as JSON between the client and the
//! remote task store.

pub mod api;
pub mod session;
pub mod task;
pub mod user;

pub use session::{Participant, Session, SessionId};
pub use task::{Task, TaskId};
pub use user::{User, UserId};
