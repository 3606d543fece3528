//! `StudyRoom` shared task board client library.
//!
//! Keeps a local view of a multi-participant task board consistent with
//! a remote task store through periodic polling, while the current
//! participant mutates their own tasks with per-item in-flight tracking.

pub mod board;
pub mod config;
pub mod directory;
pub mod poll;
pub mod render;
pub mod store;
