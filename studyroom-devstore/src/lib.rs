//! `StudyRoom` development task store.
//!
//! A small axum JSON server that speaks the task store API the client
//! expects. State lives in memory and is lost on restart; exposed as a
//! library so client tests can run it in-process.

pub mod config;
pub mod error;
pub mod server;
pub mod store;
