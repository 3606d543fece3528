//! Plain-text rendering of boards and session lists for the CLI.

use std::fmt::Write;

use studyroom_proto::Session;

use crate::board::{Access, BoardView, ItemState, ParticipantColumn, TaskView, ViewPhase};

/// Renders a board view as plain text.
#[must_use]
pub fn render_board(view: &BoardView) -> String {
    let mut out = String::new();
    let name = view.session_name.as_deref().unwrap_or("…");
    let _ = writeln!(out, "== {name} == [{}]", phase_label(&view.phase));

    if let ViewPhase::Errored(message) = &view.phase {
        let _ = writeln!(out, "! {message}");
    }
    if let Some(rename) = &view.rename {
        if rename.pending {
            let _ = writeln!(out, "  (renaming…)");
        }
        if let Some(error) = &rename.error {
            let _ = writeln!(out, "! {error}");
        }
    }

    match view.access {
        Access::Loading => {
            let _ = writeln!(out, "Loading study room…");
        }
        Access::NotParticipant => {
            let _ = writeln!(out, "You are not a participant of this study room.");
        }
        Access::Participant => {
            for column in &view.columns {
                render_column(&mut out, column);
            }
        }
    }
    out
}

fn render_column(out: &mut String, column: &ParticipantColumn) {
    let suffix = if column.is_mine { " (you)" } else { "" };
    let _ = writeln!(out, "\n-- {}{suffix} --", column.participant.username);

    if let Some(add) = &column.add {
        if add.pending {
            let _ = writeln!(out, "  + adding…");
        }
        if let Some(error) = &add.error {
            let _ = writeln!(out, "  ! {error}");
        }
    }

    if column.active.is_empty() && column.completed.is_empty() {
        let _ = writeln!(out, "  (no tasks)");
        return;
    }
    for task in column.active.iter().chain(&column.completed) {
        render_task(out, task);
    }
}

fn render_task(out: &mut String, view: &TaskView) {
    let mark = if view.task.is_done { 'x' } else { ' ' };
    let _ = write!(out, "  [{mark}] #{} {}", view.task.id, view.task.text);
    match view.state {
        ItemState::Idle => {}
        ItemState::TogglePending => out.push_str(" (updating…)"),
        ItemState::EditPending => out.push_str(" (saving…)"),
        ItemState::DeletePending => out.push_str(" (deleting…)"),
    }
    out.push('\n');
    if let Some(error) = &view.error {
        let _ = writeln!(out, "      ! {error}");
    }
}

const fn phase_label(phase: &ViewPhase) -> &'static str {
    match phase {
        ViewPhase::LoadingInitial => "loading",
        ViewPhase::Ready => "ready",
        ViewPhase::Refreshing => "refreshing",
        ViewPhase::Errored(_) => "error",
    }
}

/// Renders a session list, newest first, marking the latest one.
#[must_use]
pub fn render_sessions(sessions: &[Session]) -> String {
    if sessions.is_empty() {
        return "No study rooms yet.\n".to_string();
    }
    let mut out = String::new();
    for (i, session) in sessions.iter().enumerate() {
        let marker = if i == 0 { '*' } else { ' ' };
        let names: Vec<&str> = session
            .participants
            .iter()
            .map(|p| p.username.as_str())
            .collect();
        let _ = writeln!(
            out,
            "{marker} {}  {}  ({})  {}",
            session.id,
            session.name,
            names.join(", "),
            session.created_at.format("%Y-%m-%d %H:%M")
        );
    }
    out
}
