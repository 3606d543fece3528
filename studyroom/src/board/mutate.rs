//! Task mutation engine.
//!
//! Each operation validates locally, marks its scope (one task id, or the
//! add affordance) as pending, sends one request and then applies the
//! store's response to exactly one task. Local rejections return before
//! any state changes. A response that arrives after the board was closed
//! is dropped without touching state.

use tokio::time::Instant;

use studyroom_proto::api::{AddTaskRequest, TaskPatch};
use studyroom_proto::task::{normalize_session_name, normalize_text};
use studyroom_proto::{Session, Task, TaskId, UserId};

use crate::store::TaskStore;

use super::state::{BoardState, ItemError, ItemState, PendingEdit};
use super::{
    ADD_ERROR, DELETE_ERROR, EDIT_ERROR, MutationError, RENAME_ERROR, SessionBoard, TOGGLE_ERROR,
};

enum Start<T, U> {
    Send(T),
    Skip(U),
}

impl<S: TaskStore> SessionBoard<S> {
    /// Adds a task to `owner`'s list, which must be the current user's.
    ///
    /// The text is trimmed; whitespace-only text is rejected without a
    /// request. On success the store's record is appended.
    ///
    /// # Errors
    ///
    /// Local rejections are listed on [`MutationError`]. On a store
    /// failure the add error is set and [`MutationError::Store`] returned.
    pub async fn add_task(&self, text: &str, owner: UserId) -> Result<Task, MutationError> {
        let max = self.settings.max_task_text_len;
        let request = self.with_state(|s| -> Result<AddTaskRequest, MutationError> {
            self.require_participant(s)?;
            if owner != self.me.id {
                return Err(MutationError::ForeignList(owner));
            }
            let text = normalize_text(text, max)?;
            if s.add.pending {
                return Err(MutationError::AddInProgress);
            }
            s.add.pending = true;
            s.add.error = None;
            Ok(AddTaskRequest {
                text: text.to_string(),
                user_id: owner,
            })
        })?;
        self.notify();

        let result = self.store.add_task(&self.session_id, &request).await;
        let outcome = self.with_state(|s| {
            if s.detached {
                return Err(MutationError::Detached);
            }
            s.add.pending = false;
            match result {
                Ok(task) => {
                    s.upsert_task(task.clone());
                    Ok(task)
                }
                Err(e) => {
                    s.add.error = Some(ADD_ERROR.to_string());
                    Err(MutationError::Store(e))
                }
            }
        });
        self.trace_settled("add", outcome.as_ref().ok().map(|t| t.id), &outcome);
        self.notify();
        outcome
    }

    /// Flips a task's completion flag.
    ///
    /// Sends the task's mutable fields with the flag flipped and replaces
    /// the local record with the store's response.
    ///
    /// # Errors
    ///
    /// Local rejections are listed on [`MutationError`]. On a store
    /// failure the task keeps its flag and gets an error.
    pub async fn toggle_task(&self, id: TaskId) -> Result<Task, MutationError> {
        let patch = self.with_state(|s| -> Result<TaskPatch, MutationError> {
            let task = self.require_own_idle_task(s, id)?;
            s.begin_item(id, ItemState::TogglePending);
            Ok(task.toggled_patch())
        })?;
        self.notify();

        let result = self.store.update_task(&self.session_id, id, &patch).await;
        let outcome = self.with_state(|s| {
            if s.detached {
                return Err(MutationError::Detached);
            }
            match result {
                Ok(task) => {
                    s.settle_item(id, None);
                    s.upsert_task(task.clone());
                    Ok(task)
                }
                Err(e) => {
                    s.settle_item(id, Some(ItemError::new(TOGGLE_ERROR)));
                    Err(MutationError::Store(e))
                }
            }
        });
        self.trace_settled("toggle", Some(id), &outcome);
        self.notify();
        outcome
    }

    /// Replaces a task's text.
    ///
    /// The new text is shown immediately and reverted if the store rejects
    /// it. Text identical to the current text (after trimming) is a no-op
    /// that returns the current record without a request.
    ///
    /// # Errors
    ///
    /// Local rejections are listed on [`MutationError`]. On a store
    /// failure the old text is restored and the task gets an error.
    pub async fn edit_task(&self, id: TaskId, text: &str) -> Result<Task, MutationError> {
        let max = self.settings.max_task_text_len;
        let start = self.with_state(|s| -> Result<Start<String, Task>, MutationError> {
            let task = self.require_own_idle_task(s, id)?;
            let proposed = normalize_text(text, max)?;
            if proposed == task.text {
                return Ok(Start::Skip(task));
            }
            let proposed = proposed.to_string();
            s.begin_item(id, ItemState::EditPending).edit = Some(PendingEdit {
                prior: task.text,
                proposed: proposed.clone(),
            });
            set_text(s, id, &proposed);
            Ok(Start::Send(proposed))
        })?;
        let proposed = match start {
            Start::Send(proposed) => proposed,
            Start::Skip(task) => return Ok(task),
        };
        self.notify();

        let result = self
            .store
            .update_task(&self.session_id, id, &TaskPatch::text(proposed))
            .await;
        let outcome = self.with_state(|s| {
            if s.detached {
                return Err(MutationError::Detached);
            }
            match result {
                Ok(task) => {
                    s.settle_item(id, None);
                    s.upsert_task(task.clone());
                    Ok(task)
                }
                Err(e) => {
                    if let Some(edit) = s.settle_item(id, Some(ItemError::new(EDIT_ERROR))) {
                        set_text(s, id, &edit.prior);
                    }
                    Err(MutationError::Store(e))
                }
            }
        });
        self.trace_settled("edit", Some(id), &outcome);
        self.notify();
        outcome
    }

    /// Deletes a task.
    ///
    /// The task stays visible until the store confirms. Deleting an id
    /// that is not on the board is a no-op without a request.
    ///
    /// # Errors
    ///
    /// Local rejections are listed on [`MutationError`]. On a store
    /// failure the task stays and shows an error for the configured
    /// display window.
    pub async fn delete_task(&self, id: TaskId) -> Result<(), MutationError> {
        let start = self.with_state(|s| -> Result<Start<(), ()>, MutationError> {
            if s.detached {
                return Err(MutationError::Detached);
            }
            if s.task(id).is_none() {
                return Ok(Start::Skip(()));
            }
            self.require_own_idle_task(s, id)?;
            s.begin_item(id, ItemState::DeletePending);
            Ok(Start::Send(()))
        })?;
        if let Start::Skip(()) = start {
            tracing::debug!(session_id = %self.session_id, task_id = %id, "delete of unknown task ignored");
            return Ok(());
        }
        self.notify();

        let result = self.store.delete_task(&self.session_id, id).await;
        let expires_at = Instant::now() + self.settings.error_display;
        let outcome = self.with_state(|s| {
            if s.detached {
                return Err(MutationError::Detached);
            }
            match result {
                Ok(()) => {
                    s.remove_task(id);
                    Ok(())
                }
                Err(e) => {
                    s.settle_item(id, Some(ItemError::expiring(DELETE_ERROR, expires_at)));
                    Err(MutationError::Store(e))
                }
            }
        });
        self.trace_settled("delete", Some(id), &outcome);
        self.notify();
        outcome
    }

    /// Renames the session. Creator only.
    ///
    /// The name is trimmed; an empty or unchanged name is a no-op that
    /// returns the current record without a request.
    ///
    /// # Errors
    ///
    /// Local rejections are listed on [`MutationError`]. On a store
    /// failure the rename error is set and the old name kept.
    pub async fn rename_session(&self, name: &str) -> Result<Session, MutationError> {
        let start = self.with_state(|s| -> Result<Start<String, Session>, MutationError> {
            if s.detached {
                return Err(MutationError::Detached);
            }
            let session = s.session.as_ref().ok_or(MutationError::NotLoaded)?;
            if !session.is_creator(self.me.id) {
                return Err(MutationError::NotCreator);
            }
            let trimmed = name.trim();
            if trimmed.is_empty() || trimmed == session.name {
                return Ok(Start::Skip(session.clone()));
            }
            let name = normalize_session_name(trimmed)?.to_string();
            if s.rename.pending {
                return Err(MutationError::RenameInProgress);
            }
            s.rename.pending = true;
            s.rename.error = None;
            Ok(Start::Send(name))
        })?;
        let name = match start {
            Start::Send(name) => name,
            Start::Skip(session) => return Ok(session),
        };
        self.notify();

        let result = self.store.rename_session(&self.session_id, &name).await;
        let outcome = self.with_state(|s| {
            if s.detached {
                return Err(MutationError::Detached);
            }
            s.rename.pending = false;
            match result {
                Ok(session) => {
                    s.session = Some(session.clone());
                    Ok(session)
                }
                Err(e) => {
                    s.rename.error = Some(RENAME_ERROR.to_string());
                    Err(MutationError::Store(e))
                }
            }
        });
        self.trace_settled("rename", None, &outcome);
        self.notify();
        outcome
    }

    fn require_participant(&self, s: &BoardState) -> Result<(), MutationError> {
        if s.detached {
            return Err(MutationError::Detached);
        }
        let session = s.session.as_ref().ok_or(MutationError::NotLoaded)?;
        if !session.is_participant(self.me.id) {
            return Err(MutationError::NotParticipant);
        }
        Ok(())
    }

    fn require_own_idle_task(&self, s: &BoardState, id: TaskId) -> Result<Task, MutationError> {
        self.require_participant(s)?;
        let task = s.task(id).ok_or(MutationError::TaskNotFound(id))?;
        if task.user != self.me.id {
            return Err(MutationError::NotOwner(id));
        }
        if s.item_state(id) != ItemState::Idle {
            return Err(MutationError::Busy(id));
        }
        Ok(task.clone())
    }

    fn trace_settled<T>(
        &self,
        op: &'static str,
        task_id: Option<TaskId>,
        outcome: &Result<T, MutationError>,
    ) {
        let task_id = task_id.map(|id| id.0);
        match outcome {
            Ok(_) => {
                tracing::debug!(session_id = %self.session_id, ?task_id, op, "mutation applied");
            }
            Err(MutationError::Detached) => {
                tracing::debug!(session_id = %self.session_id, ?task_id, op, "dropping mutation response after close");
            }
            Err(e) => {
                tracing::warn!(session_id = %self.session_id, ?task_id, op, error = %e, "mutation failed");
            }
        }
    }
}

fn set_text(s: &mut BoardState, id: TaskId, text: &str) {
    if let Some(task) = s.tasks.iter_mut().find(|t| t.id == id) {
        task.text = text.to_string();
    }
}
