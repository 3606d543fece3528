//! Session snapshot fetcher.
//!
//! The initial load toggles the loading flag and turns a failure into the
//! sticky [`ViewPhase::Errored`](super::ViewPhase::Errored) state.
//! Background refreshes never touch the loading flag: a failure is logged
//! and the last-known data stays on screen.

use crate::store::TaskStore;

use super::{LOAD_ERROR, SessionBoard};

impl<S: TaskStore> SessionBoard<S> {
    /// Fetches the session record and then, if the current user is a
    /// participant, the task list.
    pub async fn load_initial(&self) {
        let proceed = self.with_state(|s| {
            if s.detached {
                return false;
            }
            s.loading = true;
            true
        });
        if !proceed {
            return;
        }
        self.notify();

        let session = self.store.get_session(&self.session_id).await;
        let is_participant = self.with_state(|s| {
            if s.detached {
                return None;
            }
            s.session_loaded = true;
            match session {
                Ok(session) => {
                    let member = session.is_participant(self.me.id);
                    s.session = Some(session);
                    Some(member)
                }
                Err(e) => {
                    tracing::warn!(session_id = %self.session_id, error = %e, "initial session fetch failed");
                    s.load_error.get_or_insert_with(|| LOAD_ERROR.to_string());
                    // Keep the task timer usable with whatever was loaded before.
                    Some(s.session.as_ref().is_none_or(|prior| prior.is_participant(self.me.id)))
                }
            }
        });
        let Some(is_participant) = is_participant else {
            tracing::debug!(session_id = %self.session_id, "dropping session response after close");
            return;
        };

        if !is_participant {
            self.with_state(|s| {
                s.tasks_loaded = true;
                s.loading = false;
            });
            self.notify();
            return;
        }

        let started_at = self.with_state(|s| s.begin_task_fetch());
        let tasks = self.store.list_tasks(&self.session_id).await;
        self.with_state(|s| {
            if s.detached {
                tracing::debug!(session_id = %self.session_id, "dropping task response after close");
                return;
            }
            s.tasks_loaded = true;
            s.loading = false;
            match tasks {
                Ok(tasks) => s.apply_remote_tasks(self.settings.merge_policy, tasks, started_at),
                Err(e) => {
                    tracing::warn!(session_id = %self.session_id, error = %e, "initial task fetch failed");
                    s.end_task_fetch(started_at);
                    s.load_error.get_or_insert_with(|| LOAD_ERROR.to_string());
                }
            }
        });
        self.notify();
    }

    /// Clears a sticky load error and runs the initial load again.
    pub async fn reload(&self) {
        self.with_state(|s| {
            s.load_error = None;
            s.session_loaded = false;
            s.tasks_loaded = false;
        });
        self.load_initial().await;
    }

    /// Background refresh of the session record.
    pub async fn refresh_session(&self) {
        if !self.begin_background() {
            return;
        }
        let result = self.store.get_session(&self.session_id).await;
        self.with_state(|s| {
            if s.detached {
                tracing::debug!(session_id = %self.session_id, "dropping session refresh after close");
                return;
            }
            s.background_fetches = s.background_fetches.saturating_sub(1);
            match result {
                Ok(session) => s.session = Some(session),
                Err(e) => {
                    tracing::warn!(session_id = %self.session_id, error = %e, "session refresh failed; keeping last snapshot");
                }
            }
        });
        self.notify();
    }

    /// Background refresh of the task list, merged under the board's
    /// [`MergePolicy`](super::MergePolicy).
    ///
    /// Skipped once the session record shows the current user is not a
    /// participant.
    pub async fn refresh_tasks(&self) {
        let me = self.me.id;
        let excluded = self.with_state(|s| {
            s.session
                .as_ref()
                .is_some_and(|session| !session.is_participant(me))
        });
        if excluded || !self.begin_background() {
            return;
        }
        let started_at = self.with_state(|s| s.begin_task_fetch());
        let result = self.store.list_tasks(&self.session_id).await;
        self.with_state(|s| {
            if s.detached {
                tracing::debug!(session_id = %self.session_id, "dropping task refresh after close");
                return;
            }
            s.background_fetches = s.background_fetches.saturating_sub(1);
            match result {
                Ok(tasks) => s.apply_remote_tasks(self.settings.merge_policy, tasks, started_at),
                Err(e) => {
                    s.end_task_fetch(started_at);
                    tracing::warn!(session_id = %self.session_id, error = %e, "task refresh failed; keeping last list");
                }
            }
        });
        self.notify();
    }

    fn begin_background(&self) -> bool {
        self.with_state(|s| {
            if s.detached {
                return false;
            }
            s.background_fetches += 1;
            true
        })
    }
}
