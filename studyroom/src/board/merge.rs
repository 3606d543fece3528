//! Reconciliation of a polled task list with local mutation state.
//!
//! A background poll always replaces the local task list wholesale. The
//! [`MergePolicy`] decides what survives from the local side:
//!
//! - [`MergePolicy::LastWriterWins`] keeps nothing. A poll that was in
//!   flight while a mutation settled can briefly undo it on screen; the
//!   next poll corrects it, so the visible inconsistency is bounded by one
//!   task poll interval.
//! - [`MergePolicy::PreserveInFlight`] keeps the optimistic text of edits
//!   still in flight, keeps tasks with a pending operation that the poll
//!   omitted, and lets mutations that settled after the poll was issued
//!   win over the poll's older view of those tasks.
//!
//! Both policies converge to the server's list within one poll interval
//! once no mutation is pending.

use std::collections::{HashMap, HashSet};
use std::str::FromStr;
use std::time::Duration;

use studyroom_proto::{Task, TaskId};

/// How a polled task list is combined with local state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MergePolicy {
    /// The poll result replaces local state outright.
    LastWriterWins,
    /// The poll result replaces local state except where a local
    /// mutation is in flight or settled after the poll was issued.
    #[default]
    PreserveInFlight,
}

impl MergePolicy {
    /// Longest time a settled mutation can appear undone on screen.
    ///
    /// Under either policy this is one task poll interval: the next poll
    /// is issued after the mutation settled, so it already reflects it.
    #[must_use]
    pub const fn staleness_bound(self, task_poll_interval: Duration) -> Duration {
        task_poll_interval
    }
}

impl FromStr for MergePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "last-writer-wins" => Ok(Self::LastWriterWins),
            "preserve-in-flight" => Ok(Self::PreserveInFlight),
            other => Err(format!("unknown merge policy: {other}")),
        }
    }
}

/// Local effect of a settled mutation on one task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocalChange {
    /// The task was added or replaced with the server's response.
    Upserted,
    /// The task was deleted.
    Removed,
}

/// Local facts a merge must respect.
#[derive(Debug, Clone, Default)]
pub struct MergeGuard {
    /// Tasks with an operation in flight.
    pub pending: HashSet<TaskId>,
    /// Optimistic text of edits in flight.
    pub optimistic_text: HashMap<TaskId, String>,
    /// Mutations that settled after the poll request was issued.
    pub settled: HashMap<TaskId, LocalChange>,
}

/// Combines a polled task list with the local one.
///
/// The result keeps the poll's order; locally kept tasks the poll did not
/// include are appended in local order.
#[must_use]
pub fn merge_tasks(
    policy: MergePolicy,
    local: &[Task],
    remote: Vec<Task>,
    guard: &MergeGuard,
) -> Vec<Task> {
    if policy == MergePolicy::LastWriterWins {
        return remote;
    }

    let local_by_id: HashMap<TaskId, &Task> = local.iter().map(|t| (t.id, t)).collect();
    let mut seen = HashSet::with_capacity(remote.len());
    let mut merged = Vec::with_capacity(remote.len());

    for mut task in remote {
        seen.insert(task.id);
        match guard.settled.get(&task.id) {
            Some(LocalChange::Removed) => continue,
            Some(LocalChange::Upserted) => {
                if let Some(local_task) = local_by_id.get(&task.id) {
                    task = (*local_task).clone();
                }
            }
            None => {}
        }
        if let Some(text) = guard.optimistic_text.get(&task.id) {
            task.text.clone_from(text);
        }
        merged.push(task);
    }

    for task in local {
        if seen.contains(&task.id) {
            continue;
        }
        let keep = guard.pending.contains(&task.id)
            || guard.settled.get(&task.id) == Some(&LocalChange::Upserted);
        if keep {
            merged.push(task.clone());
        }
    }

    merged
}
