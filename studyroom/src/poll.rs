//! Poll scheduling for a [`SessionBoard`].
//!
//! [`PollScheduler`] is a plain state machine over two independent
//! repeating timers. It never reads the clock itself: callers pass the
//! current [`Instant`], so tests can drive it with any timeline.
//! [`Poller`] runs the scheduler on tokio and fires the board's fetches.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::board::{SessionBoard, ViewPhase};
use crate::store::TaskStore;

/// Default interval of both timers.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Shortest interval either timer will run at; shorter ones are raised to it.
pub const MIN_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Which timer fired.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PollKind {
    /// Re-fetch the session record.
    Session,
    /// Re-fetch the task list.
    Tasks,
}

/// Two fixed-interval timers with explicit start and stop.
#[derive(Debug, Clone)]
pub struct PollScheduler {
    session_interval: Duration,
    task_interval: Duration,
    next_session: Option<Instant>,
    next_tasks: Option<Instant>,
}

impl PollScheduler {
    /// Creates a stopped scheduler. Intervals below [`MIN_POLL_INTERVAL`]
    /// are raised to it.
    #[must_use]
    pub const fn new(session_interval: Duration, task_interval: Duration) -> Self {
        Self {
            session_interval: at_least_min(session_interval),
            task_interval: at_least_min(task_interval),
            next_session: None,
            next_tasks: None,
        }
    }

    /// Arms both timers; each first fires one interval after `now`.
    pub fn start(&mut self, now: Instant) {
        self.next_session = Some(now + self.session_interval);
        self.next_tasks = Some(now + self.task_interval);
    }

    /// Disarms both timers.
    pub const fn stop(&mut self) {
        self.next_session = None;
        self.next_tasks = None;
    }

    /// Whether the timers are armed.
    #[must_use]
    pub const fn is_running(&self) -> bool {
        self.next_session.is_some() || self.next_tasks.is_some()
    }

    /// Earliest instant at which a timer fires.
    #[must_use]
    pub fn next_deadline(&self) -> Option<Instant> {
        match (self.next_session, self.next_tasks) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    /// Returns the timers due at `now` and re-arms them.
    ///
    /// A timer fires at most once per call. Ticks missed by more than one
    /// interval are skipped rather than replayed.
    pub fn due(&mut self, now: Instant) -> Vec<PollKind> {
        let mut due = Vec::with_capacity(2);
        if fire(&mut self.next_session, self.session_interval, now) {
            due.push(PollKind::Session);
        }
        if fire(&mut self.next_tasks, self.task_interval, now) {
            due.push(PollKind::Tasks);
        }
        due
    }
}

const fn at_least_min(interval: Duration) -> Duration {
    if interval.as_nanos() < MIN_POLL_INTERVAL.as_nanos() {
        MIN_POLL_INTERVAL
    } else {
        interval
    }
}

fn fire(next: &mut Option<Instant>, interval: Duration, now: Instant) -> bool {
    match *next {
        Some(at) if at <= now => {
            let mut following = at + interval;
            if following <= now {
                following = now + interval;
            }
            *next = Some(following);
            true
        }
        _ => false,
    }
}

/// Runs a [`PollScheduler`] against a board on the tokio runtime.
#[derive(Debug, Clone)]
pub struct Poller {
    session_interval: Duration,
    task_interval: Duration,
}

impl Default for Poller {
    fn default() -> Self {
        Self::new(DEFAULT_POLL_INTERVAL, DEFAULT_POLL_INTERVAL)
    }
}

impl Poller {
    #[must_use]
    pub const fn new(session_interval: Duration, task_interval: Duration) -> Self {
        Self {
            session_interval,
            task_interval,
        }
    }

    /// Starts polling: runs the initial load, then both timers.
    ///
    /// Each fetch runs as its own task, so a slow request never delays the
    /// other timer. Session polling is skipped while the board shows a
    /// load error; task polling continues.
    pub fn spawn<S>(&self, board: Arc<SessionBoard<S>>) -> PollerHandle<S>
    where
        S: TaskStore + 'static,
    {
        let (stop_tx, stop_rx) = watch::channel(false);
        let scheduler = PollScheduler::new(self.session_interval, self.task_interval);
        let task = tokio::spawn(run(Arc::clone(&board), scheduler, stop_rx));
        PollerHandle {
            board,
            stop_tx,
            task: Some(task),
        }
    }
}

async fn run<S>(
    board: Arc<SessionBoard<S>>,
    mut scheduler: PollScheduler,
    mut stop_rx: watch::Receiver<bool>,
) where
    S: TaskStore + 'static,
{
    let session_id = board.session_id().clone();
    tracing::debug!(session_id = %session_id, "poller started");

    scheduler.start(Instant::now());
    {
        let board = Arc::clone(&board);
        tokio::spawn(async move { board.load_initial().await });
    }

    while let Some(deadline) = scheduler.next_deadline() {
        tokio::select! {
            () = tokio::time::sleep_until(deadline) => {}
            _ = stop_rx.changed() => break,
        }
        for kind in scheduler.due(Instant::now()) {
            let board = Arc::clone(&board);
            match kind {
                PollKind::Session => {
                    if matches!(board.phase(), ViewPhase::Errored(_)) {
                        tracing::debug!(session_id = %session_id, "session poll skipped while errored");
                        continue;
                    }
                    tokio::spawn(async move { board.refresh_session().await });
                }
                PollKind::Tasks => {
                    tokio::spawn(async move { board.refresh_tasks().await });
                }
            }
        }
    }

    scheduler.stop();
    tracing::debug!(session_id = %session_id, "poller stopped");
}

/// Owns a running poller. Stopping or dropping it stops the timers and
/// closes the board.
pub struct PollerHandle<S> {
    board: Arc<SessionBoard<S>>,
    stop_tx: watch::Sender<bool>,
    task: Option<JoinHandle<()>>,
}

impl<S> PollerHandle<S> {
    /// The board being polled.
    pub const fn board(&self) -> &Arc<SessionBoard<S>> {
        &self.board
    }

    /// Stops the timers, closes the board and waits for the poll loop to
    /// exit. Fetches already in flight finish in the background and are
    /// ignored.
    pub async fn stop(mut self) {
        let _ = self.stop_tx.send(true);
        self.board.close();
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl<S> Drop for PollerHandle<S> {
    fn drop(&mut self) {
        if self.task.is_some() {
            let _ = self.stop_tx.send(true);
            self.board.close();
        }
    }
}
