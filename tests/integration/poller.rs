//! Integration tests for the poll driver, run on tokio's paused clock.

#![allow(clippy::expect_used, clippy::unwrap_used)]

use std::sync::Arc;
use std::time::Duration;

use studyroom::board::{BoardSettings, SessionBoard, ViewPhase};
use studyroom::poll::{MIN_POLL_INTERVAL, Poller};
use studyroom::store::{StoreOp, TaskStore};
use studyroom::store::memory::InMemoryTaskStore;
use studyroom_proto::{SessionId, User, UserId};

const ANA: UserId = UserId(1);
const BEN: UserId = UserId(2);
const FIVE: Duration = Duration::from_secs(5);

// ---------------------------------------------------------------------------
// Helper functions
// ---------------------------------------------------------------------------

async fn make_room() -> (InMemoryTaskStore, InMemoryTaskStore, SessionId) {
    let ana = InMemoryTaskStore::new(User::new(ANA, "ana"));
    let ben = ana.as_user(User::new(BEN, "ben"));
    let session = ana.create_session("Finals").await.unwrap();
    ben.join_session(&session.id).unwrap();
    (ana, ben, session.id)
}

fn make_board(store: &InMemoryTaskStore, session: &SessionId) -> Arc<SessionBoard<InMemoryTaskStore>> {
    Arc::new(SessionBoard::new(
        store.clone(),
        session.clone(),
        User::new(ANA, "ana"),
        BoardSettings::default(),
    ))
}

async fn advance(duration: Duration) {
    tokio::time::sleep(duration).await;
    // Let fetches spawned at the deadline finish.
    for _ in 0..5 {
        tokio::task::yield_now().await;
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn loads_immediately_then_polls_every_interval() {
    let (ana, _ben, session) = make_room().await;
    let board = make_board(&ana, &session);
    let handle = Poller::new(FIVE, FIVE).spawn(Arc::clone(&board));

    advance(Duration::from_millis(10)).await;
    assert_eq!(board.phase(), ViewPhase::Ready);
    assert_eq!(ana.calls(StoreOp::GetSession), 1);
    assert_eq!(ana.calls(StoreOp::ListTasks), 1);

    advance(Duration::from_secs(11)).await;
    assert_eq!(ana.calls(StoreOp::GetSession), 3);
    assert_eq!(ana.calls(StoreOp::ListTasks), 3);

    handle.stop().await;
}

#[tokio::test(start_paused = true)]
async fn other_participants_task_shows_up_after_next_poll() {
    let (ana, ben, session) = make_room().await;
    let board = make_board(&ana, &session);
    let handle = Poller::new(FIVE, FIVE).spawn(Arc::clone(&board));
    advance(Duration::from_millis(10)).await;

    ben.seed_task(&session, BEN, "Read book", false).unwrap();
    assert!(board.tasks().is_empty());

    advance(FIVE).await;
    let tasks = board.tasks();
    assert_eq!(tasks.len(), 1);
    assert_eq!(tasks[0].user, BEN);

    handle.stop().await;
}

#[tokio::test(start_paused = true)]
async fn timers_run_independently() {
    let (ana, _ben, session) = make_room().await;
    let board = make_board(&ana, &session);
    let handle =
        Poller::new(Duration::from_secs(10), Duration::from_secs(2)).spawn(Arc::clone(&board));

    advance(Duration::from_millis(10)).await;
    advance(Duration::from_secs(10)).await;
    // Initial load plus one session poll; initial load plus five task polls.
    assert_eq!(ana.calls(StoreOp::GetSession), 2);
    assert_eq!(ana.calls(StoreOp::ListTasks), 6);

    handle.stop().await;
}

#[tokio::test(start_paused = true)]
async fn session_polling_pauses_while_errored() {
    let (ana, _ben, session) = make_room().await;
    ana.fail_next(StoreOp::GetSession);
    let board = make_board(&ana, &session);
    let handle = Poller::new(FIVE, FIVE).spawn(Arc::clone(&board));

    advance(Duration::from_millis(10)).await;
    assert!(matches!(board.phase(), ViewPhase::Errored(_)));

    advance(Duration::from_secs(11)).await;
    assert_eq!(ana.calls(StoreOp::GetSession), 1);
    assert_eq!(ana.calls(StoreOp::ListTasks), 3);

    handle.stop().await;
}

#[tokio::test(start_paused = true)]
async fn stop_halts_polling_and_closes_board() {
    let (ana, _ben, session) = make_room().await;
    let board = make_board(&ana, &session);
    let handle = Poller::new(FIVE, FIVE).spawn(Arc::clone(&board));
    advance(Duration::from_millis(10)).await;

    handle.stop().await;
    assert!(board.is_closed());

    advance(Duration::from_secs(30)).await;
    assert_eq!(ana.calls(StoreOp::ListTasks), 1);
}

#[tokio::test(start_paused = true)]
async fn dropping_handle_stops_polling() {
    let (ana, _ben, session) = make_room().await;
    let board = make_board(&ana, &session);
    let handle = Poller::new(FIVE, FIVE).spawn(Arc::clone(&board));
    advance(Duration::from_millis(10)).await;

    drop(handle);
    assert!(board.is_closed());

    advance(Duration::from_secs(30)).await;
    assert_eq!(ana.calls(StoreOp::GetSession), 1);
}

#[tokio::test(start_paused = true)]
async fn subscribers_are_notified_of_refreshes() {
    let (ana, ben, session) = make_room().await;
    let board = make_board(&ana, &session);
    let mut changes = board.subscribe();
    let handle = Poller::new(FIVE, FIVE).spawn(Arc::clone(&board));
    advance(Duration::from_millis(10)).await;
    let _ = changes.borrow_and_update();

    ben.seed_task(&session, BEN, "Read book", false).unwrap();
    advance(FIVE).await;
    assert!(changes.has_changed().unwrap());

    handle.stop().await;
}

#[tokio::test(start_paused = true)]
async fn zero_intervals_poll_at_the_floor() {
    let (ana, _ben, session) = make_room().await;
    let board = make_board(&ana, &session);
    let handle = Poller::new(Duration::ZERO, Duration::ZERO).spawn(Arc::clone(&board));

    advance(Duration::from_millis(10)).await;
    advance(MIN_POLL_INTERVAL * 10).await;
    // Initial load plus ten ticks, not one fetch per scheduler wakeup.
    assert!(ana.calls(StoreOp::ListTasks) <= 11);
    assert!(ana.calls(StoreOp::GetSession) <= 11);

    handle.stop().await;
}
