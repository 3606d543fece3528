//! Integration tests for the session board: two participants sharing one
//! in-memory task store, optimistic mutations, and poll reconciliation.

#![allow(
    clippy::expect_used,
    clippy::unwrap_used,
    clippy::similar_names,
    clippy::redundant_clone
)]

use std::sync::Arc;

use studyroom::board::{
    Access, BoardSettings, BoardView, ItemState, MergePolicy, MutationError, ParticipantColumn,
    SessionBoard, ViewPhase,
};
use studyroom::store::{StoreOp, TaskStore};
use studyroom::store::memory::InMemoryTaskStore;
use studyroom_proto::{SessionId, TaskId, User, UserId};

const ANA: UserId = UserId(1);
const BEN: UserId = UserId(2);
const CAL: UserId = UserId(3);

// ---------------------------------------------------------------------------
// Helper functions
// ---------------------------------------------------------------------------

struct Room {
    ana: InMemoryTaskStore,
    ben: InMemoryTaskStore,
    session: SessionId,
}

/// A session created by ana with ben joined.
async fn make_room() -> Room {
    let ana = InMemoryTaskStore::new(User::new(ANA, "ana"));
    let ben = ana.as_user(User::new(BEN, "ben"));
    let session = ana.create_session("Finals week").await.unwrap();
    ben.join_session(&session.id).unwrap();
    Room {
        ana,
        ben,
        session: session.id,
    }
}

async fn open_board(
    store: &InMemoryTaskStore,
    session: &SessionId,
    settings: BoardSettings,
) -> Arc<SessionBoard<InMemoryTaskStore>> {
    let name = if store.user_id() == ANA { "ana" } else { "ben" };
    let board = SessionBoard::new(
        store.clone(),
        session.clone(),
        User::new(store.user_id(), name),
        settings,
    );
    board.load_initial().await;
    Arc::new(board)
}

fn column(view: &BoardView, user: UserId) -> &ParticipantColumn {
    view.columns
        .iter()
        .find(|c| c.participant.user_id == user)
        .expect("participant column")
}

fn texts(tasks: &[studyroom::board::TaskView]) -> Vec<&str> {
    tasks.iter().map(|t| t.task.text.as_str()).collect()
}

// ---------------------------------------------------------------------------
// Shared-room scenario
// ---------------------------------------------------------------------------

#[tokio::test]
async fn two_participants_see_each_others_changes_after_a_poll() {
    let room = make_room().await;
    let ana = open_board(&room.ana, &room.session, BoardSettings::default()).await;
    let ben = open_board(&room.ben, &room.session, BoardSettings::default()).await;
    assert_eq!(ana.phase(), ViewPhase::Ready);
    assert_eq!(ben.view().access, Access::Participant);

    // Ana adds a task: active, unchecked, under ana only.
    let milk = ana.add_task("Buy milk", ANA).await.unwrap();
    let view = ana.view();
    assert_eq!(texts(&column(&view, ANA).active), vec!["Buy milk"]);
    assert!(column(&view, ANA).completed.is_empty());
    assert!(column(&view, BEN).active.is_empty());

    // Toggling moves it to completed.
    ana.toggle_task(milk.id).await.unwrap();
    let view = ana.view();
    assert!(column(&view, ANA).active.is_empty());
    assert_eq!(texts(&column(&view, ANA).completed), vec!["Buy milk"]);

    // Ben's next poll reflects it, still under ana.
    ben.refresh_tasks().await;
    let view = ben.view();
    assert_eq!(texts(&column(&view, ANA).completed), vec!["Buy milk"]);
    assert!(column(&view, BEN).active.is_empty());
    assert!(!column(&view, ANA).completed[0].can_mutate);

    // Ben adds and deletes a task before any poll fires.
    let book = ben.add_task("Read book", BEN).await.unwrap();
    ben.delete_task(book.id).await.unwrap();

    ana.refresh_tasks().await;
    ben.refresh_tasks().await;
    for board in [&ana, &ben] {
        assert!(board.tasks().iter().all(|t| t.text != "Read book"));
    }
    assert_eq!(room.ana.tasks_snapshot(&room.session).len(), 1);
}

#[tokio::test]
async fn added_task_lands_in_owner_active_list_in_sort_order() {
    let room = make_room().await;
    let ana = open_board(&room.ana, &room.session, BoardSettings::default()).await;

    ana.add_task("First", ANA).await.unwrap();
    ana.add_task("Second", ANA).await.unwrap();
    ana.add_task("Third", ANA).await.unwrap();

    let view = ana.view();
    assert_eq!(
        texts(&column(&view, ANA).active),
        vec!["Third", "Second", "First"]
    );
}

// ---------------------------------------------------------------------------
// Failure handling
// ---------------------------------------------------------------------------

#[tokio::test]
async fn failed_toggle_keeps_flag_and_scopes_error_to_the_task() {
    let room = make_room().await;
    let a = room
        .ana
        .seed_task(&room.session, ANA, "Flashcards", false)
        .unwrap();
    let b = room
        .ana
        .seed_task(&room.session, ANA, "Notes", false)
        .unwrap();
    let ana = open_board(&room.ana, &room.session, BoardSettings::default()).await;

    room.ana.fail_next(StoreOp::UpdateTask);
    let err = ana.toggle_task(a.id).await.unwrap_err();
    assert!(matches!(err, MutationError::Store(_)));

    let view = ana.view();
    let mine = column(&view, ANA);
    let failed = mine.active.iter().find(|t| t.task.id == a.id).unwrap();
    assert!(!failed.task.is_done);
    assert_eq!(failed.state, ItemState::Idle);
    assert!(failed.error.is_some());
    assert!(failed.can_mutate);

    let other = mine.active.iter().find(|t| t.task.id == b.id).unwrap();
    assert!(other.error.is_none());

    // Retrying clears the error and succeeds.
    ana.toggle_task(a.id).await.unwrap();
    assert!(ana.interaction(a.id).error.is_none());
}

#[tokio::test]
async fn identical_edit_is_a_local_no_op() {
    let room = make_room().await;
    let task = room
        .ana
        .seed_task(&room.session, ANA, "Outline essay", false)
        .unwrap();
    let ana = open_board(&room.ana, &room.session, BoardSettings::default()).await;

    let same = ana.edit_task(task.id, "  Outline essay ").await.unwrap();
    assert_eq!(same.text, "Outline essay");
    assert_eq!(room.ana.calls(StoreOp::UpdateTask), 0);
    assert_eq!(ana.interaction(task.id).state, ItemState::Idle);
}

#[tokio::test]
async fn deleting_an_unknown_task_changes_nothing() {
    let room = make_room().await;
    room.ana
        .seed_task(&room.session, ANA, "Outline essay", false)
        .unwrap();
    let ana = open_board(&room.ana, &room.session, BoardSettings::default()).await;
    let before = ana.tasks();

    ana.delete_task(TaskId(9_999)).await.unwrap();
    assert_eq!(ana.tasks(), before);
    assert_eq!(room.ana.calls(StoreOp::DeleteTask), 0);
}

#[tokio::test]
async fn failed_initial_load_is_sticky_until_reload() {
    let room = make_room().await;
    room.ana.fail_next(StoreOp::GetSession);
    let ana = open_board(&room.ana, &room.session, BoardSettings::default()).await;
    assert!(matches!(ana.phase(), ViewPhase::Errored(_)));

    // A background refresh does not clear the error.
    ana.refresh_session().await;
    assert!(matches!(ana.phase(), ViewPhase::Errored(_)));

    ana.reload().await;
    assert_eq!(ana.phase(), ViewPhase::Ready);
}

// ---------------------------------------------------------------------------
// Access
// ---------------------------------------------------------------------------

#[tokio::test]
async fn outsider_sees_not_participant_and_fetches_no_tasks() {
    let room = make_room().await;
    let cal = room.ana.as_user(User::new(CAL, "cal"));
    let board = SessionBoard::new(
        cal.clone(),
        room.session.clone(),
        User::new(CAL, "cal"),
        BoardSettings::default(),
    );
    board.load_initial().await;

    let view = board.view();
    assert_eq!(view.access, Access::NotParticipant);
    assert!(view.columns.is_empty());
    assert_eq!(cal.calls(StoreOp::ListTasks), 0);

    let err = board.add_task("Let me in", CAL).await.unwrap_err();
    assert!(matches!(err, MutationError::NotParticipant));
}

#[tokio::test]
async fn only_creator_may_rename() {
    let room = make_room().await;
    let ana = open_board(&room.ana, &room.session, BoardSettings::default()).await;
    let ben = open_board(&room.ben, &room.session, BoardSettings::default()).await;

    let err = ben.rename_session("Ben's room").await.unwrap_err();
    assert!(matches!(err, MutationError::NotCreator));
    assert_eq!(room.ben.calls(StoreOp::RenameSession), 0);

    let session = ana.rename_session("Exam prep").await.unwrap();
    assert_eq!(session.name, "Exam prep");

    ben.refresh_session().await;
    assert_eq!(ben.view().session_name.as_deref(), Some("Exam prep"));
}

// ---------------------------------------------------------------------------
// Reconciliation
// ---------------------------------------------------------------------------

#[tokio::test]
async fn poll_during_edit_keeps_optimistic_text_by_default() {
    let room = make_room().await;
    let task = room
        .ana
        .seed_task(&room.session, ANA, "Draft", false)
        .unwrap();
    let ana = open_board(&room.ana, &room.session, BoardSettings::default()).await;

    room.ana.pause(StoreOp::UpdateTask);
    let edit = {
        let board = Arc::clone(&ana);
        tokio::spawn(async move { board.edit_task(task.id, "Final draft").await })
    };
    tokio::task::yield_now().await;
    assert_eq!(ana.interaction(task.id).state, ItemState::EditPending);

    ana.refresh_tasks().await;
    let shown = ana.tasks().into_iter().find(|t| t.id == task.id).unwrap();
    assert_eq!(shown.text, "Final draft");

    room.ana.release(StoreOp::UpdateTask);
    let saved = edit.await.unwrap().unwrap();
    assert_eq!(saved.text, "Final draft");
    assert_eq!(ana.interaction(task.id).state, ItemState::Idle);
}

#[tokio::test]
async fn last_writer_wins_lets_poll_overwrite_in_flight_edit() {
    let room = make_room().await;
    let task = room
        .ana
        .seed_task(&room.session, ANA, "Draft", false)
        .unwrap();
    let settings = BoardSettings {
        merge_policy: MergePolicy::LastWriterWins,
        ..BoardSettings::default()
    };
    let ana = open_board(&room.ana, &room.session, settings).await;

    room.ana.pause(StoreOp::UpdateTask);
    let edit = {
        let board = Arc::clone(&ana);
        tokio::spawn(async move { board.edit_task(task.id, "Final draft").await })
    };
    tokio::task::yield_now().await;

    ana.refresh_tasks().await;
    let shown = ana.tasks().into_iter().find(|t| t.id == task.id).unwrap();
    assert_eq!(shown.text, "Draft");

    // The settled response still lands.
    room.ana.release(StoreOp::UpdateTask);
    edit.await.unwrap().unwrap();
    let shown = ana.tasks().into_iter().find(|t| t.id == task.id).unwrap();
    assert_eq!(shown.text, "Final draft");
}

/// Starts a task refresh whose response is read now but delivered only
/// after `release(ListTasks)`.
async fn start_stale_refresh(
    room: &Room,
    board: &Arc<SessionBoard<InMemoryTaskStore>>,
) -> tokio::task::JoinHandle<()> {
    room.ana.hold_response(StoreOp::ListTasks);
    let refresh = {
        let board = Arc::clone(board);
        tokio::spawn(async move { board.refresh_tasks().await })
    };
    tokio::task::yield_now().await;
    assert!(!refresh.is_finished());
    refresh
}

#[tokio::test]
async fn changes_settled_after_poll_began_win_over_its_stale_list() {
    let room = make_room().await;
    let toggled = room
        .ana
        .seed_task(&room.session, ANA, "Outline", false)
        .unwrap();
    let deleted = room
        .ana
        .seed_task(&room.session, ANA, "Old notes", false)
        .unwrap();
    let ana = open_board(&room.ana, &room.session, BoardSettings::default()).await;

    let refresh = start_stale_refresh(&room, &ana).await;
    ana.toggle_task(toggled.id).await.unwrap();
    ana.delete_task(deleted.id).await.unwrap();
    let added = ana.add_task("Flashcards", ANA).await.unwrap();

    room.ana.release(StoreOp::ListTasks);
    refresh.await.unwrap();

    let tasks = ana.tasks();
    let shown = tasks.iter().find(|t| t.id == toggled.id).unwrap();
    assert!(shown.is_done);
    assert!(tasks.iter().all(|t| t.id != deleted.id));
    assert!(tasks.iter().any(|t| t.id == added.id));

    // The next poll agrees with what is already shown.
    ana.refresh_tasks().await;
    assert_eq!(ana.tasks().len(), 2);
    assert!(ana.tasks().iter().all(|t| t.id != deleted.id));
}

#[tokio::test]
async fn last_writer_wins_shows_stale_list_until_next_poll() {
    let room = make_room().await;
    let toggled = room
        .ana
        .seed_task(&room.session, ANA, "Outline", false)
        .unwrap();
    let deleted = room
        .ana
        .seed_task(&room.session, ANA, "Old notes", false)
        .unwrap();
    let settings = BoardSettings {
        merge_policy: MergePolicy::LastWriterWins,
        ..BoardSettings::default()
    };
    let ana = open_board(&room.ana, &room.session, settings).await;

    let refresh = start_stale_refresh(&room, &ana).await;
    ana.toggle_task(toggled.id).await.unwrap();
    ana.delete_task(deleted.id).await.unwrap();

    room.ana.release(StoreOp::ListTasks);
    refresh.await.unwrap();

    let tasks = ana.tasks();
    assert!(!tasks.iter().find(|t| t.id == toggled.id).unwrap().is_done);
    assert!(tasks.iter().any(|t| t.id == deleted.id));

    ana.refresh_tasks().await;
    let tasks = ana.tasks();
    assert!(tasks.iter().find(|t| t.id == toggled.id).unwrap().is_done);
    assert!(tasks.iter().all(|t| t.id != deleted.id));
}

#[tokio::test]
async fn staleness_bound_is_one_task_poll_interval() {
    let room = make_room().await;
    let ana = open_board(&room.ana, &room.session, BoardSettings::default()).await;
    assert_eq!(ana.staleness_bound(), ana.settings().task_poll_interval);
}

// ---------------------------------------------------------------------------
// Teardown
// ---------------------------------------------------------------------------

#[tokio::test]
async fn response_after_close_is_dropped() {
    let room = make_room().await;
    let ana = open_board(&room.ana, &room.session, BoardSettings::default()).await;

    room.ana.pause(StoreOp::AddTask);
    let add = {
        let board = Arc::clone(&ana);
        tokio::spawn(async move { board.add_task("Too late", ANA).await })
    };
    tokio::task::yield_now().await;

    ana.close();
    room.ana.release(StoreOp::AddTask);
    let err = add.await.unwrap().unwrap_err();
    assert!(matches!(err, MutationError::Detached));
    assert!(ana.tasks().is_empty());

    // The store still applied it.
    assert_eq!(room.ana.tasks_snapshot(&room.session).len(), 1);
}
