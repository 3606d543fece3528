//! End-to-end tests of `HttpTaskStore` against an in-process devstore.
//!
//! Each test starts its own devstore on `127.0.0.1:0` with the two demo
//! accounts (`ana-token`, `ben-token`) plus an outsider account.

#![allow(clippy::expect_used, clippy::unwrap_used, clippy::similar_names)]

use std::sync::Arc;

use studyroom::board::{Access, BoardSettings, SessionBoard, ViewPhase};
use studyroom::store::http::{AuthScheme, HttpStoreConfig, HttpTaskStore};
use studyroom::store::{StoreError, TaskStore};
use studyroom_devstore::config::demo_accounts;
use studyroom_devstore::server::{DevState, start_server_with_state};
use studyroom_devstore::store::{Account, DEFAULT_MAX_PARTICIPANTS, TaskDatabase};
use studyroom_proto::api::{AddTaskRequest, TaskPatch};
use studyroom_proto::{SessionId, User, UserId};

// ---------------------------------------------------------------------------
// Helper functions
// ---------------------------------------------------------------------------

/// Starts a devstore and returns its API base URL.
async fn start_devstore() -> String {
    let mut accounts = demo_accounts();
    accounts.push(Account::new(User::new(UserId(3), "cal"), "cal-token"));
    let state = Arc::new(DevState::new(TaskDatabase::new(
        accounts,
        DEFAULT_MAX_PARTICIPANTS,
    )));
    let (addr, _handle) = start_server_with_state("127.0.0.1:0", state)
        .await
        .expect("failed to start devstore");
    format!("http://{addr}/api")
}

fn client(base_url: &str, token: &str) -> HttpTaskStore {
    HttpTaskStore::new(&HttpStoreConfig::new(base_url, Some(token.to_string()))).unwrap()
}

fn status_of(err: &StoreError) -> Option<u16> {
    match err {
        StoreError::Status { status, .. } => Some(*status),
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// Transport
// ---------------------------------------------------------------------------

#[tokio::test]
async fn current_user_with_token_and_bearer() {
    let base = start_devstore().await;

    let me = client(&base, "ana-token").current_user().await.unwrap();
    assert_eq!(me.username, "ana");

    let mut config = HttpStoreConfig::new(&base, Some("ben-token".to_string()));
    config.auth_scheme = AuthScheme::Bearer;
    let ben = HttpTaskStore::new(&config).unwrap();
    assert_eq!(ben.current_user().await.unwrap().id, UserId(2));
}

#[tokio::test]
async fn missing_or_wrong_token_is_401() {
    let base = start_devstore().await;

    let anonymous = HttpTaskStore::new(&HttpStoreConfig::new(&base, None)).unwrap();
    let err = anonymous.current_user().await.unwrap_err();
    assert_eq!(status_of(&err), Some(401));

    let err = client(&base, "nope").list_sessions().await.unwrap_err();
    assert_eq!(status_of(&err), Some(401));
}

#[tokio::test]
async fn session_lifecycle_round_trip() {
    let base = start_devstore().await;
    let ana = client(&base, "ana-token");
    let ben = client(&base, "ben-token");

    let session = ana.create_session("  Finals  ").await.unwrap();
    assert_eq!(session.name, "Finals");
    assert_eq!(session.creator, UserId(1));

    // Visiting the session seats ben.
    let seen = ben.get_session(&session.id).await.unwrap();
    assert!(seen.is_participant(UserId(2)));
    assert_eq!(ben.list_sessions().await.unwrap().len(), 1);

    let renamed = ana.rename_session(&session.id, "Midterms").await.unwrap();
    assert_eq!(renamed.name, "Midterms");
    let err = ben
        .rename_session(&session.id, "Mine now")
        .await
        .unwrap_err();
    assert_eq!(status_of(&err), Some(403));

    ben.leave_session(&session.id).await.unwrap();
    assert!(ben.list_sessions().await.unwrap().is_empty());

    let err = ana.leave_session(&session.id).await.unwrap_err();
    assert_eq!(status_of(&err), Some(400));

    ana.delete_session(&session.id).await.unwrap();
    let err = ana.get_session(&session.id).await.unwrap_err();
    assert_eq!(status_of(&err), Some(404));
}

#[tokio::test]
async fn task_crud_and_ownership() {
    let base = start_devstore().await;
    let ana = client(&base, "ana-token");
    let ben = client(&base, "ben-token");
    let session = ana.create_session("Finals").await.unwrap();
    ben.get_session(&session.id).await.unwrap();

    let task = ana
        .add_task(
            &session.id,
            &AddTaskRequest {
                text: "Buy milk".to_string(),
                user_id: UserId(1),
            },
        )
        .await
        .unwrap();
    assert!(!task.is_done);

    let done = ana
        .update_task(&session.id, task.id, &task.toggled_patch())
        .await
        .unwrap();
    assert!(done.is_done);
    assert_eq!(done.text, "Buy milk");

    let err = ben
        .update_task(&session.id, task.id, &TaskPatch::text("Hijacked"))
        .await
        .unwrap_err();
    assert_eq!(status_of(&err), Some(403));

    let err = ana
        .update_task(&session.id, task.id, &TaskPatch::text("   "))
        .await
        .unwrap_err();
    assert_eq!(status_of(&err), Some(400));

    assert_eq!(ben.list_tasks(&session.id).await.unwrap().len(), 1);

    ana.delete_task(&session.id, task.id).await.unwrap();
    assert!(ana.list_tasks(&session.id).await.unwrap().is_empty());
}

#[tokio::test]
async fn session_id_with_slash_stays_one_path_segment() {
    let base = start_devstore().await;
    let ana = client(&base, "ana-token");
    let session = ana.create_session("Finals").await.unwrap();

    // Unescaped, this would reach the task list of the real session.
    let crafted = SessionId::new(format!("{}/tasks", session.id));
    let err = ana.get_session(&crafted).await.unwrap_err();
    assert_eq!(status_of(&err), Some(404));
}

// ---------------------------------------------------------------------------
// Board over HTTP
// ---------------------------------------------------------------------------

#[tokio::test]
async fn board_over_http_shows_both_columns() {
    let base = start_devstore().await;
    let ana_store = client(&base, "ana-token");
    let ben_store = client(&base, "ben-token");
    let session = ana_store.create_session("Finals").await.unwrap();

    let ana_user = ana_store.current_user().await.unwrap();
    let ben_user = ben_store.current_user().await.unwrap();

    let ben = SessionBoard::new(
        ben_store,
        session.id.clone(),
        ben_user,
        BoardSettings::default(),
    );
    ben.load_initial().await;
    assert_eq!(ben.phase(), ViewPhase::Ready);
    ben.add_task("Read book", UserId(2)).await.unwrap();

    let ana = SessionBoard::new(
        ana_store,
        session.id.clone(),
        ana_user,
        BoardSettings::default(),
    );
    ana.load_initial().await;
    ana.add_task("Buy milk", UserId(1)).await.unwrap();

    let view = ana.view();
    assert_eq!(view.access, Access::Participant);
    assert_eq!(view.columns.len(), 2);
    assert_eq!(view.columns[0].active[0].task.text, "Buy milk");
    assert_eq!(view.columns[1].active[0].task.text, "Read book");
    assert!(view.rename.is_some());
}

#[tokio::test]
async fn third_visitor_is_not_a_participant() {
    let base = start_devstore().await;
    let ana = client(&base, "ana-token");
    let session = ana.create_session("Finals").await.unwrap();
    client(&base, "ben-token")
        .get_session(&session.id)
        .await
        .unwrap();

    let cal_store = client(&base, "cal-token");
    let cal_user = cal_store.current_user().await.unwrap();
    let cal = SessionBoard::new(cal_store, session.id, cal_user, BoardSettings::default());
    cal.load_initial().await;

    assert_eq!(cal.phase(), ViewPhase::Ready);
    assert_eq!(cal.view().access, Access::NotParticipant);
    assert!(cal.tasks().is_empty());
}
