//! Integration tests for the WebSocket document store client.
//!
//! Each test starts a real document store server on an ephemeral port and
//! talks to it through one or more [`RemoteStore`] connections.

#![allow(
    clippy::expect_used,
    clippy::unwrap_used,
    clippy::similar_names,
    clippy::redundant_clone
)]

use std::sync::Arc;
use std::time::{Duration, Instant};

use pairplan::identity::LocalIdentity;
use pairplan::notify::RecordingScheduler;
use pairplan::recent::RecentSessions;
use pairplan::session::{SessionError, SessionEvent, SessionOptions, SessionViewModel, TaskDraft};
use pairplan::store::remote::RemoteStore;
use pairplan::store::{DocumentStore, StoreError, TxOutcome, run_transaction};
use pairplan_docstore::engine::MemoryStore;
use pairplan_docstore::server::{self, DEFAULT_MAX_FRAME_SIZE, ServerState};
use pairplan_proto::session::SessionMode;
use pairplan_proto::task::Weekday;
use pairplan_proto::value::{Document, FieldValue};
use pairplan_proto::wire::{FieldFilter, Precondition, Write};

const SHORT: Duration = Duration::from_secs(2);

// ---------------------------------------------------------------------------
// Helper functions
// ---------------------------------------------------------------------------

/// Starts a server and returns its store engine and `ws://` URL.
async fn start() -> (Arc<MemoryStore>, String, tokio::task::JoinHandle<()>) {
    let engine = Arc::new(MemoryStore::new());
    let state = Arc::new(ServerState::with_config(
        Arc::clone(&engine),
        DEFAULT_MAX_FRAME_SIZE,
    ));
    let (addr, handle) = server::start_server_with_state("127.0.0.1:0", state)
        .await
        .unwrap();
    (engine, format!("ws://{addr}/ws"), handle)
}

async fn connect(url: &str) -> Arc<RemoteStore> {
    Arc::new(RemoteStore::connect(url, SHORT, SHORT).await.unwrap())
}

fn view_model(store: Arc<RemoteStore>, user: &str) -> SessionViewModel<Arc<RemoteStore>> {
    let (vm, _events) = SessionViewModel::new(
        store,
        LocalIdentity::from_user_id(user),
        RecentSessions::in_memory(10),
        Arc::new(RecordingScheduler::new()),
        SessionOptions::default(),
    );
    vm
}

fn doc(key: &str, value: impl Into<FieldValue>) -> Document {
    let mut d = Document::new();
    d.insert(key.to_string(), value.into());
    d
}

/// Polls `check` every 10ms until it returns true, failing after two seconds.
async fn eventually(mut check: impl FnMut() -> bool, what: &str) {
    let deadline = Instant::now() + SHORT;
    while !check() {
        assert!(Instant::now() < deadline, "timed out waiting for {what}");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

/// Increments `counters/c` ten times, one transaction each.
async fn bump(store: Arc<RemoteStore>) {
    for _ in 0..10 {
        run_transaction(&store, "counters/c", 50, |current| {
            let n = current
                .and_then(|d| d.fields.get("n"))
                .and_then(FieldValue::as_integer)
                .unwrap_or(0);
            Ok::<_, StoreError>(TxOutcome::Commit {
                writes: vec![Write::set("counters/c", doc("n", n + 1))],
                value: (),
            })
        })
        .await
        .unwrap();
    }
}

// ===========================================================================
// Store operations
// ===========================================================================

#[tokio::test]
async fn commit_get_and_filtered_list() {
    let (_engine, url, _server) = start().await;
    let store = connect(&url).await;

    store
        .commit(vec![
            Write::set("sessions/AAAAAA", doc("ownerId", "x")),
            Write::set("sessions/BBBBBB", doc("ownerId", "y")),
            Write::set("sessions/CCCCCC", doc("ownerId", "x")),
        ])
        .await
        .unwrap();

    let got = store.get("sessions/BBBBBB").await.unwrap().unwrap();
    assert_eq!(got.fields.get("ownerId"), Some(&FieldValue::from("y")));
    assert!(store.get("sessions/ZZZZZZ").await.unwrap().is_none());

    let owned = store
        .list(
            "sessions",
            Some(FieldFilter {
                field: "ownerId".into(),
                value: "x".into(),
            }),
        )
        .await
        .unwrap();
    let ids: Vec<&str> = owned.iter().map(|d| d.id.as_str()).collect();
    assert_eq!(ids, ["AAAAAA", "CCCCCC"]);
}

#[tokio::test]
async fn preconditions_are_enforced_remotely() {
    let (_engine, url, _server) = start().await;
    let store = connect(&url).await;

    store
        .commit(vec![Write::create("sessions/AAAAAA", doc("mode", "shared"))])
        .await
        .unwrap();
    let err = store
        .commit(vec![Write::create("sessions/AAAAAA", doc("mode", "individual"))])
        .await
        .unwrap_err();
    assert!(err.is_already_exists());

    let err = store
        .commit(vec![
            Write::set("sessions/AAAAAA", doc("mode", "individual"))
                .when(Precondition::Version(999)),
        ])
        .await
        .unwrap_err();
    assert!(err.is_precondition_failure());

    let kept = store.get("sessions/AAAAAA").await.unwrap().unwrap();
    assert_eq!(kept.fields.get("mode"), Some(&FieldValue::from("shared")));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn transactions_from_two_clients_serialize() {
    let (_engine, url, _server) = start().await;
    let a = connect(&url).await;
    let b = connect(&url).await;

    let (ra, rb) = tokio::join!(tokio::spawn(bump(a.clone())), tokio::spawn(bump(b)));
    ra.unwrap();
    rb.unwrap();

    let counter = a.get("counters/c").await.unwrap().unwrap();
    assert_eq!(counter.fields.get("n"), Some(&FieldValue::Integer(20)));
}

// ===========================================================================
// Subscriptions
// ===========================================================================

#[tokio::test]
async fn subscription_delivers_snapshots_until_cancelled() {
    let (engine, url, _server) = start().await;
    let watcher = connect(&url).await;
    let writer = connect(&url).await;

    let mut feed = watcher.subscribe("sessions/AAAAAA/tasks").await.unwrap();
    let initial = tokio::time::timeout(SHORT, feed.next())
        .await
        .unwrap()
        .unwrap();
    assert!(initial.is_empty());

    writer
        .commit(vec![Write::set("sessions/AAAAAA/tasks/t1", doc("title", "Gym"))])
        .await
        .unwrap();
    let update = tokio::time::timeout(SHORT, feed.next())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(update.len(), 1);
    assert_eq!(update[0].id, "t1");

    assert_eq!(engine.subscription_count(), 1);
    feed.cancel();
    feed.cancel();
    assert!(feed.is_cancelled());
    assert!(feed.next().await.is_none());
    eventually(|| engine.subscription_count() == 0, "server-side unsubscribe").await;
}

#[tokio::test]
async fn dropping_client_releases_subscriptions() {
    let (engine, url, _server) = start().await;
    let watcher = connect(&url).await;
    let feed = watcher.subscribe("sessions/AAAAAA/tasks").await.unwrap();
    assert_eq!(engine.subscription_count(), 1);

    drop(feed);
    drop(watcher);
    eventually(|| engine.subscription_count() == 0, "connection cleanup").await;
}

// ===========================================================================
// End to end through the view model
// ===========================================================================

#[tokio::test]
async fn two_clients_share_a_session() {
    let (_engine, url, _server) = start().await;
    let mut x = view_model(connect(&url).await, "user-x");
    let mut y = view_model(connect(&url).await, "user-y");
    let mut z = view_model(connect(&url).await, "user-z");

    let code = x.create_session(SessionMode::Individual).await.unwrap();
    y.join_session(&code.to_string().to_lowercase()).await.unwrap();
    assert_eq!(
        z.join_session(code.as_str()).await.unwrap_err(),
        SessionError::Capacity(code.clone())
    );

    let task = x
        .add_task(TaskDraft::new("Piano", Weekday::Thursday))
        .await
        .unwrap();
    eventually(|| y.tasks().iter().any(|t| t.id == task.id), "task on y").await;

    y.leave_session().await.unwrap();
    z.join_session(code.as_str()).await.unwrap();
    eventually(|| z.tasks().len() == 1, "task on z").await;
}

#[tokio::test]
async fn lost_connection_is_reported() {
    let state = Arc::new(ServerState::new());
    let (addr, _server) = server::start_server_with_state("127.0.0.1:0", Arc::clone(&state))
        .await
        .unwrap();
    let store = connect(&format!("ws://{addr}/ws")).await;
    let (mut vm, mut events) = SessionViewModel::new(
        Arc::clone(&store),
        LocalIdentity::from_user_id("user-x"),
        RecentSessions::in_memory(10),
        Arc::new(RecordingScheduler::new()),
        SessionOptions::default(),
    );
    let code = vm.create_session(SessionMode::Shared).await.unwrap();

    state.close_all_connections().await;
    let lost = tokio::time::timeout(SHORT, async {
        loop {
            match events.recv().await {
                Some(SessionEvent::FeedLost { code }) => break code,
                Some(_) => {}
                None => panic!("event channel closed"),
            }
        }
    })
    .await
    .expect("feed loss not reported");
    assert_eq!(lost, code);
    assert!(!store.is_connected());
}
