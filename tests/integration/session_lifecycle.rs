//! Integration tests for session creation, joining, leaving and deletion.
//!
//! Every test runs several view models, one per user, against a shared
//! in-process document store.

#![allow(
    clippy::expect_used,
    clippy::unwrap_used,
    clippy::similar_names,
    clippy::redundant_clone
)]

use std::sync::Arc;

use pairplan::identity::LocalIdentity;
use pairplan::notify::RecordingScheduler;
use pairplan::recent::RecentSessions;
use pairplan::registry::{RegistryOptions, SessionRegistry};
use pairplan::session::{SessionError, SessionOptions, SessionViewModel, TaskDraft};
use pairplan::store::DocumentStore;
use pairplan::store::local::LocalStore;
use pairplan_proto::path;
use pairplan_proto::session::{SessionCode, SessionMode};
use pairplan_proto::task::Weekday;

// ---------------------------------------------------------------------------
// Helper functions
// ---------------------------------------------------------------------------

/// Creates a view model acting as `user` on `store`.
fn view_model(store: &LocalStore, user: &str) -> SessionViewModel<LocalStore> {
    let (vm, _events) = SessionViewModel::new(
        store.clone(),
        LocalIdentity::from_user_id(user),
        RecentSessions::in_memory(10),
        Arc::new(RecordingScheduler::new()),
        SessionOptions::default(),
    );
    vm
}

/// Reads the stored participant list of `code`.
async fn participants(store: &LocalStore, code: &SessionCode) -> Vec<String> {
    SessionRegistry::new(store.clone(), RegistryOptions::default())
        .load_session(code)
        .await
        .unwrap()
        .participants
}

fn code(s: &str) -> SessionCode {
    SessionCode::parse(s).unwrap()
}

// ===========================================================================
// Capacity
// ===========================================================================

#[tokio::test]
async fn individual_session_admits_two() {
    let store = LocalStore::new();
    let mut x = view_model(&store, "user-x");
    let mut y = view_model(&store, "user-y");
    let mut z = view_model(&store, "user-z");

    let created = x.create_session(SessionMode::Individual).await.unwrap();
    assert_eq!(x.current_mode(), Some(SessionMode::Individual));

    y.join_session(created.as_str()).await.unwrap();
    let err = z.join_session(created.as_str()).await.unwrap_err();
    assert_eq!(err, SessionError::Capacity(created.clone()));
    assert!(z.current_code().is_none());

    let members = participants(&store, &created).await;
    assert_eq!(members.len(), 2);
    assert!(members.contains(&"user-x".to_string()));
    assert!(members.contains(&"user-y".to_string()));
}

#[tokio::test]
async fn rejoin_is_idempotent() {
    let store = LocalStore::new();
    let mut x = view_model(&store, "user-x");
    let mut y = view_model(&store, "user-y");

    let created = x.create_session(SessionMode::Individual).await.unwrap();
    y.join_session(created.as_str()).await.unwrap();
    y.join_session(created.as_str()).await.unwrap();
    x.join_session(created.as_str()).await.unwrap();

    assert_eq!(participants(&store, &created).await.len(), 2);
}

#[tokio::test]
async fn shared_session_has_no_cap() {
    let store = LocalStore::new();
    let mut owner = view_model(&store, "owner");
    let created = owner.create_session(SessionMode::Shared).await.unwrap();

    for i in 0..6 {
        let mut vm = view_model(&store, &format!("user-{i}"));
        vm.join_session(created.as_str()).await.unwrap();
    }
    assert_eq!(participants(&store, &created).await.len(), 7);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_joins_respect_capacity() {
    let store = LocalStore::new();
    let mut owner = view_model(&store, "owner");
    let created = owner.create_session(SessionMode::Individual).await.unwrap();

    let mut handles = Vec::new();
    for user in ["user-a", "user-b", "user-c"] {
        let mut vm = view_model(&store, user);
        let code = created.to_string();
        handles.push(tokio::spawn(async move { vm.join_session(&code).await }));
    }

    let mut joined = 0;
    let mut full = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => joined += 1,
            Err(SessionError::Capacity(_)) => full += 1,
            Err(other) => panic!("unexpected join error: {other:?}"),
        }
    }
    assert_eq!(joined, 1);
    assert_eq!(full, 2);
    assert_eq!(participants(&store, &created).await.len(), 2);
}

// ===========================================================================
// Code handling
// ===========================================================================

#[tokio::test]
async fn join_normalizes_code_input() {
    let store = LocalStore::new();
    let mut x = view_model(&store, "user-x")
        .with_code_generator(Arc::new(|| "AB12CD".to_string()));
    let mut y = view_model(&store, "user-y");

    assert_eq!(
        x.create_session(SessionMode::Shared).await.unwrap(),
        code("AB12CD")
    );
    assert_eq!(y.join_session("  ab12cd ").await.unwrap(), code("AB12CD"));
    assert_eq!(y.current_code(), Some(&code("AB12CD")));
}

#[tokio::test]
async fn unknown_and_malformed_codes() {
    let store = LocalStore::new();
    let mut y = view_model(&store, "user-y");

    assert_eq!(
        y.join_session("ZZZZZZ").await.unwrap_err(),
        SessionError::NotFound(code("ZZZZZZ"))
    );
    assert!(matches!(
        y.join_session("AB1").await.unwrap_err(),
        SessionError::Validation(_)
    ));
    assert!(matches!(
        y.join_session("AB-2CD").await.unwrap_err(),
        SessionError::Validation(_)
    ));
}

#[tokio::test]
async fn colliding_codes_are_retried() {
    let store = LocalStore::new();
    let counter = Arc::new(std::sync::atomic::AtomicUsize::new(0));
    let sequence = ["AAAAAA", "AAAAAA", "BBBBBB"];
    let next = Arc::clone(&counter);
    let mut x = view_model(&store, "user-x").with_code_generator(Arc::new(move || {
        let i = next.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        sequence[i.min(sequence.len() - 1)].to_string()
    }));

    assert_eq!(x.create_session(SessionMode::Shared).await.unwrap(), code("AAAAAA"));
    assert_eq!(x.create_session(SessionMode::Shared).await.unwrap(), code("BBBBBB"));
}

// ===========================================================================
// Leaving and reopening
// ===========================================================================

#[tokio::test]
async fn leave_frees_a_seat() {
    let store = LocalStore::new();
    let mut x = view_model(&store, "user-x");
    let mut y = view_model(&store, "user-y");
    let mut z = view_model(&store, "user-z");

    let created = x.create_session(SessionMode::Individual).await.unwrap();
    y.join_session(created.as_str()).await.unwrap();
    y.leave_session().await.unwrap();
    assert!(y.current_code().is_none());
    assert!(y.tasks().is_empty());

    z.join_session(created.as_str()).await.unwrap();
    let members = participants(&store, &created).await;
    assert!(members.contains(&"user-z".to_string()));
    assert!(!members.contains(&"user-y".to_string()));
}

#[tokio::test]
async fn open_session_requires_membership() {
    let store = LocalStore::new();
    let mut x = view_model(&store, "user-x");
    let mut stranger = view_model(&store, "stranger");

    let created = x.create_session(SessionMode::Shared).await.unwrap();
    x.leave_session().await.unwrap();
    assert!(matches!(
        x.open_session(created.as_str()).await.unwrap_err(),
        SessionError::Forbidden(_)
    ));
    assert!(matches!(
        stranger.open_session(created.as_str()).await.unwrap_err(),
        SessionError::Forbidden(_)
    ));
}

#[tokio::test]
async fn recent_sessions_track_entered_codes() {
    let store = LocalStore::new();
    let mut x = view_model(&store, "user-x");
    let first = x.create_session(SessionMode::Shared).await.unwrap();
    let second = x.create_session(SessionMode::Individual).await.unwrap();
    x.open_session(first.as_str()).await.unwrap();

    assert_eq!(x.recent_sessions(), &[first, second]);
    x.clear_recent_sessions();
    assert!(x.recent_sessions().is_empty());
}

// ===========================================================================
// Ownership and deletion
// ===========================================================================

#[tokio::test]
async fn my_sessions_lists_only_owned() {
    let store = LocalStore::new();
    let mut x = view_model(&store, "user-x");
    let mut y = view_model(&store, "user-y");

    let a = x.create_session(SessionMode::Shared).await.unwrap();
    let b = x.create_session(SessionMode::Individual).await.unwrap();
    let other = y.create_session(SessionMode::Shared).await.unwrap();
    x.join_session(other.as_str()).await.unwrap();

    let mut owned: Vec<SessionCode> = x
        .load_my_sessions()
        .await
        .unwrap()
        .iter()
        .map(|s| s.code.clone())
        .collect();
    owned.sort();
    let mut expected = vec![a, b];
    expected.sort();
    assert_eq!(owned, expected);
}

#[tokio::test]
async fn owner_delete_cascades() {
    let store = LocalStore::new();
    let mut x = view_model(&store, "user-x");
    let mut y = view_model(&store, "user-y");

    let created = x.create_session(SessionMode::Shared).await.unwrap();
    y.join_session(created.as_str()).await.unwrap();
    x.add_task(TaskDraft::new("Gym", Weekday::Monday)).await.unwrap();
    x.add_task(TaskDraft::new("Read", Weekday::Tuesday)).await.unwrap();

    x.delete_session(created.as_str()).await.unwrap();

    assert!(x.current_code().is_none());
    assert!(!x.recent_sessions().contains(&created));
    assert!(store.get(&path::session(&created)).await.unwrap().is_none());
    assert!(store.list(&path::tasks(&created), None).await.unwrap().is_empty());
    assert!(
        store
            .list(&path::participants(&created), None)
            .await
            .unwrap()
            .is_empty()
    );
    assert_eq!(store.engine().document_count(), 0);

    let mut z = view_model(&store, "user-z");
    assert_eq!(
        z.join_session(created.as_str()).await.unwrap_err(),
        SessionError::NotFound(created)
    );
}

#[tokio::test]
async fn non_owner_cannot_delete() {
    let store = LocalStore::new();
    let mut x = view_model(&store, "user-x");
    let mut y = view_model(&store, "user-y");

    let created = x.create_session(SessionMode::Shared).await.unwrap();
    y.join_session(created.as_str()).await.unwrap();

    let err = y.delete_session(created.as_str()).await.unwrap_err();
    assert!(matches!(err, SessionError::Forbidden(_)));
    assert!(store.get(&path::session(&created)).await.unwrap().is_some());
}

#[tokio::test]
async fn deleted_session_accepts_no_more_tasks() {
    let store = LocalStore::new();
    let mut x = view_model(&store, "user-x")
        .with_code_generator(Arc::new(|| "AB12CD".to_string()));
    let mut y = view_model(&store, "user-y");

    let created = x.create_session(SessionMode::Shared).await.unwrap();
    y.join_session(created.as_str()).await.unwrap();
    x.delete_session(created.as_str()).await.unwrap();

    let err = y
        .add_task(TaskDraft::new("ghost", Weekday::Monday))
        .await
        .unwrap_err();
    assert_eq!(err, SessionError::NotFound(created.clone()));
    assert!(y.tasks().iter().all(|t| t.title != "ghost"));
    assert_eq!(store.engine().document_count(), 0);

    let mut again = view_model(&store, "user-w")
        .with_code_generator(Arc::new(|| "AB12CD".to_string()));
    assert_eq!(again.create_session(SessionMode::Shared).await.unwrap(), created);
    let mut joiner = view_model(&store, "user-v");
    joiner.join_session(created.as_str()).await.unwrap();
    assert!(joiner.tasks().is_empty());
}
