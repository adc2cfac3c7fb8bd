//! Integration tests for live task synchronization between participants.
//!
//! Two or more view models share one in-process store; each keeps its own
//! converged task list fed by the store's change feed.

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
use pairplan::session::{SessionError, SessionOptions, SessionViewModel, TaskDraft};
use pairplan::store::DocumentStore;
use pairplan::store::local::LocalStore;
use pairplan::tasks::StatusAction;
use pairplan_proto::session::{SessionCode, SessionMode};
use pairplan_proto::task::{ClockTime, Task, TaskStatus, TaskType, Weekday};

// ---------------------------------------------------------------------------
// Helper functions
// ---------------------------------------------------------------------------

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

/// Creates a session as "user-x" and joins it as "user-y".
async fn pair(
    store: &LocalStore,
    mode: SessionMode,
) -> (
    SessionViewModel<LocalStore>,
    SessionViewModel<LocalStore>,
    SessionCode,
) {
    let mut x = view_model(store, "user-x");
    let mut y = view_model(store, "user-y");
    let code = x.create_session(mode).await.unwrap();
    y.join_session(code.as_str()).await.unwrap();
    (x, y, code)
}

/// Polls `vm`'s task list until `pred` holds, failing after two seconds.
async fn wait_until<S: DocumentStore + Clone>(
    vm: &SessionViewModel<S>,
    pred: impl Fn(&[Task]) -> bool,
) -> Vec<Task> {
    let deadline = Instant::now() + Duration::from_secs(2);
    loop {
        let tasks = vm.tasks();
        if pred(&tasks) {
            return tasks;
        }
        assert!(
            Instant::now() < deadline,
            "timed out waiting for task list, last: {tasks:?}"
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

fn at(h: u8, m: u8) -> ClockTime {
    ClockTime::new(h, m).unwrap()
}

// ===========================================================================
// Propagation
// ===========================================================================

#[tokio::test]
async fn added_task_reaches_other_participant() {
    let store = LocalStore::new();
    let (x, y, _) = pair(&store, SessionMode::Shared).await;

    let task = x
        .add_task(
            TaskDraft::new("Gym", Weekday::Tuesday)
                .at(at(18, 0))
                .with_type(TaskType::Health),
        )
        .await
        .unwrap();

    let seen = wait_until(&y, |tasks| tasks.iter().any(|t| t.id == task.id)).await;
    let remote = seen.iter().find(|t| t.id == task.id).unwrap();
    assert_eq!(remote.title, "Gym");
    assert_eq!(remote.owner_id, "user-x");
    assert_eq!(remote.task_type, TaskType::Health);
    assert_eq!(remote.time, Some(at(18, 0)));
}

#[tokio::test]
async fn absent_optional_fields_stay_absent() {
    let store = LocalStore::new();
    let (x, y, _) = pair(&store, SessionMode::Shared).await;

    let plain = x
        .add_task(TaskDraft::new("Water plants", Weekday::Sunday).with_description("   "))
        .await
        .unwrap();
    assert_eq!(plain.description, None);

    let seen = wait_until(&y, |tasks| tasks.len() == 1).await;
    assert_eq!(seen[0].time, None);
    assert_eq!(seen[0].end_time, None);
    assert_eq!(seen[0].description, None);
    assert!(seen[0].checklist.is_empty());
    assert_eq!(seen[0].status, TaskStatus::Normal);
}

#[tokio::test]
async fn tasks_arrive_in_display_order() {
    let store = LocalStore::new();
    let (x, y, _) = pair(&store, SessionMode::Shared).await;

    x.add_task(TaskDraft::new("untimed monday", Weekday::Monday))
        .await
        .unwrap();
    x.add_task(TaskDraft::new("wednesday", Weekday::Wednesday).at(at(8, 0)))
        .await
        .unwrap();
    x.add_task(TaskDraft::new("late monday", Weekday::Monday).at(at(20, 0)))
        .await
        .unwrap();
    x.add_task(TaskDraft::new("early monday", Weekday::Monday).at(at(7, 0)))
        .await
        .unwrap();

    let seen = wait_until(&y, |tasks| tasks.len() == 4).await;
    let titles: Vec<&str> = seen.iter().map(|t| t.title.as_str()).collect();
    assert_eq!(
        titles,
        ["early monday", "late monday", "untimed monday", "wednesday"]
    );
    assert_eq!(y.tasks_for(Weekday::Monday).len(), 3);
}

#[tokio::test]
async fn deleted_task_disappears_everywhere() {
    let store = LocalStore::new();
    let (x, y, _) = pair(&store, SessionMode::Shared).await;

    let task = x
        .add_task(TaskDraft::new("Dentist", Weekday::Thursday))
        .await
        .unwrap();
    wait_until(&y, |tasks| tasks.len() == 1).await;

    x.delete_task(&task.id).await.unwrap();
    wait_until(&y, <[Task]>::is_empty).await;
    assert!(x.tasks().is_empty());
}

#[tokio::test]
async fn left_participant_stops_receiving() {
    let store = LocalStore::new();
    let (x, mut y, _) = pair(&store, SessionMode::Shared).await;

    y.leave_session().await.unwrap();
    x.add_task(TaskDraft::new("After leave", Weekday::Monday))
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(y.tasks().is_empty());
    assert_eq!(store.engine().subscription_count(), 1);
}

// ===========================================================================
// Conflicts
// ===========================================================================

#[tokio::test]
async fn point_task_blocks_overlapping_range() {
    let store = LocalStore::new();
    let (x, y, _) = pair(&store, SessionMode::Shared).await;

    x.add_task(TaskDraft::new("Call", Weekday::Monday).at(at(14, 0)))
        .await
        .unwrap();
    wait_until(&y, |tasks| tasks.len() == 1).await;

    let err = y
        .add_task(
            TaskDraft::new("Meeting", Weekday::Monday)
                .at(at(14, 30))
                .until(at(15, 0)),
        )
        .await
        .unwrap_err();
    assert_eq!(
        err,
        SessionError::Conflict {
            weekday: Weekday::Monday,
            time: at(14, 30)
        }
    );

    y.add_task(TaskDraft::new("Next call", Weekday::Monday).at(at(15, 0)))
        .await
        .unwrap();
    y.add_task(TaskDraft::new("Other day", Weekday::Tuesday).at(at(14, 0)))
        .await
        .unwrap();
    wait_until(&x, |tasks| tasks.len() == 3).await;
}

#[tokio::test]
async fn range_blocks_point_inside_and_allows_adjacent() {
    let store = LocalStore::new();
    let (x, _y, _) = pair(&store, SessionMode::Shared).await;

    x.add_task(
        TaskDraft::new("Class", Weekday::Friday)
            .at(at(9, 0))
            .until(at(10, 0)),
    )
    .await
    .unwrap();

    let err = x
        .add_task(TaskDraft::new("Coffee", Weekday::Friday).at(at(9, 30)))
        .await
        .unwrap_err();
    assert!(matches!(err, SessionError::Conflict { .. }));

    x.add_task(
        TaskDraft::new("Lab", Weekday::Friday)
            .at(at(10, 0))
            .until(at(11, 0)),
    )
    .await
    .unwrap();

    let slots = x.free_slots(Weekday::Friday);
    assert_eq!(slots.first(), Some(&(at(0, 0), at(9, 0))));
    assert_eq!(slots.last(), Some(&(at(11, 0), at(23, 59))));
}

#[tokio::test]
async fn editing_a_task_ignores_its_own_slot() {
    let store = LocalStore::new();
    let (x, y, _) = pair(&store, SessionMode::Shared).await;

    let task = x
        .add_task(TaskDraft::new("Run", Weekday::Saturday).at(at(7, 0)))
        .await
        .unwrap();

    let mut edited = task.clone();
    edited.title = "Long run".to_string();
    edited.end_time = Some(at(9, 0));
    x.edit_task(edited).await.unwrap();

    let seen = wait_until(&y, |tasks| {
        tasks.iter().any(|t| t.title == "Long run")
    })
    .await;
    assert_eq!(seen[0].end_time, Some(at(9, 0)));
    assert_eq!(seen[0].id, task.id);
    assert_eq!(seen[0].timestamp, task.timestamp);
}

#[tokio::test]
async fn invalid_range_rejected() {
    let store = LocalStore::new();
    let (x, _y, _) = pair(&store, SessionMode::Shared).await;

    let err = x
        .add_task(
            TaskDraft::new("Backwards", Weekday::Monday)
                .at(at(10, 0))
                .until(at(9, 0)),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, SessionError::Validation(_)));

    let err = x
        .add_task(TaskDraft::new("  ", Weekday::Monday))
        .await
        .unwrap_err();
    assert!(matches!(err, SessionError::Validation(_)));
    assert!(x.tasks().is_empty());
}

// ===========================================================================
// Ownership
// ===========================================================================

#[tokio::test]
async fn individual_mode_guards_status_changes() {
    let store = LocalStore::new();
    let (x, y, _) = pair(&store, SessionMode::Individual).await;

    let task = x
        .add_task(TaskDraft::new("Laundry", Weekday::Sunday))
        .await
        .unwrap();
    wait_until(&y, |tasks| tasks.len() == 1).await;

    let err = y
        .apply_status(&task.id, StatusAction::Cancel)
        .await
        .unwrap_err();
    assert!(matches!(err, SessionError::Forbidden(_)));
    assert_eq!(y.tasks()[0].status, TaskStatus::Normal);

    assert_eq!(
        x.apply_status(&task.id, StatusAction::Cancel).await.unwrap(),
        TaskStatus::Cancelled
    );
    wait_until(&y, |tasks| tasks[0].status == TaskStatus::Cancelled).await;
}

#[tokio::test]
async fn shared_mode_lets_anyone_complete() {
    let store = LocalStore::new();
    let (x, y, _) = pair(&store, SessionMode::Shared).await;

    let task = x
        .add_task(TaskDraft::new("Groceries", Weekday::Saturday))
        .await
        .unwrap();
    wait_until(&y, |tasks| tasks.len() == 1).await;

    y.apply_status(&task.id, StatusAction::ToggleDone)
        .await
        .unwrap();
    wait_until(&x, |tasks| tasks[0].status == TaskStatus::Done).await;

    let item = x.add_checklist_item(&task.id, "bread").await.unwrap();
    wait_until(&y, |tasks| tasks[0].checklist.len() == 1).await;
    assert!(y.toggle_checklist_item(&task.id, &item).await.unwrap());
    wait_until(&x, |tasks| tasks[0].checklist[0].is_completed).await;
}

#[tokio::test]
async fn only_creator_edits_or_deletes() {
    let store = LocalStore::new();
    let (x, y, _) = pair(&store, SessionMode::Shared).await;

    let task = x
        .add_task(TaskDraft::new("Plan trip", Weekday::Wednesday))
        .await
        .unwrap();
    wait_until(&y, |tasks| tasks.len() == 1).await;

    let mut edited = task.clone();
    edited.title = "Hijacked".to_string();
    assert!(matches!(
        y.edit_task(edited).await.unwrap_err(),
        SessionError::Forbidden(_)
    ));
    assert!(matches!(
        y.delete_task(&task.id).await.unwrap_err(),
        SessionError::Forbidden(_)
    ));
    assert!(matches!(
        y.add_checklist_item(&task.id, "nope").await.unwrap_err(),
        SessionError::Forbidden(_)
    ));
    assert_eq!(x.tasks()[0].title, "Plan trip");
}
