//! Weekly task rules for `PairPlan` sessions.
//!
//! Pure validation, ordering, checklist editing, the time-slot conflict
//! checker and the status machine, plus [`adapter::TaskStore`] which reads
//! and writes task documents and keeps a live view of a session's tasks.

pub mod adapter;
pub mod checklist;
pub mod conflict;
pub mod status;

pub use adapter::{TaskStore, TaskSubscription};
pub use conflict::{free_slots, is_slot_available, slot_available_for};
pub use status::{NotificationAction, StatusAction, StatusError};

use std::cmp::Ordering;
use std::collections::HashSet;

use pairplan_proto::task::{MAX_TASK_TITLE_LENGTH, Task};
use thiserror::Error;

/// Errors that can occur when validating or editing a task.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TaskError {
    /// Task title cannot be empty.
    #[error("task title cannot be empty")]
    TitleEmpty,
    /// Task title exceeds the maximum length.
    #[error("task title too long (max {MAX_TASK_TITLE_LENGTH} characters)")]
    TitleTooLong,
    /// End time is not after the start time.
    #[error("end time must be after start time")]
    InvalidTimeRange,
    /// An end time was given without a start time.
    #[error("end time requires a start time")]
    EndWithoutStart,
    /// Two checklist items share an id.
    #[error("duplicate checklist item id: {0}")]
    DuplicateChecklistId(String),
    /// Checklist item text cannot be empty.
    #[error("checklist item text cannot be empty")]
    ChecklistTextEmpty,
    /// No checklist item with the given id.
    #[error("checklist item not found: {0}")]
    ChecklistItemNotFound(String),
    /// Task with the given ID was not found.
    #[error("task not found: {0}")]
    TaskNotFound(String),
}

/// Checks a task before it is written.
///
/// # Errors
///
/// Returns the first [`TaskError`] found: a blank or over-long title, an
/// end time without a start or not after it, or duplicate checklist ids.
pub fn validate_task(task: &Task) -> Result<(), TaskError> {
    let title = task.title.trim();
    if title.is_empty() {
        return Err(TaskError::TitleEmpty);
    }
    if title.chars().count() > MAX_TASK_TITLE_LENGTH {
        return Err(TaskError::TitleTooLong);
    }
    match (task.time, task.end_time) {
        (None, Some(_)) => return Err(TaskError::EndWithoutStart),
        (Some(start), Some(end)) if end <= start => return Err(TaskError::InvalidTimeRange),
        _ => {}
    }
    let mut seen = HashSet::new();
    for item in &task.checklist {
        if !seen.insert(item.id.as_str()) {
            return Err(TaskError::DuplicateChecklistId(item.id.clone()));
        }
    }
    Ok(())
}

/// Display order: weekday, then start time with untimed tasks last, then
/// creation timestamp.
#[must_use]
pub fn compare_tasks(a: &Task, b: &Task) -> Ordering {
    a.weekday
        .cmp(&b.weekday)
        .then_with(|| match (a.time, b.time) {
            (Some(x), Some(y)) => x.cmp(&y),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        })
        .then_with(|| a.timestamp.cmp(&b.timestamp))
}

/// Sorts tasks into display order.
pub fn sort_tasks(tasks: &mut [Task]) {
    tasks.sort_by(compare_tasks);
}
