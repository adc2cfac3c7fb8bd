//! Local reminder scheduling.
//!
//! The platform notification service sits behind [`NotificationScheduler`].
//! [`RecordingScheduler`] keeps the schedule in memory; the CLI and the tests
//! use it.

use std::collections::HashMap;
use std::time::Duration;

use pairplan_proto::task::{ClockTime, Task, Weekday};
use parking_lot::Mutex;

/// Default delay before a snoozed task reminds again.
pub const DEFAULT_SNOOZE_MINUTES: u64 = 10;

/// When a reminder fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FireSpec {
    /// Once, after a delay from now.
    After(Duration),
    /// Every week on `weekday` at `time`.
    Weekly {
        /// Day of the week.
        weekday: Weekday,
        /// Time of day.
        time: ClockTime,
    },
}

/// A pending reminder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reminder {
    /// When it fires.
    pub fire: FireSpec,
    /// Notification title.
    pub title: String,
    /// Notification body.
    pub body: String,
}

/// Schedules and cancels reminders by id. Scheduling an existing id
/// replaces it.
pub trait NotificationScheduler: Send + Sync {
    /// Schedules (or replaces) reminder `id`.
    fn schedule(&self, id: &str, fire: FireSpec, title: &str, body: &str);

    /// Cancels reminder `id` if it exists.
    fn cancel(&self, id: &str);
}

/// Id of a task's weekly reminder.
#[must_use]
pub fn weekly_reminder_id(task: &Task) -> String {
    task.id.to_string()
}

/// Id of a task's one-shot snooze reminder.
#[must_use]
pub fn snooze_reminder_id(task: &Task) -> String {
    format!("{}-snooze", task.id)
}

/// In-memory scheduler that records what would be shown.
#[derive(Debug, Default)]
pub struct RecordingScheduler {
    reminders: Mutex<HashMap<String, Reminder>>,
}

impl RecordingScheduler {
    /// Creates an empty scheduler.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The reminder scheduled under `id`, if any.
    #[must_use]
    pub fn get(&self, id: &str) -> Option<Reminder> {
        self.reminders.lock().get(id).cloned()
    }

    /// Number of pending reminders.
    #[must_use]
    pub fn len(&self) -> usize {
        self.reminders.lock().len()
    }

    /// Whether nothing is scheduled.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.reminders.lock().is_empty()
    }
}

impl NotificationScheduler for RecordingScheduler {
    fn schedule(&self, id: &str, fire: FireSpec, title: &str, body: &str) {
        tracing::debug!(reminder = id, ?fire, "reminder scheduled");
        self.reminders.lock().insert(
            id.to_string(),
            Reminder {
                fire,
                title: title.to_string(),
                body: body.to_string(),
            },
        );
    }

    fn cancel(&self, id: &str) {
        if self.reminders.lock().remove(id).is_some() {
            tracing::debug!(reminder = id, "reminder cancelled");
        }
    }
}
