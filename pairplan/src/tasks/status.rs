//! Task status machine.
//!
//! `Normal` and `Snoozed` tasks can be snoozed, cancelled or completed.
//! `Done` and `Cancelled` are terminal for those actions but can be
//! reopened, and the completion toggle always flips between `Done` and
//! `Normal`. In an individual session only the task's owner may act.

use pairplan_proto::session::SessionMode;
use pairplan_proto::task::{Task, TaskStatus};

/// A user-triggered status change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusAction {
    /// Postpone the task.
    Snooze,
    /// Give up on the task.
    Cancel,
    /// Mark the task done.
    Complete,
    /// Return the task to `Normal`.
    Reopen,
    /// Completion tap: `Done` becomes `Normal`, anything else becomes `Done`.
    ToggleDone,
}

impl std::fmt::Display for StatusAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Snooze => "snooze",
            Self::Cancel => "cancel",
            Self::Complete => "complete",
            Self::Reopen => "reopen",
            Self::ToggleDone => "toggle-done",
        };
        f.write_str(name)
    }
}

/// Buttons offered on a task reminder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationAction {
    /// "Remind me later".
    Snooze,
    /// "Done".
    Done,
}

impl From<NotificationAction> for StatusAction {
    fn from(action: NotificationAction) -> Self {
        match action {
            NotificationAction::Snooze => Self::Snooze,
            NotificationAction::Done => Self::Complete,
        }
    }
}

/// Reasons a status change is refused.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StatusError {
    /// Individual session and the actor does not own the task.
    #[error("user {user_id} may not change task {task_id}")]
    NotOwner {
        /// Task concerned.
        task_id: String,
        /// Actor.
        user_id: String,
    },
    /// The action is not allowed from the current status.
    #[error("cannot {action} a task that is {from}")]
    InvalidTransition {
        /// Current status.
        from: TaskStatus,
        /// Refused action.
        action: StatusAction,
    },
}

/// Resulting status of applying `action` in state `from`.
///
/// # Errors
///
/// Returns [`StatusError::InvalidTransition`] if the move is not allowed.
pub const fn transition(from: TaskStatus, action: StatusAction) -> Result<TaskStatus, StatusError> {
    use TaskStatus::{Cancelled, Done, Normal, Snoozed};
    let to = match (from, action) {
        (Normal | Snoozed, StatusAction::Snooze) => Snoozed,
        (Normal | Snoozed, StatusAction::Cancel) => Cancelled,
        (Normal | Snoozed, StatusAction::Complete) => Done,
        (Snoozed | Cancelled | Done, StatusAction::Reopen) => Normal,
        (Done, StatusAction::ToggleDone) => Normal,
        (_, StatusAction::ToggleDone) => Done,
        _ => return Err(StatusError::InvalidTransition { from, action }),
    };
    Ok(to)
}

/// Whether `user_id` may change `task` in a session of `mode`.
#[must_use]
pub fn may_act(mode: SessionMode, task: &Task, user_id: &str) -> bool {
    mode == SessionMode::Shared || task.owner_id == user_id
}

/// Applies `action` to `task` on behalf of `user_id`, returning the new
/// status.
///
/// # Errors
///
/// Returns [`StatusError::NotOwner`] when the ownership guard refuses the
/// actor, or [`StatusError::InvalidTransition`].
pub fn apply(
    task: &mut Task,
    mode: SessionMode,
    user_id: &str,
    action: StatusAction,
) -> Result<TaskStatus, StatusError> {
    if !may_act(mode, task, user_id) {
        return Err(StatusError::NotOwner {
            task_id: task.id.to_string(),
            user_id: user_id.to_string(),
        });
    }
    let next = transition(task.status, action)?;
    task.status = next;
    Ok(next)
}
