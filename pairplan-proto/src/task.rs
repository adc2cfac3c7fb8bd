//! Task domain types for the weekly recurring task list.
//!
//! Tasks are anchored to a [`Weekday`] rather than a calendar date and may
//! carry a [`ClockTime`] slot. [`TaskStatus`] is the canonical completion
//! state; the legacy boolean is derived via [`Task::is_completed`].

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Maximum allowed task title length in characters.
pub const MAX_TASK_TITLE_LENGTH: usize = 256;

/// Duration assumed for a task without an explicit end time.
pub const DEFAULT_TASK_MINUTES: u16 = 60;

/// Minutes in a day; valid clock times are strictly below this.
pub const MINUTES_PER_DAY: u16 = 24 * 60;

/// Client-generated task identifier.
///
/// New ids are UUID v7 strings (time-ordered); ids read back from the store
/// are kept verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TaskId(String);

impl TaskId {
    /// Creates a new time-ordered task identifier.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7().to_string())
    }

    /// Wraps an existing identifier string.
    pub fn from_string(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Category of a task. Drives presentation only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TaskType {
    /// Work.
    Work,
    /// Personal errands.
    Personal,
    /// Shopping.
    Shopping,
    /// Health and sport.
    Health,
    /// Learning.
    Education,
    /// Anything else.
    Other,
}

impl TaskType {
    /// All task types in presentation order.
    pub const ALL: [Self; 6] = [
        Self::Work,
        Self::Personal,
        Self::Shopping,
        Self::Health,
        Self::Education,
        Self::Other,
    ];

    /// Stored string form.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Work => "work",
            Self::Personal => "personal",
            Self::Shopping => "shopping",
            Self::Health => "health",
            Self::Education => "education",
            Self::Other => "other",
        }
    }

    /// Parses the stored string form, falling back to [`TaskType::Other`].
    #[must_use]
    pub fn from_stored(value: &str) -> Self {
        Self::ALL
            .into_iter()
            .find(|t| t.as_str() == value)
            .unwrap_or(Self::Other)
    }
}

impl std::fmt::Display for TaskType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle state of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum TaskStatus {
    /// Active, not yet acted on.
    #[default]
    Normal,
    /// Postponed; can be resumed.
    Snoozed,
    /// Will not be done.
    Cancelled,
    /// Completed.
    Done,
}

impl TaskStatus {
    /// Stored string form.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Normal => "normal",
            Self::Snoozed => "snoozed",
            Self::Cancelled => "cancelled",
            Self::Done => "done",
        }
    }

    /// Parses the stored string form, falling back to [`TaskStatus::Normal`].
    #[must_use]
    pub fn from_stored(value: &str) -> Self {
        match value {
            "snoozed" => Self::Snoozed,
            "cancelled" => Self::Cancelled,
            "done" => Self::Done,
            _ => Self::Normal,
        }
    }

    /// Whether the state is terminal from the user's point of view.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Cancelled | Self::Done)
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Day of the recurring week a task belongs to (Monday = 1 .. Sunday = 7).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Weekday {
    /// 1
    Monday = 1,
    /// 2
    Tuesday = 2,
    /// 3
    Wednesday = 3,
    /// 4
    Thursday = 4,
    /// 5
    Friday = 5,
    /// 6
    Saturday = 6,
    /// 7
    Sunday = 7,
}

impl Weekday {
    /// All weekdays, Monday first.
    pub const ALL: [Self; 7] = [
        Self::Monday,
        Self::Tuesday,
        Self::Wednesday,
        Self::Thursday,
        Self::Friday,
        Self::Saturday,
        Self::Sunday,
    ];

    /// Converts a 1-based day number.
    #[must_use]
    pub fn from_number(n: i64) -> Option<Self> {
        usize::try_from(n)
            .ok()
            .and_then(|n| n.checked_sub(1))
            .and_then(|idx| Self::ALL.get(idx).copied())
    }

    /// Returns the 1-based day number.
    #[must_use]
    pub const fn number(self) -> u8 {
        self as u8
    }
}

impl std::fmt::Display for Weekday {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Monday => "Monday",
            Self::Tuesday => "Tuesday",
            Self::Wednesday => "Wednesday",
            Self::Thursday => "Thursday",
            Self::Friday => "Friday",
            Self::Saturday => "Saturday",
            Self::Sunday => "Sunday",
        };
        f.write_str(name)
    }
}

/// Errors produced when parsing a [`ClockTime`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ClockTimeError {
    /// Not of the form `HH:MM`.
    #[error("expected HH:MM, got {0:?}")]
    Format(String),
    /// Hour or minute out of range.
    #[error("time out of range: {hour}:{minute}")]
    OutOfRange {
        /// Parsed hour.
        hour: u16,
        /// Parsed minute.
        minute: u16,
    },
}

/// A time of day at minute granularity, independent of any date.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ClockTime(u16);

impl ClockTime {
    /// Midnight.
    pub const MIDNIGHT: Self = Self(0);

    /// Creates a clock time from hour and minute.
    #[must_use]
    pub const fn new(hour: u8, minute: u8) -> Option<Self> {
        if hour < 24 && minute < 60 {
            Some(Self(hour as u16 * 60 + minute as u16))
        } else {
            None
        }
    }

    /// Creates a clock time from minutes since midnight.
    #[must_use]
    pub const fn from_minutes(minutes: u16) -> Option<Self> {
        if minutes < MINUTES_PER_DAY {
            Some(Self(minutes))
        } else {
            None
        }
    }

    /// Minutes since midnight.
    #[must_use]
    pub const fn minutes(self) -> u16 {
        self.0
    }

    /// Hour component.
    #[must_use]
    pub const fn hour(self) -> u8 {
        #[allow(clippy::cast_possible_truncation)]
        let hour = (self.0 / 60) as u8;
        hour
    }

    /// Minute component.
    #[must_use]
    pub const fn minute(self) -> u8 {
        #[allow(clippy::cast_possible_truncation)]
        let minute = (self.0 % 60) as u8;
        minute
    }
}

impl std::fmt::Display for ClockTime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:02}:{:02}", self.hour(), self.minute())
    }
}

impl std::str::FromStr for ClockTime {
    type Err = ClockTimeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let format_err = || ClockTimeError::Format(s.to_string());
        let (h, m) = s.trim().split_once(':').ok_or_else(format_err)?;
        let hour: u16 = h.parse().map_err(|_| format_err())?;
        let minute: u16 = m.parse().map_err(|_| format_err())?;
        if hour >= 24 || minute >= 60 {
            return Err(ClockTimeError::OutOfRange { hour, minute });
        }
        Ok(Self(hour * 60 + minute))
    }
}

/// A sub-item of a task, toggled independently of the task itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChecklistItem {
    /// Identifier, unique within the owning task.
    pub id: String,
    /// Item text.
    pub text: String,
    /// Whether the item is ticked.
    pub is_completed: bool,
}

impl ChecklistItem {
    /// Creates an unticked item with a fresh id.
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            text: text.into(),
            is_completed: false,
        }
    }
}

/// A recurring weekly task inside a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    /// Unique id, generated client-side.
    pub id: TaskId,
    /// Display title, non-empty.
    pub title: String,
    /// Category.
    pub task_type: TaskType,
    /// Creator and owner; immutable after creation.
    pub owner_id: String,
    /// Recurring day slot.
    pub weekday: Weekday,
    /// Optional start time.
    pub time: Option<ClockTime>,
    /// Optional end time; when present it is after `time`.
    pub end_time: Option<ClockTime>,
    /// Canonical lifecycle state.
    pub status: TaskStatus,
    /// Optional free text.
    pub description: Option<String>,
    /// Ordered sub-items; empty when the task has no checklist.
    pub checklist: Vec<ChecklistItem>,
    /// Creation time in ms since epoch; tie-break sort key.
    pub timestamp: i64,
}

impl Task {
    /// Creates a new `Normal` task with a fresh id and no time slot.
    pub fn new(
        title: impl Into<String>,
        task_type: TaskType,
        owner_id: impl Into<String>,
        weekday: Weekday,
        timestamp: i64,
    ) -> Self {
        Self {
            id: TaskId::new(),
            title: title.into(),
            task_type,
            owner_id: owner_id.into(),
            weekday,
            time: None,
            end_time: None,
            status: TaskStatus::Normal,
            description: None,
            checklist: Vec::new(),
            timestamp,
        }
    }

    /// Legacy completion flag, derived from [`Task::status`].
    #[must_use]
    pub fn is_completed(&self) -> bool {
        self.status == TaskStatus::Done
    }

    /// Start and exclusive end in minutes since midnight, or `None` for an
    /// untimed task. Without an explicit end the default duration applies,
    /// so the end may exceed [`MINUTES_PER_DAY`].
    #[must_use]
    pub fn effective_interval(&self) -> Option<(u16, u16)> {
        let start = self.time?.minutes();
        let end = self
            .end_time
            .map_or(start + DEFAULT_TASK_MINUTES, ClockTime::minutes);
        Some((start, end))
    }
}
