//! Session view model: the client-side owner of one joined session.
//!
//! Orchestrates the registry, the task store and the scheduling rules for
//! the local user. While a session is joined it keeps a live, converged
//! task list fed by the store's change feed. Local edits are applied
//! optimistically and rolled back per task if the write fails.
//!
//! Every component error is translated here into a [`SessionError`];
//! [`SessionError::user_message`] is the only place user-facing text is
//! produced.

use std::sync::Arc;
use std::time::Duration;

use pairplan_proto::session::{CodeError, Session, SessionCode, SessionMode};
use pairplan_proto::task::{ClockTime, Task, TaskId, TaskStatus, TaskType, Weekday};
use parking_lot::RwLock;
use tokio::sync::mpsc;

use crate::identity::{AuthError, LocalIdentity};
use crate::notify::{
    DEFAULT_SNOOZE_MINUTES, FireSpec, NotificationScheduler, snooze_reminder_id,
    weekly_reminder_id,
};
use crate::recent::RecentSessions;
use crate::registry::{CodeGenerator, JoinOutcome, RegistryError, RegistryOptions, SessionRegistry};
use crate::store::{DocumentStore, StoreError};
use crate::tasks::{
    NotificationAction, StatusAction, StatusError, TaskError, TaskStore, TaskSubscription,
    checklist, compare_tasks, conflict, status, validate_task,
};

/// Buffer size of the view-model event channel.
pub const EVENT_BUFFER: usize = 256;

/// Errors surfaced by the view model, grouped by how the user should react.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    /// Input rejected locally before any network call.
    #[error("validation failed: {0}")]
    Validation(String),

    /// The individual session already has two participants.
    #[error("session {0} is full")]
    Capacity(SessionCode),

    /// No session exists under this code.
    #[error("session {0} not found")]
    NotFound(SessionCode),

    /// The task's time overlaps another task on the same day.
    #[error("time slot {time} on {weekday} is taken")]
    Conflict {
        /// Day of the rejected task.
        weekday: Weekday,
        /// Start time of the rejected task.
        time: ClockTime,
    },

    /// The user may not perform this action.
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// The operation needs a joined session.
    #[error("no session joined")]
    NotJoined,

    /// The document store could not complete the request.
    #[error("transport error: {0}")]
    Transport(String),

    /// Account sign-in failed.
    #[error(transparent)]
    Auth(#[from] AuthError),
}

impl SessionError {
    /// Text suitable for showing to the user.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::Validation(reason) | Self::Forbidden(reason) => reason.clone(),
            Self::Capacity(_) => {
                "This session is full. Individual sessions allow two participants.".to_string()
            }
            Self::NotFound(code) => format!("Session {code} does not exist."),
            Self::Conflict { weekday, time } => {
                format!("{time} on {weekday} overlaps another task. Pick a different time.")
            }
            Self::NotJoined => "Join or create a session first.".to_string(),
            Self::Transport(reason) => {
                format!("Could not reach the planner service: {reason}")
            }
            Self::Auth(AuthError::InvalidCredentials) => "Wrong email or password.".to_string(),
            Self::Auth(other) => format!("Sign-in failed: {other}"),
        }
    }
}

impl From<StoreError> for SessionError {
    fn from(e: StoreError) -> Self {
        Self::Transport(e.to_string())
    }
}

impl From<CodeError> for SessionError {
    fn from(e: CodeError) -> Self {
        Self::Validation(e.to_string())
    }
}

impl From<TaskError> for SessionError {
    fn from(e: TaskError) -> Self {
        Self::Validation(e.to_string())
    }
}

impl From<StatusError> for SessionError {
    fn from(e: StatusError) -> Self {
        match e {
            StatusError::NotOwner { .. } => {
                Self::Forbidden("Only the task's owner can change it in this session.".into())
            }
            StatusError::InvalidTransition { .. } => Self::Validation(e.to_string()),
        }
    }
}

impl From<RegistryError> for SessionError {
    fn from(e: RegistryError) -> Self {
        match e {
            RegistryError::InvalidCode(code) => code.into(),
            RegistryError::NotFound(code) => Self::NotFound(code),
            RegistryError::NotOwner(code) => {
                Self::Forbidden(format!("Only the owner can delete session {code}."))
            }
            RegistryError::Store(store) => store.into(),
            other @ (RegistryError::CodeSpaceExhausted(_) | RegistryError::Malformed(_)) => {
                Self::Transport(other.to_string())
            }
        }
    }
}

/// Events emitted by the [`SessionViewModel`] for the UI layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// A session was entered.
    Joined {
        /// Session code.
        code: SessionCode,
        /// Session mode.
        mode: SessionMode,
    },
    /// The current session was left.
    Left {
        /// Session code.
        code: SessionCode,
    },
    /// A session was deleted by its owner.
    Deleted {
        /// Session code.
        code: SessionCode,
    },
    /// The converged task list changed.
    TasksUpdated(Vec<Task>),
    /// The live task feed of the current session ended without being
    /// cancelled; the task list no longer updates.
    FeedLost {
        /// Session code.
        code: SessionCode,
    },
    /// An optimistic change was undone because the write failed.
    RolledBack {
        /// Task concerned.
        task_id: TaskId,
        /// Why the write failed.
        reason: String,
    },
}

/// View-model tunables.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionOptions {
    /// Registry settings.
    pub registry: RegistryOptions,
    /// Delay before a snoozed task reminds again.
    pub snooze: Duration,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            registry: RegistryOptions::default(),
            snooze: Duration::from_secs(DEFAULT_SNOOZE_MINUTES * 60),
        }
    }
}

/// Fields of a task to be created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskDraft {
    /// Title.
    pub title: String,
    /// Category.
    pub task_type: TaskType,
    /// Day of week.
    pub weekday: Weekday,
    /// Optional start.
    pub time: Option<ClockTime>,
    /// Optional end.
    pub end_time: Option<ClockTime>,
    /// Optional free text.
    pub description: Option<String>,
}

impl TaskDraft {
    /// An untimed task of type `Other`.
    pub fn new(title: impl Into<String>, weekday: Weekday) -> Self {
        Self {
            title: title.into(),
            task_type: TaskType::Other,
            weekday,
            time: None,
            end_time: None,
            description: None,
        }
    }

    /// Sets the start time.
    #[must_use]
    pub const fn at(mut self, time: ClockTime) -> Self {
        self.time = Some(time);
        self
    }

    /// Sets the end time.
    #[must_use]
    pub const fn until(mut self, end: ClockTime) -> Self {
        self.end_time = Some(end);
        self
    }

    /// Sets the category.
    #[must_use]
    pub const fn with_type(mut self, task_type: TaskType) -> Self {
        self.task_type = task_type;
        self
    }

    /// Sets the description.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// Who may perform a task mutation.
#[derive(Clone, Copy)]
enum Guard {
    /// Only the task's creator.
    Creator,
    /// Anyone in a shared session, the owner in an individual one.
    Participant,
}

struct Joined {
    code: SessionCode,
    mode: SessionMode,
    _subscription: TaskSubscription,
}

/// Client-side state of the local user's planner.
pub struct SessionViewModel<S> {
    registry: SessionRegistry<S>,
    task_store: TaskStore<S>,
    identity: LocalIdentity,
    recent: RecentSessions,
    scheduler: Arc<dyn NotificationScheduler>,
    options: SessionOptions,
    joined: Option<Joined>,
    tasks: Arc<RwLock<Vec<Task>>>,
    owned: Vec<Session>,
    events: mpsc::Sender<SessionEvent>,
}

fn normalize_description(description: Option<String>) -> Option<String> {
    description
        .map(|d| d.trim().to_string())
        .filter(|d| !d.is_empty())
}

fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

impl<S: DocumentStore + Clone> SessionViewModel<S> {
    /// Creates a view model for `identity`, returning it with its event
    /// receiver.
    pub fn new(
        store: S,
        identity: LocalIdentity,
        recent: RecentSessions,
        scheduler: Arc<dyn NotificationScheduler>,
        options: SessionOptions,
    ) -> (Self, mpsc::Receiver<SessionEvent>) {
        let (events, rx) = mpsc::channel(EVENT_BUFFER);
        let vm = Self {
            registry: SessionRegistry::new(store.clone(), options.registry),
            task_store: TaskStore::new(store),
            identity,
            recent,
            scheduler,
            options,
            joined: None,
            tasks: Arc::default(),
            owned: Vec::new(),
            events,
        };
        (vm, rx)
    }

    /// Replaces the session code generator.
    #[must_use]
    pub fn with_code_generator(mut self, generate_code: CodeGenerator) -> Self {
        self.registry = self.registry.with_code_generator(generate_code);
        self
    }

    /// The local user id.
    #[must_use]
    pub fn user_id(&self) -> &str {
        self.identity.user_id()
    }

    /// Code of the joined session.
    #[must_use]
    pub fn current_code(&self) -> Option<&SessionCode> {
        self.joined.as_ref().map(|j| &j.code)
    }

    /// Mode of the joined session.
    #[must_use]
    pub fn current_mode(&self) -> Option<SessionMode> {
        self.joined.as_ref().map(|j| j.mode)
    }

    /// Snapshot of the converged task list, in display order.
    #[must_use]
    pub fn tasks(&self) -> Vec<Task> {
        self.tasks.read().clone()
    }

    /// Tasks of one weekday, in display order.
    #[must_use]
    pub fn tasks_for(&self, weekday: Weekday) -> Vec<Task> {
        self.tasks
            .read()
            .iter()
            .filter(|t| t.weekday == weekday)
            .cloned()
            .collect()
    }

    /// Free time slots of one weekday.
    #[must_use]
    pub fn free_slots(&self, weekday: Weekday) -> Vec<(ClockTime, ClockTime)> {
        let tasks = self.tasks.read();
        conflict::free_slots(tasks.iter().filter(|t| t.weekday == weekday))
    }

    /// Recently used session codes, most recent first.
    #[must_use]
    pub fn recent_sessions(&self) -> &[SessionCode] {
        self.recent.codes()
    }

    /// Forgets all recently used codes.
    pub fn clear_recent_sessions(&mut self) {
        if let Err(e) = self.recent.clear() {
            tracing::warn!(error = %e, "failed to persist recent sessions");
        }
    }

    /// Sessions created by the local user, as of the last
    /// [`SessionViewModel::load_my_sessions`].
    #[must_use]
    pub fn owned_sessions(&self) -> &[Session] {
        &self.owned
    }

    // -----------------------------------------------------------------------
    // Session lifecycle
    // -----------------------------------------------------------------------

    /// Creates a session, joins it and makes it current.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Transport`] if the store fails or no free
    /// code was found.
    pub async fn create_session(&mut self, mode: SessionMode) -> Result<SessionCode, SessionError> {
        let session = self.registry.create_session(mode, self.user_id()).await?;
        let code = session.code.clone();
        if self.registry.add_participant(&code, self.user_id()).await? == JoinOutcome::Full {
            return Err(SessionError::Capacity(code));
        }
        self.owned.retain(|s| s.code != code);
        self.owned.push(session);
        self.enter(code.clone(), mode).await?;
        Ok(code)
    }

    /// Joins an existing session by user-entered code.
    ///
    /// # Errors
    ///
    /// - [`SessionError::Validation`] for an empty or malformed code.
    /// - [`SessionError::NotFound`] if no such session exists.
    /// - [`SessionError::Capacity`] if the session is full.
    /// - [`SessionError::Transport`] on store failure.
    pub async fn join_session(&mut self, input: &str) -> Result<SessionCode, SessionError> {
        let input = input.trim();
        if input.is_empty() {
            return Err(SessionError::Validation("Enter a session code.".into()));
        }
        let code = SessionCode::parse(input)?;
        if !self.registry.session_exists(&code).await? {
            return Err(SessionError::NotFound(code));
        }
        let mode = self.registry.load_mode(&code).await?;
        match self.registry.add_participant(&code, self.user_id()).await? {
            JoinOutcome::Full => {
                tracing::info!(code = %code, user_id = self.user_id(), "join refused: full");
                Err(SessionError::Capacity(code))
            }
            JoinOutcome::Joined | JoinOutcome::AlreadyMember => {
                self.enter(code.clone(), mode).await?;
                Ok(code)
            }
        }
    }

    /// Re-enters a session the user already participates in, without
    /// touching membership.
    ///
    /// # Errors
    ///
    /// [`SessionError::Forbidden`] if the user is not a participant, plus the
    /// errors of [`SessionViewModel::join_session`].
    pub async fn open_session(&mut self, input: &str) -> Result<SessionCode, SessionError> {
        let code = SessionCode::parse(input)?;
        let session = self.registry.load_session(&code).await?;
        if !session.is_participant(self.user_id()) {
            return Err(SessionError::Forbidden(format!(
                "You are not a participant of session {code}."
            )));
        }
        self.enter(code.clone(), session.mode).await?;
        Ok(code)
    }

    /// Leaves the current session. Local state is reset even when the
    /// remote removal fails; that failure is still returned.
    ///
    /// # Errors
    ///
    /// [`SessionError::NotJoined`] without a current session, or the
    /// registry's error.
    pub async fn leave_session(&mut self) -> Result<(), SessionError> {
        let Some(joined) = self.joined.take() else {
            return Err(SessionError::NotJoined);
        };
        let result = self
            .registry
            .remove_participant(&joined.code, self.user_id())
            .await;
        let code = joined.code.clone();
        drop(joined);
        self.cancel_reminders();
        self.tasks = Arc::default();
        self.emit(SessionEvent::Left { code: code.clone() });
        if let Err(e) = &result {
            tracing::warn!(code = %code, error = %e, "remote leave failed; local state reset");
        }
        result.map_err(Into::into)
    }

    /// Refreshes and returns the sessions created by the local user.
    ///
    /// # Errors
    ///
    /// [`SessionError::Transport`] on store failure.
    pub async fn load_my_sessions(&mut self) -> Result<&[Session], SessionError> {
        self.owned = self
            .registry
            .list_sessions_owned_by(self.identity.user_id())
            .await?;
        Ok(&self.owned)
    }

    /// Deletes a session the local user owns, including all its tasks.
    ///
    /// # Errors
    ///
    /// [`SessionError::Forbidden`] for a session owned by someone else,
    /// [`SessionError::NotFound`], or [`SessionError::Transport`].
    pub async fn delete_session(&mut self, input: &str) -> Result<(), SessionError> {
        let code = SessionCode::parse(input)?;
        self.registry.delete_session(&code, self.user_id()).await?;

        if let Err(e) = self.recent.remove(&code) {
            tracing::warn!(error = %e, "failed to persist recent sessions");
        }
        self.owned.retain(|s| s.code != code);
        if self.current_code() == Some(&code) {
            self.cancel_reminders();
            self.joined = None;
            self.tasks = Arc::default();
        }
        self.emit(SessionEvent::Deleted { code });
        Ok(())
    }

    async fn enter(&mut self, code: SessionCode, mode: SessionMode) -> Result<(), SessionError> {
        self.joined = None;
        self.tasks = Arc::default();
        let initial = self.task_store.load_tasks(&code).await?;
        let tasks = Arc::new(RwLock::new(initial));

        let sink = Arc::clone(&tasks);
        let events = self.events.clone();
        let lost_events = self.events.clone();
        let lost_code = code.clone();
        let subscription = self
            .task_store
            .observe_tasks(
                &code,
                move |list| {
                    (*sink.write()).clone_from(&list);
                    let _ = events.try_send(SessionEvent::TasksUpdated(list));
                },
                move || {
                    let _ = lost_events.try_send(SessionEvent::FeedLost { code: lost_code });
                },
            )
            .await?;

        self.tasks = tasks;
        self.joined = Some(Joined {
            code: code.clone(),
            mode,
            _subscription: subscription,
        });
        if let Err(e) = self.recent.record(&code) {
            tracing::warn!(error = %e, "failed to persist recent sessions");
        }
        tracing::info!(code = %code, mode = %mode, user_id = self.user_id(), "entered session");
        self.emit(SessionEvent::Joined { code, mode });
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Tasks
    // -----------------------------------------------------------------------

    /// Adds a task to the current session.
    ///
    /// # Errors
    ///
    /// [`SessionError::Validation`] for bad fields, [`SessionError::Conflict`]
    /// if the time slot is taken, [`SessionError::Transport`] if the write
    /// fails (the local list is rolled back).
    pub async fn add_task(&self, draft: TaskDraft) -> Result<Task, SessionError> {
        let (code, _) = self.current()?;
        let mut task = Task::new(
            draft.title.trim(),
            draft.task_type,
            self.user_id(),
            draft.weekday,
            now_ms(),
        );
        task.time = draft.time;
        task.end_time = draft.end_time;
        task.description = normalize_description(draft.description);

        validate_task(&task)?;
        self.ensure_slot(&task)?;
        self.write_task(&code, task.clone()).await?;
        self.schedule_weekly(&task);
        tracing::info!(code = %code, task_id = %task.id, "task added");
        Ok(task)
    }

    /// Replaces a task's editable fields. Only its creator may edit it; id,
    /// owner, creation time, status and checklist are kept. Status changes
    /// go through [`SessionViewModel::apply_status`].
    ///
    /// # Errors
    ///
    /// As [`SessionViewModel::add_task`], plus [`SessionError::Forbidden`].
    pub async fn edit_task(&self, updated: Task) -> Result<(), SessionError> {
        let (code, mode) = self.current()?;
        let existing = self.find_task(&updated.id)?;
        self.check_guard(Guard::Creator, mode, &existing)?;

        let mut task = updated;
        task.id = existing.id;
        task.owner_id = existing.owner_id;
        task.timestamp = existing.timestamp;
        task.status = existing.status;
        task.checklist = existing.checklist;
        task.title = task.title.trim().to_string();
        task.description = normalize_description(task.description.take());
        validate_task(&task)?;
        self.ensure_slot(&task)?;
        self.write_task(&code, task.clone()).await?;
        self.schedule_weekly(&task);
        Ok(())
    }

    /// Deletes a task. Only its creator may delete it.
    ///
    /// # Errors
    ///
    /// [`SessionError::Forbidden`], [`SessionError::Validation`] for an
    /// unknown task, or [`SessionError::Transport`].
    pub async fn delete_task(&self, task_id: &TaskId) -> Result<(), SessionError> {
        let (code, mode) = self.current()?;
        let existing = self.find_task(task_id)?;
        self.check_guard(Guard::Creator, mode, &existing)?;

        self.remove_local(task_id);
        self.notify_tasks();
        if let Err(e) = self.task_store.delete_task(&code, task_id).await {
            self.rollback(task_id, Some(existing), &e);
            return Err(e.into());
        }
        self.scheduler.cancel(&weekly_reminder_id(&existing));
        self.scheduler.cancel(&snooze_reminder_id(&existing));
        tracing::info!(code = %code, task_id = %task_id, "task deleted");
        Ok(())
    }

    /// Applies a status action to a task.
    ///
    /// # Errors
    ///
    /// [`SessionError::Forbidden`] when the ownership guard refuses,
    /// [`SessionError::Validation`] for a disallowed transition or unknown
    /// task, [`SessionError::Transport`] if the write fails.
    pub async fn apply_status(
        &self,
        task_id: &TaskId,
        action: StatusAction,
    ) -> Result<TaskStatus, SessionError> {
        let (code, mode) = self.current()?;
        let mut task = self.find_task(task_id)?;
        let next = status::apply(&mut task, mode, self.user_id(), action)?;
        self.write_task(&code, task.clone()).await?;

        let snooze_id = snooze_reminder_id(&task);
        if next == TaskStatus::Snoozed {
            self.scheduler.schedule(
                &snooze_id,
                FireSpec::After(self.options.snooze),
                &task.title,
                "Snoozed task",
            );
        } else {
            self.scheduler.cancel(&snooze_id);
        }
        tracing::info!(code = %code, task_id = %task_id, status = %next, "status changed");
        Ok(next)
    }

    /// Handles a button pressed on a task reminder.
    ///
    /// # Errors
    ///
    /// As [`SessionViewModel::apply_status`].
    pub async fn handle_notification_action(
        &self,
        task_id: &TaskId,
        action: NotificationAction,
    ) -> Result<TaskStatus, SessionError> {
        self.apply_status(task_id, action.into()).await
    }

    /// Adds a checklist item; creator only. Returns the item id.
    ///
    /// # Errors
    ///
    /// [`SessionError::Forbidden`], [`SessionError::Validation`] or
    /// [`SessionError::Transport`].
    pub async fn add_checklist_item(
        &self,
        task_id: &TaskId,
        text: &str,
    ) -> Result<String, SessionError> {
        self.mutate_task(task_id, Guard::Creator, |task| {
            checklist::add_item(task, text)
        })
        .await
    }

    /// Ticks or unticks a checklist item; allowed to whoever may change the
    /// task's status. Returns the new value.
    ///
    /// # Errors
    ///
    /// [`SessionError::Forbidden`], [`SessionError::Validation`] or
    /// [`SessionError::Transport`].
    pub async fn toggle_checklist_item(
        &self,
        task_id: &TaskId,
        item_id: &str,
    ) -> Result<bool, SessionError> {
        self.mutate_task(task_id, Guard::Participant, |task| {
            checklist::toggle_item(task, item_id)
        })
        .await
    }

    /// Removes a checklist item; creator only.
    ///
    /// # Errors
    ///
    /// [`SessionError::Forbidden`], [`SessionError::Validation`] or
    /// [`SessionError::Transport`].
    pub async fn remove_checklist_item(
        &self,
        task_id: &TaskId,
        item_id: &str,
    ) -> Result<(), SessionError> {
        self.mutate_task(task_id, Guard::Creator, |task| {
            checklist::remove_item(task, item_id).map(|_| ())
        })
        .await
    }

    /// Renames a checklist item; creator only.
    ///
    /// # Errors
    ///
    /// [`SessionError::Forbidden`], [`SessionError::Validation`] or
    /// [`SessionError::Transport`].
    pub async fn rename_checklist_item(
        &self,
        task_id: &TaskId,
        item_id: &str,
        text: &str,
    ) -> Result<(), SessionError> {
        self.mutate_task(task_id, Guard::Creator, |task| {
            checklist::rename_item(task, item_id, text)
        })
        .await
    }

    // -----------------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------------

    fn current(&self) -> Result<(SessionCode, SessionMode), SessionError> {
        self.joined
            .as_ref()
            .map(|j| (j.code.clone(), j.mode))
            .ok_or(SessionError::NotJoined)
    }

    fn find_task(&self, task_id: &TaskId) -> Result<Task, SessionError> {
        self.tasks
            .read()
            .iter()
            .find(|t| &t.id == task_id)
            .cloned()
            .ok_or_else(|| TaskError::TaskNotFound(task_id.to_string()).into())
    }

    fn check_guard(&self, guard: Guard, mode: SessionMode, task: &Task) -> Result<(), SessionError> {
        let allowed = match guard {
            Guard::Creator => task.owner_id == self.user_id(),
            Guard::Participant => status::may_act(mode, task, self.user_id()),
        };
        if allowed {
            Ok(())
        } else {
            tracing::debug!(task_id = %task.id, user_id = self.user_id(), "task change refused");
            Err(SessionError::Forbidden(
                "You can only change your own tasks here.".into(),
            ))
        }
    }

    fn ensure_slot(&self, task: &Task) -> Result<(), SessionError> {
        let Some(time) = task.time else {
            return Ok(());
        };
        if conflict::slot_available_for(task, &self.tasks.read()) {
            Ok(())
        } else {
            Err(SessionError::Conflict {
                weekday: task.weekday,
                time,
            })
        }
    }

    async fn mutate_task<R>(
        &self,
        task_id: &TaskId,
        guard: Guard,
        change: impl FnOnce(&mut Task) -> Result<R, TaskError>,
    ) -> Result<R, SessionError> {
        let (code, mode) = self.current()?;
        let mut task = self.find_task(task_id)?;
        self.check_guard(guard, mode, &task)?;
        let result = change(&mut task)?;
        validate_task(&task)?;
        self.write_task(&code, task).await?;
        Ok(result)
    }

    /// Optimistically applies `task` locally, then writes it; on failure
    /// the previous local version is restored. A write refused because the
    /// session root is gone reports [`SessionError::NotFound`].
    async fn write_task(&self, code: &SessionCode, task: Task) -> Result<(), SessionError> {
        let previous = self.replace_local(task.clone());
        self.notify_tasks();
        if let Err(e) = self.task_store.upsert_task(code, &task).await {
            self.rollback(&task.id, previous, &e);
            if e.is_precondition_failure() {
                tracing::warn!(code = %code, task_id = %task.id, "task write refused: session deleted");
                return Err(SessionError::NotFound(code.clone()));
            }
            return Err(e.into());
        }
        Ok(())
    }

    fn replace_local(&self, task: Task) -> Option<Task> {
        let mut tasks = self.tasks.write();
        let previous = match tasks.iter_mut().find(|t| t.id == task.id) {
            Some(slot) => Some(std::mem::replace(slot, task)),
            None => {
                tasks.push(task);
                None
            }
        };
        tasks.sort_by(compare_tasks);
        previous
    }

    fn remove_local(&self, task_id: &TaskId) -> Option<Task> {
        let mut tasks = self.tasks.write();
        let idx = tasks.iter().position(|t| &t.id == task_id)?;
        Some(tasks.remove(idx))
    }

    fn rollback(&self, task_id: &TaskId, previous: Option<Task>, cause: &StoreError) {
        match previous {
            Some(prev) => {
                self.replace_local(prev);
            }
            None => {
                self.remove_local(task_id);
            }
        }
        tracing::warn!(task_id = %task_id, error = %cause, "write failed, local change rolled back");
        self.emit(SessionEvent::RolledBack {
            task_id: task_id.clone(),
            reason: cause.to_string(),
        });
        self.notify_tasks();
    }

    fn cancel_reminders(&self) {
        for task in self.tasks.read().iter() {
            self.scheduler.cancel(&weekly_reminder_id(task));
            self.scheduler.cancel(&snooze_reminder_id(task));
        }
    }

    fn schedule_weekly(&self, task: &Task) {
        let id = weekly_reminder_id(task);
        match task.time {
            Some(time) => {
                let body = task.description.as_deref().unwrap_or("Scheduled task");
                self.scheduler.schedule(
                    &id,
                    FireSpec::Weekly {
                        weekday: task.weekday,
                        time,
                    },
                    &task.title,
                    body,
                );
            }
            None => self.scheduler.cancel(&id),
        }
    }

    fn notify_tasks(&self) {
        self.emit(SessionEvent::TasksUpdated(self.tasks()));
    }

    fn emit(&self, event: SessionEvent) {
        let _ = self.events.try_send(event);
    }
}
