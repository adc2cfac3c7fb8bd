//! Task persistence and live observation for one session.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use pairplan_proto::mapping;
use pairplan_proto::path;
use pairplan_proto::session::SessionCode;
use pairplan_proto::task::{Task, TaskId};
use pairplan_proto::wire::{Precondition, StoredDocument, Write};
use tokio::task::JoinHandle;

use crate::store::{DocumentStore, FeedHandle, StoreError};

/// Decodes task documents, dropping any that fail validation, and returns
/// them in display order.
#[must_use]
pub fn decode_tasks(docs: &[StoredDocument]) -> Vec<Task> {
    let mut tasks: Vec<Task> = docs
        .iter()
        .filter_map(|doc| match mapping::task_from_document(&doc.fields) {
            Ok(task) => Some(task),
            Err(e) => {
                tracing::debug!(path = %doc.path, error = %e, "dropping malformed task document");
                None
            }
        })
        .collect();
    super::sort_tasks(&mut tasks);
    tasks
}

/// Handle to a running task observer.
///
/// [`TaskSubscription::cancel`] stops further callbacks and releases the
/// store subscription; dropping the handle does the same.
pub struct TaskSubscription {
    task: JoinHandle<()>,
    feed: FeedHandle,
    active: Arc<AtomicBool>,
}

impl TaskSubscription {
    /// Stops the observer. Idempotent.
    pub fn cancel(&self) {
        if self.active.swap(false, Ordering::AcqRel) {
            tracing::debug!("task subscription cancelled");
        }
        self.feed.cancel();
        self.task.abort();
    }

    /// Whether callbacks may still arrive.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire) && !self.task.is_finished()
    }
}

impl Drop for TaskSubscription {
    fn drop(&mut self) {
        self.cancel();
    }
}

/// Reads and writes the task documents of sessions.
#[derive(Clone)]
pub struct TaskStore<S> {
    store: S,
}

impl<S: DocumentStore> TaskStore<S> {
    /// Wraps a document store.
    pub const fn new(store: S) -> Self {
        Self { store }
    }

    /// Creates or fully replaces a task, keyed by its id. The write only
    /// applies while the session root exists.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] if the write fails; a precondition failure
    /// means the session is gone.
    pub async fn upsert_task(&self, code: &SessionCode, task: &Task) -> Result<(), StoreError> {
        let writes = vec![
            Write::verify(path::session(code), Precondition::Exists(true)),
            Write::set(
                path::task(code, task.id.as_str()),
                mapping::task_to_document(task),
            ),
        ];
        self.store.commit(writes).await?;
        tracing::debug!(code = %code, task_id = %task.id, "task written");
        Ok(())
    }

    /// Deletes a task. Deleting an absent task succeeds.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] if the write fails.
    pub async fn delete_task(&self, code: &SessionCode, task_id: &TaskId) -> Result<(), StoreError> {
        self.store
            .commit(vec![Write::delete(path::task(code, task_id.as_str()))])
            .await?;
        tracing::debug!(code = %code, task_id = %task_id, "task deleted");
        Ok(())
    }

    /// One-shot read of a session's tasks in display order.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] if the query fails.
    pub async fn load_tasks(&self, code: &SessionCode) -> Result<Vec<Task>, StoreError> {
        let docs = self.store.list(&path::tasks(code), None).await?;
        Ok(decode_tasks(&docs))
    }

    /// Calls `on_update` with the full task list now and after every change.
    ///
    /// The callback runs on a spawned task, one invocation at a time, in
    /// the store's commit order. If the feed ends without being cancelled,
    /// for example because the connection dropped, `on_closed` runs once.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] if the subscription cannot be opened.
    pub async fn observe_tasks<F, C>(
        &self,
        code: &SessionCode,
        mut on_update: F,
        on_closed: C,
    ) -> Result<TaskSubscription, StoreError>
    where
        F: FnMut(Vec<Task>) + Send + 'static,
        C: FnOnce() + Send + 'static,
    {
        let mut feed = self.store.subscribe(&path::tasks(code)).await?;
        let feed_handle = feed.handle();
        let active = Arc::new(AtomicBool::new(true));
        let running = Arc::clone(&active);
        let code = code.clone();

        let task = tokio::spawn(async move {
            while let Some(docs) = feed.next().await {
                if !running.load(Ordering::Acquire) {
                    break;
                }
                on_update(decode_tasks(&docs));
            }
            if running.swap(false, Ordering::AcqRel) {
                tracing::warn!(code = %code, "task feed ended unexpectedly");
                on_closed();
            } else {
                tracing::debug!(code = %code, "task observer stopped");
            }
        });
        tracing::info!("task observer started");

        Ok(TaskSubscription {
            task,
            feed: feed_handle,
            active,
        })
    }
}
