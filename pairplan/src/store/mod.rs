//! Document store abstraction for the `PairPlan` client.
//!
//! Defines the [`DocumentStore`] trait every store backend satisfies.
//! Concrete implementations:
//! - [`local::LocalStore`]: wraps an in-process [`MemoryStore`](pairplan_docstore::engine::MemoryStore)
//! - [`remote::RemoteStore`]: talks to a `pairplan-docstore` server over WebSocket
//!
//! [`run_transaction`] layers an optimistic read-modify-write on top of the
//! store's conditional commits.

pub mod local;
pub mod remote;

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use pairplan_proto::wire::{FieldFilter, Precondition, StoreFault, StoredDocument, Write};
use parking_lot::Mutex;
use tokio::sync::mpsc;

/// Errors that can occur during store operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    /// The store processed the request and refused it.
    #[error("store rejected request: {0}")]
    Rejected(StoreFault),

    /// The connection to the store could not be established or failed.
    #[error("store transport error: {0}")]
    Transport(String),

    /// No response arrived in time.
    #[error("store request timed out")]
    Timeout,

    /// The connection to the store has been closed.
    #[error("store connection closed")]
    Closed,

    /// A transaction kept losing to concurrent writers.
    #[error("transaction on {path} gave up after {attempts} attempts")]
    Contention {
        /// Document the transaction was guarding.
        path: String,
        /// Attempts made.
        attempts: u32,
    },

    /// The store answered with a response of the wrong kind.
    #[error("unexpected store response: {0}")]
    Protocol(String),
}

impl StoreError {
    /// Whether a precondition guard failed (the transaction should re-read).
    #[must_use]
    pub const fn is_precondition_failure(&self) -> bool {
        matches!(self, Self::Rejected(StoreFault::PreconditionFailed(_)))
    }

    /// Whether a conditional create hit an existing document.
    #[must_use]
    pub const fn is_already_exists(&self) -> bool {
        matches!(self, Self::Rejected(StoreFault::AlreadyExists(_)))
    }
}

impl From<StoreFault> for StoreError {
    fn from(fault: StoreFault) -> Self {
        Self::Rejected(fault)
    }
}

/// Async document store.
///
/// Paths follow the layout in [`pairplan_proto::path`]. Every method is a
/// suspension point; none of them block the caller's thread.
pub trait DocumentStore: Send + Sync {
    /// Reads one document.
    fn get(
        &self,
        path: &str,
    ) -> impl Future<Output = Result<Option<StoredDocument>, StoreError>> + Send;

    /// Applies writes atomically, returning the commit sequence number.
    fn commit(&self, writes: Vec<Write>) -> impl Future<Output = Result<u64, StoreError>> + Send;

    /// Lists the documents directly under a collection, ordered by id.
    fn list(
        &self,
        collection: &str,
        filter: Option<FieldFilter>,
    ) -> impl Future<Output = Result<Vec<StoredDocument>, StoreError>> + Send;

    /// Opens a live subscription delivering full collection snapshots.
    fn subscribe(
        &self,
        collection: &str,
    ) -> impl Future<Output = Result<SnapshotFeed, StoreError>> + Send;
}

impl<T: DocumentStore> DocumentStore for Arc<T> {
    fn get(
        &self,
        path: &str,
    ) -> impl Future<Output = Result<Option<StoredDocument>, StoreError>> + Send {
        (**self).get(path)
    }

    fn commit(&self, writes: Vec<Write>) -> impl Future<Output = Result<u64, StoreError>> + Send {
        (**self).commit(writes)
    }

    fn list(
        &self,
        collection: &str,
        filter: Option<FieldFilter>,
    ) -> impl Future<Output = Result<Vec<StoredDocument>, StoreError>> + Send {
        (**self).list(collection, filter)
    }

    fn subscribe(
        &self,
        collection: &str,
    ) -> impl Future<Output = Result<SnapshotFeed, StoreError>> + Send {
        (**self).subscribe(collection)
    }
}

type Canceller = Box<dyn FnOnce() + Send + Sync>;

/// Cloneable handle that cancels a [`SnapshotFeed`] from outside the task
/// consuming it.
#[derive(Clone)]
pub struct FeedHandle(Arc<Mutex<Option<Canceller>>>);

impl FeedHandle {
    /// Releases the store-side subscription. Safe to call more than once.
    pub fn cancel(&self) {
        let canceller = self.0.lock().take();
        if let Some(cancel) = canceller {
            cancel();
        }
    }

    /// Whether the feed has been cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.0.lock().is_none()
    }
}

/// A live collection subscription.
///
/// Yields full snapshots in commit order. [`SnapshotFeed::cancel`] releases
/// the store-side subscription; it is idempotent and also runs on drop.
pub struct SnapshotFeed {
    rx: mpsc::UnboundedReceiver<Vec<StoredDocument>>,
    handle: FeedHandle,
}

impl SnapshotFeed {
    /// Wraps a snapshot receiver with the action that releases it.
    pub fn new(
        rx: mpsc::UnboundedReceiver<Vec<StoredDocument>>,
        cancel: impl FnOnce() + Send + Sync + 'static,
    ) -> Self {
        let canceller: Canceller = Box::new(cancel);
        Self {
            rx,
            handle: FeedHandle(Arc::new(Mutex::new(Some(canceller)))),
        }
    }

    /// Waits for the next snapshot. Returns `None` once the feed is
    /// cancelled or the store side has gone away.
    pub async fn next(&mut self) -> Option<Vec<StoredDocument>> {
        if self.handle.is_cancelled() {
            return None;
        }
        self.rx.recv().await
    }

    /// A handle that can cancel this feed from elsewhere.
    #[must_use]
    pub fn handle(&self) -> FeedHandle {
        self.handle.clone()
    }

    /// Stops the subscription. Safe to call more than once.
    pub fn cancel(&mut self) {
        self.handle.cancel();
        self.rx.close();
    }

    /// Whether the feed has been cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.handle.is_cancelled()
    }
}

impl Drop for SnapshotFeed {
    fn drop(&mut self) {
        self.cancel();
    }
}

/// What a transaction body decided after looking at the current document.
#[derive(Debug)]
pub enum TxOutcome<T> {
    /// Commit these writes, then return `value`.
    Commit {
        /// Writes to apply. Those targeting the guarded path receive the
        /// read-version precondition unless they carry their own.
        writes: Vec<Write>,
        /// Result handed back to the caller after a successful commit.
        value: T,
    },
    /// Do not write anything; return this value.
    Abort(T),
}

/// Runs an optimistic read-modify-write transaction on one document.
///
/// Reads `path`, hands it to `body`, and commits the returned writes guarded
/// by the version that was read (or by absence, if the document did not
/// exist). If another writer got there first the whole cycle repeats, up to
/// `max_attempts` times.
///
/// # Errors
///
/// Propagates errors returned by `body`, store errors converted into `E`,
/// and [`StoreError::Contention`] once `max_attempts` is exhausted.
pub async fn run_transaction<S, T, E, F>(
    store: &S,
    path: &str,
    max_attempts: u32,
    mut body: F,
) -> Result<T, E>
where
    S: DocumentStore,
    F: FnMut(Option<&StoredDocument>) -> Result<TxOutcome<T>, E>,
    E: From<StoreError>,
{
    let attempts = max_attempts.max(1);
    for attempt in 1..=attempts {
        let current = store.get(path).await?;
        let (mut writes, value) = match body(current.as_ref())? {
            TxOutcome::Abort(value) => return Ok(value),
            TxOutcome::Commit { writes, value } => (writes, value),
        };

        let guard = current
            .as_ref()
            .map_or(Precondition::Exists(false), |doc| {
                Precondition::Version(doc.version)
            });
        for write in writes.iter_mut().filter(|w| w.path == path) {
            write.precondition.get_or_insert(guard);
        }

        match store.commit(writes).await {
            Ok(_) => return Ok(value),
            Err(e) if e.is_precondition_failure() => {
                tracing::debug!(path, attempt, "transaction lost a race, retrying");
                tokio::time::sleep(Duration::from_millis(5 * u64::from(attempt))).await;
            }
            Err(e) => return Err(e.into()),
        }
    }
    tracing::warn!(path, attempts, "transaction contention limit reached");
    Err(StoreError::Contention {
        path: path.to_string(),
        attempts,
    }
    .into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::local::LocalStore;
    use pairplan_proto::value::{Document, FieldValue};

    fn counter_doc(n: i64) -> Document {
        let mut d = Document::new();
        d.insert("n".into(), FieldValue::Integer(n));
        d
    }

    async fn increment(store: &LocalStore) -> Result<i64, StoreError> {
        run_transaction(store, "counters/c", 10, |doc| {
            let n = doc
                .and_then(|d| d.fields.get("n"))
                .and_then(FieldValue::as_integer)
                .unwrap_or(0);
            Ok::<_, StoreError>(TxOutcome::Commit {
                writes: vec![Write::set("counters/c", counter_doc(n + 1))],
                value: n + 1,
            })
        })
        .await
    }

    #[tokio::test]
    async fn transaction_creates_then_updates() {
        let store = LocalStore::new();
        assert_eq!(increment(&store).await.unwrap(), 1);
        assert_eq!(increment(&store).await.unwrap(), 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_transactions_do_not_lose_updates() {
        let store = LocalStore::new();
        let mut handles = Vec::new();
        for _ in 0..4 {
            let store = store.clone();
            handles.push(tokio::spawn(async move { increment(&store).await }));
        }
        for h in handles {
            h.await.unwrap().unwrap();
        }
        let doc = store.get("counters/c").await.unwrap().unwrap();
        assert_eq!(doc.fields["n"], FieldValue::Integer(4));
    }

    #[tokio::test]
    async fn abort_writes_nothing() {
        let store = LocalStore::new();
        let value = run_transaction(&store, "counters/c", 3, |_| {
            Ok::<_, StoreError>(TxOutcome::Abort("skipped"))
        })
        .await
        .unwrap();
        assert_eq!(value, "skipped");
        assert_eq!(store.get("counters/c").await.unwrap(), None);
    }

    #[tokio::test]
    async fn exhausted_attempts_report_contention() {
        let store = LocalStore::new();
        store
            .commit(vec![Write::set("counters/c", counter_doc(0))])
            .await
            .unwrap();
        let interloper = store.clone();
        let result: Result<(), StoreError> = run_transaction(&store, "counters/c", 2, |_| {
            // Every attempt is overtaken by a direct write.
            interloper
                .engine()
                .commit(vec![Write::set("counters/c", counter_doc(99))])
                .map_err(StoreError::Rejected)?;
            Ok(TxOutcome::Commit {
                writes: vec![Write::set("counters/c", counter_doc(1))],
                value: (),
            })
        })
        .await;
        assert_eq!(
            result,
            Err(StoreError::Contention {
                path: "counters/c".into(),
                attempts: 2
            })
        );
    }

    #[test]
    fn feed_cancel_is_idempotent() {
        let (tx, rx) = mpsc::unbounded_channel();
        let calls = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let counted = Arc::clone(&calls);
        let mut feed = SnapshotFeed::new(rx, move || {
            counted.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        });
        let handle = feed.handle();
        handle.cancel();
        feed.cancel();
        assert!(feed.is_cancelled());
        drop(feed);
        assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 1);
        assert!(tx.send(Vec::new()).is_err());
    }
}
