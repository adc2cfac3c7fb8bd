//! In-memory document engine.
//!
//! The [`MemoryStore`] keeps every document in a single ordered map keyed by
//! path. All mutation goes through [`MemoryStore::commit`], which validates
//! the whole batch (paths, preconditions, size) before applying any write,
//! stamps every written document with the new commit sequence number and
//! then pushes a full snapshot to each subscriber of a touched collection.
//!
//! The lock is held for the whole commit including snapshot fan-out, so
//! subscribers observe snapshots in commit order.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use pairplan_proto::path;
use pairplan_proto::value::{self, Document};
use pairplan_proto::wire::{FieldFilter, Precondition, StoreFault, StoredDocument, Write, WriteOp};
use parking_lot::Mutex;
use tokio::sync::mpsc;

/// Default maximum number of writes in one commit.
pub const DEFAULT_MAX_BATCH_WRITES: usize = 500;

/// Receiving half of a collection subscription.
pub type SnapshotReceiver = mpsc::UnboundedReceiver<Vec<StoredDocument>>;

struct Entry {
    version: u64,
    fields: Document,
}

struct Subscriber {
    collection: String,
    tx: mpsc::UnboundedSender<Vec<StoredDocument>>,
}

#[derive(Default)]
struct Inner {
    docs: BTreeMap<String, Entry>,
    sequence: u64,
    next_subscription: u64,
    subscribers: HashMap<u64, Subscriber>,
}

impl Inner {
    fn collection_snapshot(&self, collection: &str, filter: Option<&FieldFilter>) -> Vec<StoredDocument> {
        let prefix = format!("{collection}/");
        self.docs
            .range(prefix.clone()..)
            .take_while(|(p, _)| p.starts_with(&prefix))
            .filter_map(|(p, entry)| {
                let id = &p[prefix.len()..];
                if id.contains('/') {
                    return None;
                }
                if let Some(f) = filter
                    && entry.fields.get(&f.field) != Some(&f.value)
                {
                    return None;
                }
                Some(StoredDocument {
                    path: p.clone(),
                    id: id.to_string(),
                    version: entry.version,
                    fields: entry.fields.clone(),
                })
            })
            .collect()
    }

    fn check(&self, write: &Write) -> Result<(), StoreFault> {
        if !path::is_document(&write.path) {
            return Err(StoreFault::InvalidPath(write.path.clone()));
        }
        let current = self.docs.get(&write.path);
        if matches!(write.op, WriteOp::Create(_)) && current.is_some() {
            return Err(StoreFault::AlreadyExists(write.path.clone()));
        }
        let holds = match write.precondition {
            None => true,
            Some(Precondition::Exists(expected)) => current.is_some() == expected,
            Some(Precondition::Version(v)) => current.is_some_and(|e| e.version == v),
        };
        if holds {
            Ok(())
        } else {
            Err(StoreFault::PreconditionFailed(write.path.clone()))
        }
    }
}

/// Thread-safe in-memory document store.
pub struct MemoryStore {
    inner: Mutex<Inner>,
    max_batch_writes: usize,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    /// Creates an empty store with the default batch limit.
    #[must_use]
    pub fn new() -> Self {
        Self::with_max_batch_writes(DEFAULT_MAX_BATCH_WRITES)
    }

    /// Creates an empty store with a custom batch limit.
    #[must_use]
    pub fn with_max_batch_writes(max_batch_writes: usize) -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            max_batch_writes,
        }
    }

    /// Maximum number of writes accepted in one commit.
    #[must_use]
    pub const fn max_batch_writes(&self) -> usize {
        self.max_batch_writes
    }

    /// Reads one document.
    ///
    /// # Errors
    ///
    /// Returns [`StoreFault::InvalidPath`] if `doc_path` is not a document path.
    pub fn get(&self, doc_path: &str) -> Result<Option<StoredDocument>, StoreFault> {
        let Some((_, id)) = path::split_document(doc_path) else {
            return Err(StoreFault::InvalidPath(doc_path.to_string()));
        };
        let inner = self.inner.lock();
        Ok(inner.docs.get(doc_path).map(|entry| StoredDocument {
            path: doc_path.to_string(),
            id: id.to_string(),
            version: entry.version,
            fields: entry.fields.clone(),
        }))
    }

    /// Lists the documents directly under `collection`, ordered by id.
    ///
    /// # Errors
    ///
    /// Returns [`StoreFault::InvalidPath`] if `collection` is not a
    /// collection path.
    pub fn list(
        &self,
        collection: &str,
        filter: Option<&FieldFilter>,
    ) -> Result<Vec<StoredDocument>, StoreFault> {
        if !path::is_collection(collection) {
            return Err(StoreFault::InvalidPath(collection.to_string()));
        }
        Ok(self.inner.lock().collection_snapshot(collection, filter))
    }

    /// Applies a batch of writes atomically and returns the commit sequence
    /// number.
    ///
    /// Either every write applies or none does. An empty batch is accepted
    /// and returns the current sequence without advancing it.
    ///
    /// # Errors
    ///
    /// Returns [`StoreFault::BatchTooLarge`] if the batch exceeds the limit,
    /// [`StoreFault::InvalidPath`] for a non-document path,
    /// [`StoreFault::AlreadyExists`] if a `Create` targets an existing
    /// document, or [`StoreFault::PreconditionFailed`] if any guard fails.
    pub fn commit(&self, writes: Vec<Write>) -> Result<u64, StoreFault> {
        if writes.len() > self.max_batch_writes {
            return Err(StoreFault::BatchTooLarge {
                len: writes.len(),
                max: self.max_batch_writes,
            });
        }

        let mut inner = self.inner.lock();
        for write in &writes {
            inner.check(write)?;
        }
        if writes.is_empty() {
            return Ok(inner.sequence);
        }

        inner.sequence += 1;
        let version = inner.sequence;
        let now_ms = chrono::Utc::now().timestamp_millis();
        let mut touched = BTreeSet::new();

        for write in writes {
            let changed = match write.op {
                WriteOp::Set(mut fields) | WriteOp::Create(mut fields) => {
                    value::resolve_document(&mut fields, now_ms);
                    inner
                        .docs
                        .insert(write.path.clone(), Entry { version, fields });
                    true
                }
                WriteOp::Delete => inner.docs.remove(&write.path).is_some(),
                WriteOp::Verify => false,
            };
            if changed && let Some((collection, _)) = path::split_document(&write.path) {
                touched.insert(collection.to_string());
            }
        }

        tracing::debug!(version, collections = touched.len(), "commit applied");

        let mut closed = Vec::new();
        for (id, sub) in &inner.subscribers {
            if touched.contains(&sub.collection) {
                let snapshot = inner.collection_snapshot(&sub.collection, None);
                if sub.tx.send(snapshot).is_err() {
                    closed.push(*id);
                }
            }
        }
        for id in closed {
            inner.subscribers.remove(&id);
            tracing::debug!(subscription_id = id, "pruned closed subscription");
        }
        drop(inner);

        Ok(version)
    }

    /// Subscribes to a collection.
    ///
    /// The current snapshot is queued on the returned receiver before this
    /// returns; every later commit touching the collection queues another.
    ///
    /// # Errors
    ///
    /// Returns [`StoreFault::InvalidPath`] if `collection` is not a
    /// collection path.
    pub fn subscribe(&self, collection: &str) -> Result<(u64, SnapshotReceiver), StoreFault> {
        if !path::is_collection(collection) {
            return Err(StoreFault::InvalidPath(collection.to_string()));
        }
        let (tx, rx) = mpsc::unbounded_channel();
        let mut inner = self.inner.lock();
        inner.next_subscription += 1;
        let id = inner.next_subscription;
        let _ = tx.send(inner.collection_snapshot(collection, None));
        inner.subscribers.insert(
            id,
            Subscriber {
                collection: collection.to_string(),
                tx,
            },
        );
        drop(inner);
        tracing::debug!(subscription_id = id, path = %collection, "subscribed");
        Ok((id, rx))
    }

    /// Ends a subscription. Returns `false` if it was already gone.
    pub fn unsubscribe(&self, subscription_id: u64) -> bool {
        let removed = self.inner.lock().subscribers.remove(&subscription_id).is_some();
        if removed {
            tracing::debug!(subscription_id, "unsubscribed");
        }
        removed
    }

    /// Number of live subscriptions.
    #[must_use]
    pub fn subscription_count(&self) -> usize {
        self.inner.lock().subscribers.len()
    }

    /// Number of stored documents.
    #[must_use]
    pub fn document_count(&self) -> usize {
        self.inner.lock().docs.len()
    }
}
