//! In-process store backed directly by the document engine.
//!
//! Used by tests and by single-process setups where the engine lives in the
//! same address space as the client.

use std::sync::Arc;

use pairplan_docstore::engine::MemoryStore;
use pairplan_proto::wire::{FieldFilter, StoredDocument, Write};

use super::{DocumentStore, SnapshotFeed, StoreError};

/// [`DocumentStore`] over a shared [`MemoryStore`].
///
/// Clones share the same engine, so two clones behave like two clients of
/// one store.
#[derive(Clone, Default)]
pub struct LocalStore {
    engine: Arc<MemoryStore>,
}

impl LocalStore {
    /// Creates a store over a fresh, empty engine.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Wraps an existing engine.
    #[must_use]
    pub const fn with_engine(engine: Arc<MemoryStore>) -> Self {
        Self { engine }
    }

    /// The underlying engine.
    #[must_use]
    pub const fn engine(&self) -> &Arc<MemoryStore> {
        &self.engine
    }
}

impl DocumentStore for LocalStore {
    async fn get(&self, path: &str) -> Result<Option<StoredDocument>, StoreError> {
        Ok(self.engine.get(path)?)
    }

    async fn commit(&self, writes: Vec<Write>) -> Result<u64, StoreError> {
        Ok(self.engine.commit(writes)?)
    }

    async fn list(
        &self,
        collection: &str,
        filter: Option<FieldFilter>,
    ) -> Result<Vec<StoredDocument>, StoreError> {
        Ok(self.engine.list(collection, filter.as_ref())?)
    }

    async fn subscribe(&self, collection: &str) -> Result<SnapshotFeed, StoreError> {
        let (subscription_id, rx) = self.engine.subscribe(collection)?;
        let engine = Arc::clone(&self.engine);
        Ok(SnapshotFeed::new(rx, move || {
            engine.unsubscribe(subscription_id);
        }))
    }
}
