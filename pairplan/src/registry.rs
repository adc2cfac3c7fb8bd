//! Session registry: creation, lookup, membership and deletion.
//!
//! Sessions live at `sessions/{code}`. The root document carries the mode,
//! the owner and the participant array; each participant also gets a
//! `participants/{userId}` record written in the same commit. Membership
//! changes are optimistic transactions on the root, so two users joining an
//! individual session at the same time cannot both take the last seat.

use std::sync::Arc;

use pairplan_docstore::engine::DEFAULT_MAX_BATCH_WRITES;
use pairplan_proto::mapping::{self, MappingError};
use pairplan_proto::path;
use pairplan_proto::session::{CODE_ALPHABET, CODE_LENGTH, CodeError, Session, SessionCode, SessionMode};
use pairplan_proto::wire::{FieldFilter, Write};
use rand::Rng;

use crate::store::{DocumentStore, StoreError, TxOutcome, run_transaction};

/// Default number of optimistic attempts for membership transactions.
pub const DEFAULT_TRANSACTION_ATTEMPTS: u32 = 5;

/// Default number of fresh codes tried before giving up on creation.
pub const DEFAULT_CODE_ATTEMPTS: u32 = 8;

/// Errors that can occur during registry operations.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    /// The code is not a well-formed session code.
    #[error("invalid session code: {0}")]
    InvalidCode(#[from] CodeError),

    /// No session exists under this code.
    #[error("session {0} not found")]
    NotFound(SessionCode),

    /// Only the owner may perform this operation.
    #[error("only the owner may delete session {0}")]
    NotOwner(SessionCode),

    /// Every generated code collided with an existing session.
    #[error("no free session code after {0} attempts")]
    CodeSpaceExhausted(u32),

    /// The stored session document could not be decoded.
    #[error("malformed session document: {0}")]
    Malformed(#[from] MappingError),

    /// The document store failed.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Result of [`SessionRegistry::add_participant`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinOutcome {
    /// The user was added.
    Joined,
    /// The user was already a participant; nothing changed.
    AlreadyMember,
    /// The session is at capacity.
    Full,
}

/// Tunables for [`SessionRegistry`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegistryOptions {
    /// Attempts per membership transaction.
    pub transaction_attempts: u32,
    /// Codes tried per `create_session`.
    pub code_attempts: u32,
    /// Largest commit the store accepts.
    pub batch_limit: usize,
}

impl Default for RegistryOptions {
    fn default() -> Self {
        Self {
            transaction_attempts: DEFAULT_TRANSACTION_ATTEMPTS,
            code_attempts: DEFAULT_CODE_ATTEMPTS,
            batch_limit: DEFAULT_MAX_BATCH_WRITES,
        }
    }
}

/// Produces candidate session codes.
pub type CodeGenerator = Arc<dyn Fn() -> String + Send + Sync>;

/// Generates a random code from `[A-Z0-9]`.
#[must_use]
pub fn random_code() -> String {
    let mut rng = rand::rng();
    (0..CODE_LENGTH)
        .map(|_| char::from(CODE_ALPHABET[rng.random_range(0..CODE_ALPHABET.len())]))
        .collect()
}

/// Creates and manages sessions in a [`DocumentStore`].
#[derive(Clone)]
pub struct SessionRegistry<S> {
    store: S,
    options: RegistryOptions,
    generate_code: CodeGenerator,
}

impl<S: DocumentStore> SessionRegistry<S> {
    /// Creates a registry using random codes.
    pub fn new(store: S, options: RegistryOptions) -> Self {
        Self {
            store,
            options,
            generate_code: Arc::new(random_code),
        }
    }

    /// Replaces the code generator.
    #[must_use]
    pub fn with_code_generator(mut self, generate_code: CodeGenerator) -> Self {
        self.generate_code = generate_code;
        self
    }

    /// The underlying store.
    pub const fn store(&self) -> &S {
        &self.store
    }

    /// Creates an empty session owned by `owner_id`.
    ///
    /// The root is written with a conditional create, so an existing session
    /// is never overwritten; a colliding code is replaced by a fresh one. A
    /// code that still has task documents under it counts as a collision.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::CodeSpaceExhausted`] if every attempt
    /// collided, or a store error.
    pub async fn create_session(
        &self,
        mode: SessionMode,
        owner_id: &str,
    ) -> Result<Session, RegistryError> {
        for attempt in 1..=self.options.code_attempts {
            let code = SessionCode::parse(&(self.generate_code)())?;
            if !self.store.list(&path::tasks(&code), None).await?.is_empty() {
                tracing::warn!(code = %code, attempt, "stale tasks under unused code, skipping");
                continue;
            }
            let session = Session {
                code: code.clone(),
                mode,
                owner_id: owner_id.to_string(),
                participants: Vec::new(),
                created_at: None,
            };
            let write = Write::create(path::session(&code), mapping::session_to_document(&session));
            match self.store.commit(vec![write]).await {
                Ok(_) => {
                    tracing::info!(code = %code, mode = %mode, user_id = owner_id, "session created");
                    return self.load_session(&code).await;
                }
                Err(e) if e.is_already_exists() => {
                    tracing::debug!(code = %code, attempt, "session code collision");
                }
                Err(e) => return Err(e.into()),
            }
        }
        Err(RegistryError::CodeSpaceExhausted(self.options.code_attempts))
    }

    /// Whether a session exists under `code`.
    ///
    /// # Errors
    ///
    /// Returns a store error if the lookup fails.
    pub async fn session_exists(&self, code: &SessionCode) -> Result<bool, RegistryError> {
        Ok(self.store.get(&path::session(code)).await?.is_some())
    }

    /// Loads full session metadata.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::NotFound`] if there is no such session.
    pub async fn load_session(&self, code: &SessionCode) -> Result<Session, RegistryError> {
        let doc = self
            .store
            .get(&path::session(code))
            .await?
            .ok_or_else(|| RegistryError::NotFound(code.clone()))?;
        Ok(mapping::session_from_document(&doc.fields)?)
    }

    /// Loads the session's mode.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::NotFound`] if there is no such session.
    pub async fn load_mode(&self, code: &SessionCode) -> Result<SessionMode, RegistryError> {
        Ok(self.load_session(code).await?.mode)
    }

    /// Adds `user_id` to the session, honouring the mode's capacity.
    ///
    /// Re-joining is a no-op reported as [`JoinOutcome::AlreadyMember`].
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::NotFound`] if the session does not exist, or
    /// a store error (including contention).
    pub async fn add_participant(
        &self,
        code: &SessionCode,
        user_id: &str,
    ) -> Result<JoinOutcome, RegistryError> {
        let root = path::session(code);
        let outcome = run_transaction(
            &self.store,
            &root,
            self.options.transaction_attempts,
            |doc| -> Result<TxOutcome<JoinOutcome>, RegistryError> {
                let doc = doc.ok_or_else(|| RegistryError::NotFound(code.clone()))?;
                let mut session = mapping::session_from_document(&doc.fields)?;
                if session.is_participant(user_id) {
                    return Ok(TxOutcome::Abort(JoinOutcome::AlreadyMember));
                }
                if !session.has_room() {
                    return Ok(TxOutcome::Abort(JoinOutcome::Full));
                }
                session.participants.push(user_id.to_string());
                Ok(TxOutcome::Commit {
                    writes: vec![
                        Write::set(root.as_str(), mapping::session_to_document(&session)),
                        Write::set(
                            path::participant(code, user_id),
                            mapping::participant_document(user_id),
                        ),
                    ],
                    value: JoinOutcome::Joined,
                })
            },
        )
        .await?;
        tracing::info!(code = %code, user_id, ?outcome, "add participant");
        Ok(outcome)
    }

    /// Removes `user_id` from the session. The session itself stays even if
    /// nobody is left.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::NotFound`] if the session does not exist, or
    /// a store error.
    pub async fn remove_participant(
        &self,
        code: &SessionCode,
        user_id: &str,
    ) -> Result<(), RegistryError> {
        let root = path::session(code);
        run_transaction(
            &self.store,
            &root,
            self.options.transaction_attempts,
            |doc| -> Result<TxOutcome<()>, RegistryError> {
                let doc = doc.ok_or_else(|| RegistryError::NotFound(code.clone()))?;
                let mut session = mapping::session_from_document(&doc.fields)?;
                if !session.is_participant(user_id) {
                    return Ok(TxOutcome::Abort(()));
                }
                session.participants.retain(|p| p != user_id);
                Ok(TxOutcome::Commit {
                    writes: vec![
                        Write::set(root.as_str(), mapping::session_to_document(&session)),
                        Write::delete(path::participant(code, user_id)),
                    ],
                    value: (),
                })
            },
        )
        .await?;
        tracing::info!(code = %code, user_id, "participant removed");
        Ok(())
    }

    /// Lists sessions created by `user_id`, ordered by code. Undecodable
    /// session documents are skipped.
    ///
    /// # Errors
    ///
    /// Returns a store error if the query fails.
    pub async fn list_sessions_owned_by(&self, user_id: &str) -> Result<Vec<Session>, RegistryError> {
        let filter = FieldFilter {
            field: "ownerId".to_string(),
            value: user_id.into(),
        };
        let docs = self.store.list(path::SESSIONS, Some(filter)).await?;
        Ok(docs
            .iter()
            .filter_map(|doc| match mapping::session_from_document(&doc.fields) {
                Ok(session) => Some(session),
                Err(e) => {
                    tracing::debug!(path = %doc.path, error = %e, "skipping malformed session");
                    None
                }
            })
            .collect())
    }

    /// Deletes a session with all its tasks and participant records.
    ///
    /// Children are removed in batches that fit the store's limit; the root
    /// goes in the final batch, so after a partial failure the session is
    /// still there and the call can simply be repeated. Task writes are
    /// guarded on the root, so tasks that slipped in while the children were
    /// being removed are swept once the root is gone.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::NotOwner`] if `caller_id` did not create the
    /// session, [`RegistryError::NotFound`] if it does not exist, or a store
    /// error.
    pub async fn delete_session(
        &self,
        code: &SessionCode,
        caller_id: &str,
    ) -> Result<(), RegistryError> {
        let session = self.load_session(code).await?;
        if session.owner_id != caller_id {
            tracing::warn!(code = %code, user_id = caller_id, "delete refused: not owner");
            return Err(RegistryError::NotOwner(code.clone()));
        }

        let mut children = self.store.list(&path::tasks(code), None).await?;
        children.extend(self.store.list(&path::participants(code), None).await?);
        let deletes: Vec<Write> = children.into_iter().map(|d| Write::delete(d.path)).collect();

        let chunk = self.options.batch_limit.saturating_sub(1).max(1);
        let mut batches: Vec<Vec<Write>> = deletes.chunks(chunk).map(<[Write]>::to_vec).collect();
        if batches.is_empty() {
            batches.push(Vec::new());
        }
        if let Some(last) = batches.last_mut() {
            last.push(Write::delete(path::session(code)));
        }

        let total = batches.len();
        for (i, batch) in batches.into_iter().enumerate() {
            self.store.commit(batch).await?;
            tracing::debug!(code = %code, batch = i + 1, total, "delete batch committed");
        }

        let stragglers = self.store.list(&path::tasks(code), None).await?;
        if !stragglers.is_empty() {
            tracing::debug!(code = %code, count = stragglers.len(), "sweeping late task writes");
            let deletes: Vec<Write> = stragglers.into_iter().map(|d| Write::delete(d.path)).collect();
            for batch in deletes.chunks(self.options.batch_limit.max(1)) {
                self.store.commit(batch.to_vec()).await?;
            }
        }
        tracing::info!(code = %code, "session deleted");
        Ok(())
    }
}
