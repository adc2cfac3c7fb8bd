//! Document store wire protocol.
//!
//! Clients send [`ClientFrame`]s and receive [`ServerFrame`]s as postcard
//! payloads in WebSocket binary frames. Every request carries a
//! client-chosen `request_id` that the matching response echoes back;
//! subscription snapshots are pushed unsolicited, tagged with the
//! subscription id the server handed out.

use serde::{Deserialize, Serialize};

use crate::value::Document;

/// Error type for wire encode/decode operations.
#[derive(Debug, thiserror::Error)]
pub enum WireError {
    /// Serialization or deserialization failed.
    #[error("wire serialization error: {0}")]
    Serialization(String),
}

/// Condition a write requires of the current document state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Precondition {
    /// The document must (or must not) exist.
    Exists(bool),
    /// The document must exist at exactly this version.
    Version(u64),
}

/// What a single write does to its document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum WriteOp {
    /// Replace the document with these fields, creating it if absent.
    Set(Document),
    /// Create the document; fails if it already exists.
    Create(Document),
    /// Remove the document. Deleting an absent document is a no-op.
    Delete,
    /// Change nothing; only the write's precondition is checked.
    Verify,
}

/// One write in an atomic batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Write {
    /// Document path.
    pub path: String,
    /// Operation.
    pub op: WriteOp,
    /// Optional guard evaluated before any write in the batch applies.
    pub precondition: Option<Precondition>,
}

impl Write {
    /// Unconditional set.
    pub fn set(path: impl Into<String>, fields: Document) -> Self {
        Self {
            path: path.into(),
            op: WriteOp::Set(fields),
            precondition: None,
        }
    }

    /// Create-if-absent.
    pub fn create(path: impl Into<String>, fields: Document) -> Self {
        Self {
            path: path.into(),
            op: WriteOp::Create(fields),
            precondition: None,
        }
    }

    /// Unconditional delete.
    pub fn delete(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            op: WriteOp::Delete,
            precondition: None,
        }
    }

    /// Guard-only write: the batch applies only if `precondition` holds
    /// for `path`.
    pub fn verify(path: impl Into<String>, precondition: Precondition) -> Self {
        Self {
            path: path.into(),
            op: WriteOp::Verify,
            precondition: Some(precondition),
        }
    }

    /// Attaches a precondition.
    #[must_use]
    pub fn when(mut self, precondition: Precondition) -> Self {
        self.precondition = Some(precondition);
        self
    }
}

/// A document as read from the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredDocument {
    /// Full document path.
    pub path: String,
    /// Last path segment.
    pub id: String,
    /// Commit sequence number of the last write to this document.
    pub version: u64,
    /// Field values, server timestamps already resolved.
    pub fields: Document,
}

/// Equality filter on a top-level field, used by list queries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldFilter {
    /// Field name.
    pub field: String,
    /// Value the field must equal.
    pub value: crate::value::FieldValue,
}

/// Reasons the store rejects a request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
pub enum StoreFault {
    /// A `Create` targeted a document that already exists.
    #[error("document already exists: {0}")]
    AlreadyExists(String),
    /// A precondition did not hold.
    #[error("precondition failed on {0}")]
    PreconditionFailed(String),
    /// A path is malformed or of the wrong kind.
    #[error("invalid path: {0}")]
    InvalidPath(String),
    /// A commit exceeded the batch limit.
    #[error("batch of {len} writes exceeds limit of {max}")]
    BatchTooLarge {
        /// Writes in the rejected batch.
        len: usize,
        /// Configured limit.
        max: usize,
    },
    /// An inbound frame exceeded the size limit.
    #[error("frame of {len} bytes exceeds limit of {max}")]
    FrameTooLarge {
        /// Frame size.
        len: usize,
        /// Configured limit.
        max: usize,
    },
    /// Anything else.
    #[error("internal store error: {0}")]
    Internal(String),
}

/// Operations a client can request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum StoreRequest {
    /// Read one document.
    Get {
        /// Document path.
        path: String,
    },
    /// Apply a batch of writes atomically.
    Commit {
        /// Writes, applied all-or-nothing.
        writes: Vec<Write>,
    },
    /// Read all documents of a collection, ordered by id.
    List {
        /// Collection path.
        collection: String,
        /// Optional field-equality filter.
        filter: Option<FieldFilter>,
    },
    /// Start receiving snapshots of a collection.
    Subscribe {
        /// Collection path.
        collection: String,
    },
    /// Stop a subscription.
    Unsubscribe {
        /// Id returned by `Subscribed`.
        subscription_id: u64,
    },
}

/// Request envelope sent by clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientFrame {
    /// Client-chosen correlation id.
    pub request_id: u64,
    /// The operation.
    pub request: StoreRequest,
}

/// Results of a [`StoreRequest`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum StoreResponse {
    /// Result of `Get`.
    Document(Option<StoredDocument>),
    /// Result of `Commit`: the commit's sequence number.
    Committed {
        /// Version assigned to every document the commit wrote.
        version: u64,
    },
    /// Result of `List`.
    Documents(Vec<StoredDocument>),
    /// Result of `Subscribe`. The initial snapshot follows as a push.
    Subscribed {
        /// Id tagging subsequent snapshots.
        subscription_id: u64,
    },
    /// Result of `Unsubscribe`.
    Unsubscribed,
    /// The request was rejected.
    Error(StoreFault),
}

/// Frames sent by the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ServerFrame {
    /// Reply to a client request.
    Response {
        /// Echoed correlation id.
        request_id: u64,
        /// Result.
        response: StoreResponse,
    },
    /// Full snapshot of a subscribed collection.
    Snapshot {
        /// Subscription this snapshot belongs to.
        subscription_id: u64,
        /// Every document in the collection, ordered by id.
        documents: Vec<StoredDocument>,
    },
    /// Connection-level error not tied to a request.
    Error {
        /// Human-readable error description.
        reason: String,
    },
}

/// Encodes a [`ClientFrame`].
///
/// # Errors
///
/// Returns [`WireError::Serialization`] if postcard fails.
pub fn encode_client(frame: &ClientFrame) -> Result<Vec<u8>, WireError> {
    postcard::to_allocvec(frame).map_err(|e| WireError::Serialization(e.to_string()))
}

/// Decodes a [`ClientFrame`].
///
/// # Errors
///
/// Returns [`WireError::Serialization`] on malformed input.
pub fn decode_client(bytes: &[u8]) -> Result<ClientFrame, WireError> {
    postcard::from_bytes(bytes).map_err(|e| WireError::Serialization(e.to_string()))
}

/// Reads only the request id at the front of an encoded [`ClientFrame`],
/// leaving the request itself undecoded.
#[must_use]
pub fn peek_request_id(bytes: &[u8]) -> Option<u64> {
    postcard::take_from_bytes::<u64>(bytes).ok().map(|(id, _)| id)
}

/// Encodes a [`ServerFrame`].
///
/// # Errors
///
/// Returns [`WireError::Serialization`] if postcard fails.
pub fn encode_server(frame: &ServerFrame) -> Result<Vec<u8>, WireError> {
    postcard::to_allocvec(frame).map_err(|e| WireError::Serialization(e.to_string()))
}

/// Decodes a [`ServerFrame`].
///
/// # Errors
///
/// Returns [`WireError::Serialization`] on malformed input.
pub fn decode_server(bytes: &[u8]) -> Result<ServerFrame, WireError> {
    postcard::from_bytes(bytes).map_err(|e| WireError::Serialization(e.to_string()))
}
