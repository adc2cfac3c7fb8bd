//! Document value model.
//!
//! A [`Document`] is a map of field names to [`FieldValue`]s. Values are
//! dynamically typed the way a schemaless document store sees them; the
//! typed domain model lives in [`crate::task`] and [`crate::session`] and is
//! converted by [`crate::mapping`].

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// A stored document: field name -> value, ordered by field name.
pub type Document = BTreeMap<String, FieldValue>;

/// A single dynamically typed field value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FieldValue {
    /// Explicit null.
    Null,
    /// Boolean.
    Bool(bool),
    /// Signed 64-bit integer.
    Integer(i64),
    /// UTF-8 string.
    String(String),
    /// Milliseconds since the UNIX epoch.
    Timestamp(i64),
    /// Ordered list of values.
    Array(Vec<FieldValue>),
    /// Nested map.
    Map(BTreeMap<String, FieldValue>),
    /// Placeholder replaced by the store with the commit time.
    ServerTimestamp,
}

impl FieldValue {
    /// Returns the string payload, if this is a [`FieldValue::String`].
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s.as_str()),
            _ => None,
        }
    }

    /// Returns the boolean payload, if this is a [`FieldValue::Bool`].
    #[must_use]
    pub const fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Returns the integer payload, if this is a [`FieldValue::Integer`].
    #[must_use]
    pub const fn as_integer(&self) -> Option<i64> {
        match self {
            Self::Integer(n) => Some(*n),
            _ => None,
        }
    }

    /// Returns the timestamp in milliseconds.
    ///
    /// Integers are accepted too, since older writers stored creation times
    /// as plain numbers.
    #[must_use]
    pub const fn as_timestamp(&self) -> Option<i64> {
        match self {
            Self::Timestamp(ms) | Self::Integer(ms) => Some(*ms),
            _ => None,
        }
    }

    /// Returns the elements, if this is a [`FieldValue::Array`].
    #[must_use]
    pub fn as_array(&self) -> Option<&[Self]> {
        match self {
            Self::Array(items) => Some(items.as_slice()),
            _ => None,
        }
    }

    /// Returns the nested map, if this is a [`FieldValue::Map`].
    #[must_use]
    pub const fn as_map(&self) -> Option<&BTreeMap<String, Self>> {
        match self {
            Self::Map(map) => Some(map),
            _ => None,
        }
    }

    /// Replaces every [`FieldValue::ServerTimestamp`] (at any depth) with
    /// `Timestamp(now_ms)`.
    pub fn resolve_server_timestamps(&mut self, now_ms: i64) {
        match self {
            Self::ServerTimestamp => *self = Self::Timestamp(now_ms),
            Self::Array(items) => {
                for item in items {
                    item.resolve_server_timestamps(now_ms);
                }
            }
            Self::Map(map) => resolve_document(map, now_ms),
            _ => {}
        }
    }
}

/// Replaces every server-timestamp placeholder in a document.
pub fn resolve_document(doc: &mut Document, now_ms: i64) {
    for value in doc.values_mut() {
        value.resolve_server_timestamps(now_ms);
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<bool> for FieldValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl<T: Into<Self>> From<Vec<T>> for FieldValue {
    fn from(values: Vec<T>) -> Self {
        Self::Array(values.into_iter().map(Into::into).collect())
    }
}
