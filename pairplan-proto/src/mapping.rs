//! Conversion between stored documents and the domain model.
//!
//! Decoding is lenient where the domain allows it: unknown `type` or
//! `status` strings fall back to defaults, a missing `weekday` means Monday
//! and malformed optional fields are treated as absent. Only missing or
//! invalid required fields fail, so the caller can drop that one document
//! and keep the rest of a list usable.

use std::collections::BTreeMap;

use crate::session::{Session, SessionCode, SessionMode};
use crate::task::{ChecklistItem, ClockTime, Task, TaskId, TaskStatus, TaskType, Weekday};
use crate::value::{Document, FieldValue};

/// Errors produced when a document cannot be turned into a domain value.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MappingError {
    /// A required field is absent or has the wrong type.
    #[error("missing or mistyped field `{0}`")]
    MissingField(&'static str),
    /// A field is present but its value is unusable.
    #[error("invalid field `{field}`: {reason}")]
    InvalidField {
        /// Field name.
        field: &'static str,
        /// What was wrong with it.
        reason: String,
    },
}

fn required_str<'a>(doc: &'a Document, field: &'static str) -> Result<&'a str, MappingError> {
    doc.get(field)
        .and_then(FieldValue::as_str)
        .ok_or(MappingError::MissingField(field))
}

fn optional_clock_time(doc: &Document, field: &str) -> Option<ClockTime> {
    doc.get(field)
        .and_then(FieldValue::as_str)
        .and_then(|s| s.parse().ok())
}

/// Encodes a task into its stored document shape.
///
/// Optional fields are omitted when absent and the checklist is omitted
/// when empty. `isCompleted` is written derived from `status`.
#[must_use]
pub fn task_to_document(task: &Task) -> Document {
    let mut doc = Document::new();
    doc.insert("id".into(), task.id.as_str().into());
    doc.insert("title".into(), task.title.as_str().into());
    doc.insert("type".into(), task.task_type.as_str().into());
    doc.insert("userId".into(), task.owner_id.as_str().into());
    doc.insert("timestamp".into(), FieldValue::Timestamp(task.timestamp));
    doc.insert(
        "weekday".into(),
        FieldValue::Integer(i64::from(task.weekday.number())),
    );
    doc.insert("status".into(), task.status.as_str().into());
    doc.insert("isCompleted".into(), task.is_completed().into());
    if let Some(description) = &task.description {
        doc.insert("description".into(), description.as_str().into());
    }
    if let Some(time) = task.time {
        doc.insert("time".into(), time.to_string().into());
    }
    if let Some(end_time) = task.end_time {
        doc.insert("endTime".into(), end_time.to_string().into());
    }
    if !task.checklist.is_empty() {
        let items = task
            .checklist
            .iter()
            .map(|item| {
                let mut map = BTreeMap::new();
                map.insert("id".to_string(), item.id.as_str().into());
                map.insert("text".to_string(), item.text.as_str().into());
                map.insert("isCompleted".to_string(), item.is_completed.into());
                FieldValue::Map(map)
            })
            .collect();
        doc.insert("checklist".into(), FieldValue::Array(items));
    }
    doc
}

/// Decodes a stored task document.
///
/// # Errors
///
/// Returns [`MappingError`] if `id`, `title`, `userId` or `timestamp` is
/// missing, the title is blank, or `weekday` is present but out of range.
pub fn task_from_document(doc: &Document) -> Result<Task, MappingError> {
    let id = required_str(doc, "id")?;
    let title = required_str(doc, "title")?;
    if title.trim().is_empty() {
        return Err(MappingError::InvalidField {
            field: "title",
            reason: "blank".to_string(),
        });
    }
    let owner_id = required_str(doc, "userId")?;
    let timestamp = doc
        .get("timestamp")
        .and_then(FieldValue::as_timestamp)
        .ok_or(MappingError::MissingField("timestamp"))?;

    let weekday = match doc.get("weekday").and_then(FieldValue::as_integer) {
        None => Weekday::Monday,
        Some(n) => Weekday::from_number(n).ok_or_else(|| MappingError::InvalidField {
            field: "weekday",
            reason: format!("{n} is not in 1..=7"),
        })?,
    };

    let task_type = doc
        .get("type")
        .and_then(FieldValue::as_str)
        .map_or(TaskType::Other, TaskType::from_stored);

    let status = match doc.get("status").and_then(FieldValue::as_str) {
        Some(s) => TaskStatus::from_stored(s),
        None => {
            let legacy_done = doc
                .get("isCompleted")
                .and_then(FieldValue::as_bool)
                .unwrap_or(false);
            if legacy_done {
                TaskStatus::Done
            } else {
                TaskStatus::Normal
            }
        }
    };

    let checklist = doc
        .get("checklist")
        .and_then(FieldValue::as_array)
        .map(|items| items.iter().filter_map(checklist_item_from_value).collect())
        .unwrap_or_default();

    Ok(Task {
        id: TaskId::from_string(id),
        title: title.to_string(),
        task_type,
        owner_id: owner_id.to_string(),
        weekday,
        time: optional_clock_time(doc, "time"),
        end_time: optional_clock_time(doc, "endTime"),
        status,
        description: doc
            .get("description")
            .and_then(FieldValue::as_str)
            .map(str::to_string),
        checklist,
        timestamp,
    })
}

fn checklist_item_from_value(value: &FieldValue) -> Option<ChecklistItem> {
    let map = value.as_map()?;
    Some(ChecklistItem {
        id: map.get("id")?.as_str()?.to_string(),
        text: map.get("text")?.as_str()?.to_string(),
        is_completed: map.get("isCompleted")?.as_bool()?,
    })
}

/// Encodes session metadata for the session root document.
///
/// A session without `created_at` gets a server-timestamp placeholder.
#[must_use]
pub fn session_to_document(session: &Session) -> Document {
    let mut doc = Document::new();
    doc.insert("code".into(), session.code.as_str().into());
    doc.insert("mode".into(), session.mode.as_str().into());
    doc.insert("ownerId".into(), session.owner_id.as_str().into());
    doc.insert(
        "participants".into(),
        FieldValue::Array(
            session
                .participants
                .iter()
                .map(|p| p.as_str().into())
                .collect(),
        ),
    );
    doc.insert(
        "createdAt".into(),
        session
            .created_at
            .map_or(FieldValue::ServerTimestamp, FieldValue::Timestamp),
    );
    doc
}

/// Decodes a session root document.
///
/// # Errors
///
/// Returns [`MappingError`] if the code, mode or participant list is missing
/// or invalid.
pub fn session_from_document(doc: &Document) -> Result<Session, MappingError> {
    let code = SessionCode::parse(required_str(doc, "code")?).map_err(|e| {
        MappingError::InvalidField {
            field: "code",
            reason: e.to_string(),
        }
    })?;
    let mode_str = required_str(doc, "mode")?;
    let mode = SessionMode::from_stored(mode_str).ok_or_else(|| MappingError::InvalidField {
        field: "mode",
        reason: format!("unknown mode {mode_str:?}"),
    })?;
    let participants = doc
        .get("participants")
        .and_then(FieldValue::as_array)
        .ok_or(MappingError::MissingField("participants"))?
        .iter()
        .filter_map(|v| v.as_str().map(str::to_string))
        .collect();
    Ok(Session {
        code,
        mode,
        owner_id: doc
            .get("ownerId")
            .and_then(FieldValue::as_str)
            .unwrap_or_default()
            .to_string(),
        participants,
        created_at: doc.get("createdAt").and_then(FieldValue::as_timestamp),
    })
}

/// Encodes a participant record.
#[must_use]
pub fn participant_document(user_id: &str) -> Document {
    let mut doc = Document::new();
    doc.insert("userId".into(), user_id.into());
    doc.insert("joinedAt".into(), FieldValue::ServerTimestamp);
    doc
}
