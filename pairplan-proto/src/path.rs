//! Document and collection paths.
//!
//! Paths are `/`-separated segment lists. Collections have an odd number of
//! segments (`sessions`, `sessions/AB12CD/tasks`), documents an even number
//! (`sessions/AB12CD`, `sessions/AB12CD/tasks/<id>`).

use crate::session::SessionCode;

/// Root collection holding one document per session.
pub const SESSIONS: &str = "sessions";

/// Sub-collection of a session holding its tasks.
pub const TASKS: &str = "tasks";

/// Sub-collection of a session holding participant records.
pub const PARTICIPANTS: &str = "participants";

/// Path of a session root document.
#[must_use]
pub fn session(code: &SessionCode) -> String {
    format!("{SESSIONS}/{code}")
}

/// Path of a session's task collection.
#[must_use]
pub fn tasks(code: &SessionCode) -> String {
    format!("{SESSIONS}/{code}/{TASKS}")
}

/// Path of a single task document.
#[must_use]
pub fn task(code: &SessionCode, task_id: &str) -> String {
    format!("{SESSIONS}/{code}/{TASKS}/{task_id}")
}

/// Path of a session's participant collection.
#[must_use]
pub fn participants(code: &SessionCode) -> String {
    format!("{SESSIONS}/{code}/{PARTICIPANTS}")
}

/// Path of a single participant record.
#[must_use]
pub fn participant(code: &SessionCode, user_id: &str) -> String {
    format!("{SESSIONS}/{code}/{PARTICIPANTS}/{user_id}")
}

fn segment_count(path: &str) -> Option<usize> {
    if path.is_empty() {
        return None;
    }
    let mut count = 0;
    for segment in path.split('/') {
        if segment.is_empty() {
            return None;
        }
        count += 1;
    }
    Some(count)
}

/// Whether `path` is a well-formed document path.
#[must_use]
pub fn is_document(path: &str) -> bool {
    segment_count(path).is_some_and(|n| n % 2 == 0)
}

/// Whether `path` is a well-formed collection path.
#[must_use]
pub fn is_collection(path: &str) -> bool {
    segment_count(path).is_some_and(|n| n % 2 == 1)
}

/// Splits a document path into its parent collection and document id.
#[must_use]
pub fn split_document(path: &str) -> Option<(&str, &str)> {
    if !is_document(path) {
        return None;
    }
    path.rsplit_once('/')
}
