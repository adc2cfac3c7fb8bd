//! Recently used session codes, most recent first.
//!
//! A small local cache: bounded, free of duplicates, and optionally backed
//! by a TOML file that is rewritten on every change.

use std::path::{Path, PathBuf};

use pairplan_proto::session::SessionCode;

use crate::state::{self, StateError};

/// File under the state directory holding recent codes.
pub const RECENT_FILE: &str = "recent.toml";

/// Default number of codes kept.
pub const DEFAULT_RECENT_LIMIT: usize = 10;

#[derive(Default, serde::Serialize, serde::Deserialize)]
struct RecentFile {
    #[serde(default)]
    codes: Vec<String>,
}

/// Bounded most-recent-first list of session codes.
#[derive(Debug, Clone)]
pub struct RecentSessions {
    codes: Vec<SessionCode>,
    limit: usize,
    path: Option<PathBuf>,
}

impl RecentSessions {
    /// A list that is never written to disk.
    #[must_use]
    pub const fn in_memory(limit: usize) -> Self {
        Self {
            codes: Vec::new(),
            limit,
            path: None,
        }
    }

    /// Loads the list stored at `path` (empty if the file does not exist).
    /// Entries that are not valid codes are dropped.
    ///
    /// # Errors
    ///
    /// Returns [`StateError`] if the file exists but cannot be read or parsed.
    pub fn load(path: &Path, limit: usize) -> Result<Self, StateError> {
        let file: RecentFile = state::read_toml(path)?.unwrap_or_default();
        let mut recent = Self {
            codes: Vec::new(),
            limit,
            path: Some(path.to_path_buf()),
        };
        for raw in file.codes {
            match SessionCode::parse(&raw) {
                Ok(code) if !recent.codes.contains(&code) => recent.codes.push(code),
                Ok(_) => {}
                Err(e) => tracing::debug!(code = %raw, error = %e, "skipping stored recent code"),
            }
        }
        recent.codes.truncate(limit);
        Ok(recent)
    }

    /// Moves `code` to the front, evicting the oldest entry past the limit.
    ///
    /// # Errors
    ///
    /// Returns [`StateError`] if persisting fails.
    pub fn record(&mut self, code: &SessionCode) -> Result<(), StateError> {
        self.codes.retain(|c| c != code);
        self.codes.insert(0, code.clone());
        self.codes.truncate(self.limit);
        self.save()
    }

    /// Removes `code` if present.
    ///
    /// # Errors
    ///
    /// Returns [`StateError`] if persisting fails.
    pub fn remove(&mut self, code: &SessionCode) -> Result<(), StateError> {
        let before = self.codes.len();
        self.codes.retain(|c| c != code);
        if self.codes.len() == before {
            return Ok(());
        }
        self.save()
    }

    /// Forgets every code.
    ///
    /// # Errors
    ///
    /// Returns [`StateError`] if persisting fails.
    pub fn clear(&mut self) -> Result<(), StateError> {
        self.codes.clear();
        self.save()
    }

    /// Codes, most recent first.
    #[must_use]
    pub fn codes(&self) -> &[SessionCode] {
        &self.codes
    }

    /// Whether `code` is in the list.
    #[must_use]
    pub fn contains(&self, code: &SessionCode) -> bool {
        self.codes.contains(code)
    }

    fn save(&self) -> Result<(), StateError> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let file = RecentFile {
            codes: self.codes.iter().map(ToString::to_string).collect(),
        };
        state::write_toml(path, &file)
    }
}
