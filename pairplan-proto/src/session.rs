//! Session domain types: join codes, modes and session metadata.

use serde::{Deserialize, Serialize};

/// Length of a session join code.
pub const CODE_LENGTH: usize = 6;

/// Characters a join code is drawn from.
pub const CODE_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Maximum number of participants in an [`SessionMode::Individual`] session.
pub const INDIVIDUAL_CAPACITY: usize = 2;

/// Errors produced when parsing a join code.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CodeError {
    /// The code was empty after trimming whitespace.
    #[error("session code cannot be empty")]
    Empty,
    /// The code has the wrong number of characters.
    #[error("session code must be {CODE_LENGTH} characters, got {0}")]
    WrongLength(usize),
    /// The code contains a character outside `[A-Z0-9]`.
    #[error("session code contains invalid character {0:?}")]
    InvalidChar(char),
}

/// A validated, normalized 6-character session code.
///
/// Codes are case-insensitive on input: [`SessionCode::parse`] trims
/// surrounding whitespace and uppercases before validating.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SessionCode(String);

impl SessionCode {
    /// Parses and normalizes a user-entered code.
    ///
    /// # Errors
    ///
    /// Returns [`CodeError`] if the normalized code is empty, has the wrong
    /// length, or contains characters outside the code alphabet.
    pub fn parse(input: &str) -> Result<Self, CodeError> {
        let normalized = input.trim().to_ascii_uppercase();
        if normalized.is_empty() {
            return Err(CodeError::Empty);
        }
        let len = normalized.chars().count();
        if len != CODE_LENGTH {
            return Err(CodeError::WrongLength(len));
        }
        if let Some(bad) = normalized
            .chars()
            .find(|c| !c.is_ascii() || !CODE_ALPHABET.contains(&(*c as u8)))
        {
            return Err(CodeError::InvalidChar(bad));
        }
        Ok(Self(normalized))
    }

    /// Returns the code as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SessionCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::str::FromStr for SessionCode {
    type Err = CodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Visibility and mutation policy of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SessionMode {
    /// All participants see and may toggle all tasks. No capacity limit.
    Shared,
    /// Participants see all tasks but mutate only their own. At most two
    /// participants.
    Individual,
}

impl SessionMode {
    /// Stored string form.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Shared => "shared",
            Self::Individual => "individual",
        }
    }

    /// Parses the stored string form. Unknown values yield `None`.
    #[must_use]
    pub fn from_stored(value: &str) -> Option<Self> {
        match value {
            "shared" => Some(Self::Shared),
            "individual" => Some(Self::Individual),
            _ => None,
        }
    }

    /// Maximum participant count, or `None` when unbounded.
    #[must_use]
    pub const fn capacity(self) -> Option<usize> {
        match self {
            Self::Shared => None,
            Self::Individual => Some(INDIVIDUAL_CAPACITY),
        }
    }
}

impl std::fmt::Display for SessionMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Session metadata as stored on the session root document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    /// Join code, also the session's document id.
    pub code: SessionCode,
    /// Visibility and mutation policy.
    pub mode: SessionMode,
    /// User id of the creator.
    pub owner_id: String,
    /// Current participant user ids, in join order.
    pub participants: Vec<String>,
    /// Server-assigned creation time (ms since epoch); `None` before the
    /// first commit resolves it.
    pub created_at: Option<i64>,
}

impl Session {
    /// Whether another distinct participant may still join.
    #[must_use]
    pub fn has_room(&self) -> bool {
        self.mode
            .capacity()
            .is_none_or(|cap| self.participants.len() < cap)
    }

    /// Whether `user_id` is currently a participant.
    #[must_use]
    pub fn is_participant(&self, user_id: &str) -> bool {
        self.participants.iter().any(|p| p == user_id)
    }
}
