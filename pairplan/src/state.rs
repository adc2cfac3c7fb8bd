//! Small TOML files under the client state directory.
//!
//! The local identity and the recent-session cache both live here.

use std::path::{Path, PathBuf};

use serde::Serialize;
use serde::de::DeserializeOwned;

/// Errors reading or writing persisted client state.
#[derive(Debug, thiserror::Error)]
pub enum StateError {
    /// Filesystem access failed.
    #[error("state file {path}: {source}")]
    Io {
        /// File involved.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// The file exists but is not valid TOML for the expected shape.
    #[error("failed to parse state file: {0}")]
    Parse(#[from] toml::de::Error),

    /// The value could not be rendered as TOML.
    #[error("failed to serialize state: {0}")]
    Serialize(#[from] toml::ser::Error),
}

/// Reads a TOML state file; `Ok(None)` when it does not exist yet.
///
/// # Errors
///
/// Returns [`StateError`] on I/O failures other than "not found", or if the
/// content does not parse.
pub fn read_toml<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, StateError> {
    match std::fs::read_to_string(path) {
        Ok(contents) => Ok(Some(toml::from_str(&contents)?)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(source) => Err(StateError::Io {
            path: path.to_path_buf(),
            source,
        }),
    }
}

/// Writes a TOML state file, creating parent directories as needed.
///
/// # Errors
///
/// Returns [`StateError`] if serialization or any filesystem step fails.
pub fn write_toml<T: Serialize>(path: &Path, value: &T) -> Result<(), StateError> {
    let rendered = toml::to_string(value)?;
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|source| StateError::Io {
            path: parent.to_path_buf(),
            source,
        })?;
    }
    std::fs::write(path, rendered).map_err(|source| StateError::Io {
        path: path.to_path_buf(),
        source,
    })
}
