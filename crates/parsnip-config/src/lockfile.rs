use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

/// The `lockfile.json` revision record: grammar id → pinned revision.
///
/// Read once at the start of a batch and treated as read-only for the rest
/// of the run.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Lockfile {
    entries: BTreeMap<String, LockEntry>,
}

/// One locked revision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockEntry {
    pub revision: String,
}

impl Lockfile {
    /// Read and parse a `lockfile.json` from the given path.
    /// Returns an empty lockfile if the file does not exist.
    ///
    /// # Errors
    /// Returns an error if the file exists but cannot be read or contains
    /// invalid JSON.
    pub fn from_path(path: &Path) -> Result<Self, LockfileError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path).map_err(|e| LockfileError::Read {
            path: path.display().to_string(),
            source: e,
        })?;
        serde_json::from_str(&content).map_err(|e| LockfileError::Parse {
            path: path.display().to_string(),
            source: e,
        })
    }

    /// The locked revision for a grammar, if any.
    pub fn revision(&self, id: &str) -> Option<&str> {
        self.entries.get(id).map(|e| e.revision.as_str())
    }

    /// Pin a grammar to a revision, replacing any previous pin.
    pub fn pin(&mut self, id: &str, revision: &str) {
        self.entries.insert(
            id.to_owned(),
            LockEntry {
                revision: revision.to_owned(),
            },
        );
    }

    /// Number of pinned grammars.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the lockfile pins nothing.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Write the lockfile to disk as pretty-printed JSON.
    ///
    /// Uses atomic write (write-to-temp-then-rename) to prevent partial
    /// writes from corrupting the lockfile.
    ///
    /// # Errors
    /// Returns an error if serialization fails or the file cannot be written.
    pub fn write_to(&self, path: &Path) -> Result<(), LockfileError> {
        let content =
            serde_json::to_string_pretty(self).map_err(|e| LockfileError::Serialize { source: e })?;
        let tmp_path = path.with_extension("json.tmp");
        std::fs::write(&tmp_path, &content).map_err(|e| LockfileError::Write {
            path: tmp_path.display().to_string(),
            source: e,
        })?;
        std::fs::rename(&tmp_path, path).map_err(|e| LockfileError::Write {
            path: path.display().to_string(),
            source: e,
        })?;
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum LockfileError {
    #[error("cannot read {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error("invalid lockfile.json at {path}: {source}")]
    Parse {
        path: String,
        source: serde_json::Error,
    },
    #[error("cannot serialize lockfile: {source}")]
    Serialize { source: serde_json::Error },
    #[error("cannot write {path}: {source}")]
    Write {
        path: String,
        source: std::io::Error,
    },
}
