use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

/// The token that expands to every grammar in the registry.
pub const ALL: &str = "all";

/// The `grammars.toml` registry: every grammar parsnip knows how to install,
/// plus group aliases and the user's ignore list.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Registry {
    #[serde(default)]
    pub grammars: BTreeMap<String, GrammarSpec>,
    /// Named collections that expand to their member grammars.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub groups: BTreeMap<String, Vec<String>>,
    /// Grammars excluded from batch requests when the caller asks for it.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ignored: Vec<String>,
}

/// One grammar's install specification. Immutable once loaded for a run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GrammarSpec {
    /// Remote repository URL or local filesystem path. Required, but its
    /// absence aborts only the one grammar, so it stays optional here.
    #[serde(default)]
    pub source: Option<String>,
    /// Pinned revision; overrides any lockfile entry.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revision: Option<String>,
    /// Whether the parser source must be generated from the grammar first.
    #[serde(default)]
    pub generate: bool,
    /// Whether generation needs a package-manager bootstrap (`npm install`).
    #[serde(default)]
    pub needs_bootstrap: bool,
    /// Subpath within the source that holds the actual grammar.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    /// Translation units handed to the compiler, relative to the working
    /// directory. Empty means the default `src/parser.c`.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub files: Vec<String>,
}

impl GrammarSpec {
    /// Whether the source points at a remote repository rather than a
    /// local filesystem path.
    pub fn is_remote(&self) -> bool {
        self.source
            .as_deref()
            .is_some_and(|s| s.contains("://") || s.starts_with("git@"))
    }

    /// The compile file list, with the default applied.
    pub fn compile_files(&self) -> Vec<String> {
        if self.files.is_empty() {
            vec!["src/parser.c".to_owned()]
        } else {
            self.files.clone()
        }
    }
}

impl Registry {
    /// Read and parse a `grammars.toml` from the given path.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or contains invalid TOML.
    pub fn from_path(path: &Path) -> Result<Self, RegistryError> {
        let content = std::fs::read_to_string(path).map_err(|e| RegistryError::Read {
            path: path.display().to_string(),
            source: e,
        })?;
        Self::from_str(&content, &path.display().to_string())
    }

    /// Parse registry content, with `origin` used in error messages.
    ///
    /// # Errors
    /// Returns an error if the content is not valid TOML.
    pub fn from_str(content: &str, origin: &str) -> Result<Self, RegistryError> {
        toml::from_str(content).map_err(|e| RegistryError::Parse {
            path: origin.to_owned(),
            source: e,
        })
    }

    /// Look up a grammar's install specification.
    pub fn spec(&self, id: &str) -> Option<&GrammarSpec> {
        self.grammars.get(id)
    }

    /// Whether the user has explicitly ignored this grammar.
    pub fn is_ignored(&self, id: &str) -> bool {
        self.ignored.iter().any(|i| i == id)
    }

    /// Expand a batch request into concrete grammar ids.
    ///
    /// The `all` token expands to every registered grammar; group aliases
    /// expand to their members and replace the alias in place; anything else
    /// passes through unchanged (unknown names are the caller's problem).
    /// Duplicates are dropped, keeping the first occurrence's position.
    pub fn expand(&self, requested: &[String]) -> Vec<String> {
        let mut out = Vec::new();
        let mut seen = std::collections::BTreeSet::new();

        let mut push = |id: &str, out: &mut Vec<String>| {
            if seen.insert(id.to_owned()) {
                out.push(id.to_owned());
            }
        };

        for name in requested {
            if name == ALL {
                for id in self.grammars.keys() {
                    push(id, &mut out);
                }
            } else if let Some(members) = self.groups.get(name) {
                for id in members {
                    push(id, &mut out);
                }
            } else {
                push(name, &mut out);
            }
        }

        out
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("cannot read {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error("invalid grammars.toml at {path}: {source}")]
    Parse {
        path: String,
        source: toml::de::Error,
    },
}
