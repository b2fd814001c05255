//! Layout of the parsnip install root.
//!
//! Everything parsnip writes lives under one root directory:
//!
//! - `parser/<grammar>.so`: compiled parser libraries
//! - `rev/<grammar>.revision`: installed-revision markers
//! - `queries/<grammar>`: query-file associations
//! - `sources/<grammar>`: cached remote source checkouts

use std::path::{Path, PathBuf};

use crate::error::EngineError;

/// Resolved install locations for one run.
#[derive(Debug, Clone)]
pub struct InstallPaths {
    root: PathBuf,
}

impl InstallPaths {
    /// Use an explicit install root.
    pub fn new(root: &Path) -> Self {
        Self {
            root: root.to_path_buf(),
        }
    }

    /// Resolve the default install root (`PARSNIP_HOME` or `~/.parsnip`).
    ///
    /// # Errors
    /// Returns an error if no home directory can be determined.
    pub fn discover() -> Result<Self, EngineError> {
        Ok(Self {
            root: parsnip_util::fs::parsnip_home()?,
        })
    }

    /// The install root itself.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory holding compiled parser libraries.
    pub fn parser_dir(&self) -> PathBuf {
        self.root.join("parser")
    }

    /// The compiled parser library for one grammar.
    pub fn parser_path(&self, id: &str) -> PathBuf {
        self.parser_dir().join(format!("{id}.so"))
    }

    /// Directory holding installed-revision markers.
    pub fn marker_dir(&self) -> PathBuf {
        self.root.join("rev")
    }

    /// The installed-revision marker for one grammar.
    pub fn marker_path(&self, id: &str) -> PathBuf {
        self.marker_dir().join(format!("{id}.revision"))
    }

    /// Directory holding cached remote source checkouts.
    pub fn sources_dir(&self) -> PathBuf {
        self.root.join("sources")
    }

    /// The cached source checkout for one grammar.
    pub fn source_path(&self, id: &str) -> PathBuf {
        self.sources_dir().join(id)
    }

    /// Directory holding query-file associations.
    pub fn query_dir(&self) -> PathBuf {
        self.root.join("queries")
    }

    /// The query-file association for one grammar.
    pub fn query_path(&self, id: &str) -> PathBuf {
        self.query_dir().join(id)
    }

    /// Default location of the grammar registry.
    pub fn registry_path(&self) -> PathBuf {
        self.root.join("grammars.toml")
    }

    /// Default location of the revision lockfile.
    pub fn lockfile_path(&self) -> PathBuf {
        self.root.join("lockfile.json")
    }
}
