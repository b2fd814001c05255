//! Revision resolution: which revision a grammar should be built at, and
//! whether the installed artifact is already there.

use parsnip_config::{Lockfile, Registry};
use parsnip_util::fs::{ensure_dir, remove_file_if_exists};

use crate::error::EngineError;
use crate::paths::InstallPaths;

/// Decides the desired revision for a grammar and compares it against the
/// recorded installed revision.
#[derive(Debug)]
pub struct RevisionResolver<'a> {
    registry: &'a Registry,
    lockfile: &'a Lockfile,
    paths: &'a InstallPaths,
}

impl<'a> RevisionResolver<'a> {
    pub fn new(registry: &'a Registry, lockfile: &'a Lockfile, paths: &'a InstallPaths) -> Self {
        Self {
            registry,
            lockfile,
            paths,
        }
    }

    /// The desired revision for a grammar.
    ///
    /// An explicit revision in the install spec wins; otherwise the
    /// lockfile entry applies. Absent both, the grammar is unpinned and
    /// whatever the fetch produces is accepted.
    pub fn resolve(&self, id: &str) -> Option<String> {
        self.registry
            .spec(id)
            .and_then(|spec| spec.revision.clone())
            .or_else(|| self.lockfile.revision(id).map(str::to_owned))
    }

    /// The revision recorded by the last successful install, if any.
    ///
    /// Read failures degrade to `None`; a half-written or unreadable marker
    /// must never make a grammar look up to date.
    pub fn installed_revision(&self, id: &str) -> Option<String> {
        let content = std::fs::read_to_string(self.paths.marker_path(id)).ok()?;
        let line = content.lines().next()?.trim();
        if line.is_empty() {
            None
        } else {
            Some(line.to_owned())
        }
    }

    /// Whether the grammar needs a rebuild.
    ///
    /// True when the desired revision is unpinned, when no marker exists,
    /// or when the marker differs from the desired revision. Total: every
    /// grammar gets a yes/no answer, never an error.
    pub fn needs_update(&self, id: &str) -> bool {
        match self.resolve(id) {
            None => true,
            Some(desired) => self
                .installed_revision(id)
                .is_none_or(|installed| installed != desired),
        }
    }
}

/// Record the revision actually built, as the pipeline's success-path step.
///
/// # Errors
/// Returns an error if the marker directory or file cannot be written.
pub fn write_marker(paths: &InstallPaths, id: &str, revision: &str) -> Result<(), EngineError> {
    ensure_dir(&paths.marker_dir())?;
    let marker = paths.marker_path(id);
    std::fs::write(&marker, format!("{revision}\n")).map_err(|source| EngineError::Io {
        path: marker.display().to_string(),
        source,
    })
}

/// Remove a grammar's marker, used for unpinned builds and uninstall.
///
/// # Errors
/// Returns an error if an existing marker cannot be removed.
pub fn clear_marker(paths: &InstallPaths, id: &str) -> Result<(), EngineError> {
    remove_file_if_exists(&paths.marker_path(id))?;
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use parsnip_config::Registry;

    use super::*;

    fn registry() -> Registry {
        Registry::from_str(
            r#"
[grammars.pinned]
source = "https://github.com/tree-sitter/tree-sitter-rust"
revision = "abc123"

[grammars.unpinned]
source = "https://github.com/tree-sitter/tree-sitter-c"
"#,
            "test",
        )
        .unwrap()
    }

    fn lockfile() -> Lockfile {
        let mut lockfile = Lockfile::default();
        lockfile.pin("pinned", "lock-rev");
        lockfile.pin("unpinned", "lock-rev-c");
        lockfile
    }

    #[test]
    fn explicit_revision_beats_lockfile() {
        let registry = registry();
        let lockfile = lockfile();
        let tmp = tempfile::tempdir().unwrap();
        let paths = InstallPaths::new(tmp.path());
        let resolver = RevisionResolver::new(&registry, &lockfile, &paths);

        assert_eq!(resolver.resolve("pinned").as_deref(), Some("abc123"));
    }

    #[test]
    fn lockfile_applies_when_spec_is_silent() {
        let registry = registry();
        let lockfile = lockfile();
        let tmp = tempfile::tempdir().unwrap();
        let paths = InstallPaths::new(tmp.path());
        let resolver = RevisionResolver::new(&registry, &lockfile, &paths);

        assert_eq!(resolver.resolve("unpinned").as_deref(), Some("lock-rev-c"));
    }

    #[test]
    fn absent_everywhere_resolves_to_none() {
        let registry = registry();
        let lockfile = Lockfile::default();
        let tmp = tempfile::tempdir().unwrap();
        let paths = InstallPaths::new(tmp.path());
        let resolver = RevisionResolver::new(&registry, &lockfile, &paths);

        assert_eq!(resolver.resolve("unpinned"), None);
        assert!(resolver.needs_update("unpinned"));
    }

    #[test]
    fn explicit_revision_without_lockfile_or_marker_needs_update() {
        let registry = registry();
        let lockfile = Lockfile::default();
        let tmp = tempfile::tempdir().unwrap();
        let paths = InstallPaths::new(tmp.path());
        let resolver = RevisionResolver::new(&registry, &lockfile, &paths);

        assert!(resolver.needs_update("pinned"));
        assert_eq!(resolver.resolve("pinned").as_deref(), Some("abc123"));
    }

    #[test]
    fn marker_match_means_up_to_date() {
        let registry = registry();
        let lockfile = lockfile();
        let tmp = tempfile::tempdir().unwrap();
        let paths = InstallPaths::new(tmp.path());

        write_marker(&paths, "pinned", "abc123").unwrap();
        let resolver = RevisionResolver::new(&registry, &lockfile, &paths);
        assert!(!resolver.needs_update("pinned"));
    }

    #[test]
    fn marker_mismatch_needs_update() {
        let registry = registry();
        let lockfile = lockfile();
        let tmp = tempfile::tempdir().unwrap();
        let paths = InstallPaths::new(tmp.path());

        write_marker(&paths, "pinned", "something-older").unwrap();
        let resolver = RevisionResolver::new(&registry, &lockfile, &paths);
        assert!(resolver.needs_update("pinned"));
    }

    #[test]
    fn marker_round_trip_reads_single_line() {
        let registry = registry();
        let lockfile = lockfile();
        let tmp = tempfile::tempdir().unwrap();
        let paths = InstallPaths::new(tmp.path());

        write_marker(&paths, "pinned", "abc123").unwrap();
        let resolver = RevisionResolver::new(&registry, &lockfile, &paths);
        assert_eq!(resolver.installed_revision("pinned").as_deref(), Some("abc123"));

        clear_marker(&paths, "pinned").unwrap();
        assert_eq!(resolver.installed_revision("pinned"), None);
    }

    #[test]
    fn empty_marker_reads_as_absent() {
        let registry = registry();
        let lockfile = lockfile();
        let tmp = tempfile::tempdir().unwrap();
        let paths = InstallPaths::new(tmp.path());

        ensure_dir(&paths.marker_dir()).unwrap();
        std::fs::write(paths.marker_path("pinned"), "\n").unwrap();
        let resolver = RevisionResolver::new(&registry, &lockfile, &paths);
        assert_eq!(resolver.installed_revision("pinned"), None);
        assert!(resolver.needs_update("pinned"));
    }
}
