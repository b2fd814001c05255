//! Tarball extraction with path-traversal protection.

use std::path::{Component, Path, PathBuf};

use crate::error::UtilError;
use crate::fs::ensure_dir;

/// Unpack a `.tar.gz` archive into `dest`, stripping the single top-level
/// directory that source tarballs (GitHub codeload among them) wrap their
/// contents in.
///
/// Entries whose paths contain `..` components are rejected outright.
///
/// # Errors
/// Returns an error if the archive cannot be read, contains a traversal
/// entry, or an entry cannot be written.
pub fn unpack_tar_gz(archive: &Path, dest: &Path) -> Result<(), UtilError> {
    ensure_dir(dest)?;

    let file = std::fs::File::open(archive).map_err(|source| UtilError::Io {
        path: archive.display().to_string(),
        source,
    })?;
    let decoder = flate2::read::GzDecoder::new(file);
    let mut tarball = tar::Archive::new(decoder);

    let entries = tarball.entries().map_err(|e| UtilError::Unpack {
        path: archive.display().to_string(),
        message: e.to_string(),
    })?;

    for entry in entries {
        let mut entry = entry.map_err(|e| UtilError::Unpack {
            path: archive.display().to_string(),
            message: e.to_string(),
        })?;

        let entry_path = entry
            .path()
            .map_err(|e| UtilError::Unpack {
                path: archive.display().to_string(),
                message: e.to_string(),
            })?
            .into_owned();

        for component in entry_path.components() {
            if matches!(component, Component::ParentDir) {
                return Err(UtilError::PathTraversal {
                    entry_path: entry_path.display().to_string(),
                    dest: dest.display().to_string(),
                });
            }
        }

        // Drop the top-level wrapper directory.
        let Some(stripped) = strip_first_component(&entry_path) else {
            continue;
        };

        let out_path = dest.join(&stripped);
        if entry.header().entry_type().is_dir() {
            ensure_dir(&out_path)?;
            continue;
        }
        if let Some(parent) = out_path.parent() {
            ensure_dir(parent)?;
        }
        entry.unpack(&out_path).map_err(|e| UtilError::Unpack {
            path: archive.display().to_string(),
            message: e.to_string(),
        })?;
    }

    Ok(())
}

fn strip_first_component(path: &Path) -> Option<PathBuf> {
    let mut components = path.components();
    components.next()?;
    let rest: PathBuf = components.as_path().to_path_buf();
    if rest.as_os_str().is_empty() {
        None
    } else {
        Some(rest)
    }
}
