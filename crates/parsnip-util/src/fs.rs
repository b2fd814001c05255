//! Filesystem utilities for parsnip.

use std::path::{Path, PathBuf};

use crate::error::UtilError;

/// Create a directory and all parent directories if they do not exist.
///
/// # Errors
/// Returns an error if the directory cannot be created.
pub fn ensure_dir(path: &Path) -> Result<(), UtilError> {
    std::fs::create_dir_all(path).map_err(|source| UtilError::Io {
        path: path.display().to_string(),
        source,
    })
}

/// Move `src` to `dest`, replacing any existing file at `dest`.
///
/// Tries a rename first and falls back to copy-then-remove when the two
/// paths live on different filesystems.
///
/// # Errors
/// Returns an error if both the rename and the copy fail.
pub fn move_file(src: &Path, dest: &Path) -> Result<(), UtilError> {
    if let Some(parent) = dest.parent() {
        ensure_dir(parent)?;
    }

    if std::fs::rename(src, dest).is_ok() {
        return Ok(());
    }

    std::fs::copy(src, dest).map_err(|source| UtilError::Io {
        path: dest.display().to_string(),
        source,
    })?;
    std::fs::remove_file(src).map_err(|source| UtilError::Io {
        path: src.display().to_string(),
        source,
    })?;
    Ok(())
}

/// Remove a directory and all its contents. No error if the directory is absent.
///
/// # Errors
/// Returns an error if the directory exists but cannot be removed.
pub fn remove_dir_all_if_exists(path: &Path) -> Result<(), UtilError> {
    match std::fs::remove_dir_all(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(source) => Err(UtilError::Io {
            path: path.display().to_string(),
            source,
        }),
    }
}

/// Remove a file or symlink. No error if it is absent.
///
/// # Errors
/// Returns an error if the file exists but cannot be removed.
pub fn remove_file_if_exists(path: &Path) -> Result<(), UtilError> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(source) => Err(UtilError::Io {
            path: path.display().to_string(),
            source,
        }),
    }
}

/// Create a symbolic link at `link` pointing to the directory `target`,
/// replacing any previous link.
///
/// On platforms without symlink support (or when the link cannot be
/// created), the directory contents are copied instead, so `link` always
/// ends up resolving to the same file set.
///
/// # Errors
/// Returns an error if neither linking nor copying succeeds.
pub fn link_dir(target: &Path, link: &Path) -> Result<(), UtilError> {
    if let Some(parent) = link.parent() {
        ensure_dir(parent)?;
    }
    remove_file_if_exists(link)?;

    #[cfg(unix)]
    {
        if std::os::unix::fs::symlink(target, link).is_ok() {
            return Ok(());
        }
    }

    // Fallback: materialize a copy of the directory tree.
    remove_dir_all_if_exists(link)?;
    copy_dir(target, link)
}

fn copy_dir(src: &Path, dest: &Path) -> Result<(), UtilError> {
    ensure_dir(dest)?;
    let entries = std::fs::read_dir(src).map_err(|source| UtilError::Io {
        path: src.display().to_string(),
        source,
    })?;
    for entry in entries {
        let entry = entry.map_err(|source| UtilError::Io {
            path: src.display().to_string(),
            source,
        })?;
        let from = entry.path();
        let to = dest.join(entry.file_name());
        if from.is_dir() {
            copy_dir(&from, &to)?;
        } else {
            std::fs::copy(&from, &to).map_err(|source| UtilError::Io {
                path: to.display().to_string(),
                source,
            })?;
        }
    }
    Ok(())
}

/// Return the parsnip home directory.
///
/// Resolves `PARSNIP_HOME` first, then `~/.parsnip` via `HOME` (Unix) or
/// `USERPROFILE` (Windows).
///
/// # Errors
/// Returns an error if no relevant environment variable is set.
pub fn parsnip_home() -> Result<PathBuf, UtilError> {
    if let Ok(home) = std::env::var("PARSNIP_HOME") {
        if !home.is_empty() {
            return Ok(PathBuf::from(home));
        }
    }
    let home = std::env::var("HOME")
        .or_else(|_| std::env::var("USERPROFILE"))
        .map(PathBuf::from)
        .map_err(|_| UtilError::NoHomeDir)?;
    Ok(home.join(".parsnip"))
}
