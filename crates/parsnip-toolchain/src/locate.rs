//! Shared executable lookup used by every tool resolver.

use std::path::{Path, PathBuf};
use std::process::Command;

use crate::error::ToolchainError;

/// Locate `tool` on PATH via `which`.
pub fn which(tool: &str) -> Option<PathBuf> {
    let output = Command::new("which").arg(tool).output().ok()?;
    if !output.status.success() {
        return None;
    }
    let path_str = String::from_utf8_lossy(&output.stdout);
    let trimmed = path_str.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(PathBuf::from(trimmed))
    }
}

/// Whether the file at `path` exists and has an execute bit set.
pub fn is_executable(path: &Path) -> bool {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        match std::fs::metadata(path) {
            Ok(metadata) => metadata.is_file() && metadata.permissions().mode() & 0o111 != 0,
            Err(_) => false,
        }
    }
    #[cfg(not(unix))]
    {
        path.is_file()
    }
}

/// Resolve a tool name or explicit path to an executable binary.
///
/// Names containing a path separator are checked directly; bare names go
/// through PATH lookup.
pub fn resolve(candidate: &str) -> Option<PathBuf> {
    let as_path = Path::new(candidate);
    if candidate.contains(std::path::MAIN_SEPARATOR) {
        if is_executable(as_path) {
            return Some(as_path.to_path_buf());
        }
        return None;
    }
    which(candidate).filter(|p| is_executable(p))
}

/// Like [`resolve`], but a missing tool becomes the given error.
///
/// # Errors
/// Returns `missing` when the tool cannot be located or is not executable.
pub fn resolve_or(candidate: &str, missing: ToolchainError) -> Result<PathBuf, ToolchainError> {
    resolve(candidate).ok_or(missing)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn which_finds_sh() {
        // `sh` is present on every platform these tests run on.
        let path = which("sh");
        assert!(path.is_some());
        assert!(is_executable(&path.unwrap()));
    }

    #[test]
    fn which_missing_tool_is_none() {
        assert!(which("parsnip_no_such_tool_xyz").is_none());
    }

    #[cfg(unix)]
    #[test]
    fn is_executable_rejects_plain_file() {
        let tmp = tempfile::tempdir().unwrap();
        let file = tmp.path().join("data.txt");
        std::fs::write(&file, b"not a binary").unwrap();
        assert!(!is_executable(&file));
    }

    #[test]
    fn resolve_explicit_path_must_exist() {
        assert!(resolve("/no/such/dir/cc").is_none());
    }

    #[test]
    fn resolve_or_maps_to_error() {
        let result = resolve_or("parsnip_no_such_tool_xyz", ToolchainError::GitNotFound);
        assert!(matches!(result, Err(ToolchainError::GitNotFound)));
    }
}
