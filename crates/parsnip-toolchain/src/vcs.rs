//! Version-control tool discovery.

use std::path::PathBuf;

use crate::error::ToolchainError;
use crate::locate;

/// Locate `git` for fetching remote grammar sources.
///
/// # Errors
/// Returns [`ToolchainError::GitNotFound`] when git is absent.
pub fn resolve_git() -> Result<PathBuf, ToolchainError> {
    locate::resolve_or("git", ToolchainError::GitNotFound)
}
