//! Grammar generator CLI discovery and the generation ABI.

use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::OnceLock;

use crate::error::ToolchainError;
use crate::locate;

/// ABI passed to `tree-sitter generate --abi` when no override is set.
const DEFAULT_GENERATE_ABI: u32 = 14;

/// Information about a detected `tree-sitter` CLI installation.
#[derive(Debug, Clone)]
pub struct GeneratorInfo {
    /// Absolute path to the CLI binary.
    pub path: PathBuf,
    /// Parsed CLI version, when the probe succeeds.
    pub version: Option<String>,
}

/// Locate the `tree-sitter` CLI and probe its version.
///
/// The version probe is best-effort; a CLI that cannot report its version
/// is still usable for generation.
///
/// # Errors
/// Returns [`ToolchainError::GeneratorNotFound`] when the CLI is absent.
pub fn resolve_generator() -> Result<GeneratorInfo, ToolchainError> {
    let path = locate::resolve_or("tree-sitter", ToolchainError::GeneratorNotFound)?;
    let version = query_version(&path);
    Ok(GeneratorInfo { path, version })
}

/// Locate `npm` for grammar dependency bootstrap.
///
/// # Errors
/// Returns [`ToolchainError::NpmNotFound`] when npm is absent.
pub fn resolve_npm() -> Result<PathBuf, ToolchainError> {
    locate::resolve_or("npm", ToolchainError::NpmNotFound)
}

/// The language ABI passed to the generation step.
///
/// Resolved once per process and cached: the `PARSNIP_GENERATE_ABI`
/// environment variable wins when it parses as an integer, otherwise the
/// built-in default applies. Every pipeline built afterwards reuses the
/// same value.
pub fn generate_abi() -> u32 {
    static ABI: OnceLock<u32> = OnceLock::new();
    *ABI.get_or_init(|| {
        std::env::var("PARSNIP_GENERATE_ABI")
            .ok()
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(DEFAULT_GENERATE_ABI)
    })
}

fn query_version(path: &Path) -> Option<String> {
    let output = Command::new(path).arg("--version").output().ok()?;
    let stdout = String::from_utf8_lossy(&output.stdout);
    parse_version(stdout.trim())
}

/// Parse a semver version from raw `tree-sitter --version` output.
///
/// Handles formats like:
/// - `tree-sitter 0.22.6 (3b0159d25559b603af566ade3c83d930bf466e33)`
/// - `tree-sitter 0.22.6`
/// - `0.22.6`
pub fn parse_version(raw: &str) -> Option<String> {
    for token in raw.split_whitespace() {
        let trimmed = token.trim_start_matches('v');
        if is_semver_like(trimmed) {
            return Some(trimmed.to_owned());
        }
    }
    None
}

fn is_semver_like(s: &str) -> bool {
    let mut parts = s.split('.');
    let Some(major) = parts.next() else {
        return false;
    };
    let Some(minor) = parts.next() else {
        return false;
    };
    let Some(patch_part) = parts.next() else {
        return false;
    };
    if parts.next().is_some() {
        return false;
    }

    // patch_part may carry a pre-release suffix like "6-rc1".
    let patch = patch_part.split('-').next().unwrap_or(patch_part);

    !major.is_empty()
        && major.chars().all(|c| c.is_ascii_digit())
        && minor.chars().all(|c| c.is_ascii_digit())
        && patch.chars().all(|c| c.is_ascii_digit())
}
