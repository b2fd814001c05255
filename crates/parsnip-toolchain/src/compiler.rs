//! C compiler resolution and compile invocation construction.

use std::path::{Path, PathBuf};

use crate::error::ToolchainError;
use crate::locate;

/// Compilers tried in order when the `CC` environment variable is unset or
/// does not resolve to an executable.
const FALLBACK_COMPILERS: &[&str] = &["cc", "gcc", "clang", "cl", "zig"];

/// Where grammar repositories keep their headers, relative to the working
/// directory.
const HEADER_DIR: &str = "src";

/// Information about a resolved C compiler.
#[derive(Debug, Clone)]
pub struct CompilerInfo {
    /// Absolute path to the compiler binary.
    pub path: PathBuf,
    /// The bare tool name, used to pick the argument family.
    pub name: String,
}

/// The argument dialect a compiler speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Family {
    /// GCC-style drivers: cc, gcc, clang.
    Posix,
    /// MSVC's cl.exe.
    Msvc,
    /// The zig compiler driving its bundled clang (`zig c++`).
    Zig,
}

impl CompilerInfo {
    fn family(&self) -> Family {
        if self.name == "cl" || self.name.starts_with("cl.") {
            Family::Msvc
        } else if self.name == "zig" || self.name.starts_with("zig.") {
            Family::Zig
        } else {
            Family::Posix
        }
    }
}

/// Locate a usable C compiler.
///
/// Tries the `CC` environment variable first, then a fixed list of common
/// compilers; the first candidate that resolves to an executable wins.
///
/// # Errors
/// Returns [`ToolchainError::CompilerNotFound`] when no candidate resolves.
pub fn resolve_compiler() -> Result<CompilerInfo, ToolchainError> {
    let mut candidates: Vec<String> = Vec::new();
    if let Ok(cc) = std::env::var("CC") {
        if !cc.is_empty() {
            candidates.push(cc);
        }
    }
    candidates.extend(FALLBACK_COMPILERS.iter().map(|c| (*c).to_owned()));

    for candidate in &candidates {
        if let Some(path) = locate::resolve(candidate) {
            let name = path
                .file_name()
                .and_then(|n| n.to_str())
                .unwrap_or(candidate)
                .to_owned();
            return Ok(CompilerInfo { path, name });
        }
    }

    Err(ToolchainError::CompilerNotFound {
        tried: candidates.join(", "),
    })
}

/// Builder for a parser compile invocation.
///
/// Produces the argument list for building a shared parser library out of
/// the grammar's C/C++ translation units.
#[derive(Debug, Default)]
pub struct CompileCommand {
    sources: Vec<String>,
    output: Option<String>,
}

impl CompileCommand {
    /// Create a new empty command builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the translation units, relative to the working directory.
    pub fn sources(mut self, files: &[String]) -> Self {
        self.sources = files.to_vec();
        self
    }

    /// Set the output library path, relative to the working directory.
    pub fn output(mut self, path: &str) -> Self {
        self.output = Some(path.to_owned());
        self
    }

    fn has_cxx_sources(&self) -> bool {
        self.sources.iter().any(|s| {
            Path::new(s)
                .extension()
                .and_then(|e| e.to_str())
                .is_some_and(|e| e == "cc" || e == "cpp" || e == "cxx")
        })
    }

    /// Build the argument list for the given compiler without executing.
    ///
    /// # Errors
    /// Returns an error if sources or the output path are not set.
    pub fn build_args(&self, compiler: &CompilerInfo) -> Result<Vec<String>, ToolchainError> {
        if self.sources.is_empty() {
            return Err(ToolchainError::NoSources);
        }
        let Some(output) = &self.output else {
            return Err(ToolchainError::NoOutput);
        };

        let mut args = Vec::new();
        match compiler.family() {
            Family::Msvc => {
                args.push("/nologo".to_owned());
                args.push("/LD".to_owned());
                args.push("/O2".to_owned());
                args.push(format!("/I{HEADER_DIR}"));
                args.extend(self.sources.iter().cloned());
                args.push(format!("/Fe:{output}"));
            }
            family @ (Family::Posix | Family::Zig) => {
                if family == Family::Zig {
                    // zig fronts its bundled clang through a subcommand.
                    args.push("c++".to_owned());
                }
                args.push("-o".to_owned());
                args.push(output.clone());
                args.push("-I".to_owned());
                args.push(HEADER_DIR.to_owned());
                args.extend(self.sources.iter().cloned());
                args.push("-shared".to_owned());
                args.push("-Os".to_owned());
                args.push("-fPIC".to_owned());
                if family == Family::Posix && self.has_cxx_sources() {
                    args.push("-lstdc++".to_owned());
                }
            }
        }

        Ok(args)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn info(name: &str) -> CompilerInfo {
        CompilerInfo {
            path: PathBuf::from(format!("/usr/bin/{name}")),
            name: name.to_owned(),
        }
    }

    #[test]
    fn posix_args_build_shared_library() {
        let args = CompileCommand::new()
            .sources(&["src/parser.c".to_owned()])
            .output("parser.so")
            .build_args(&info("cc"))
            .unwrap();
        assert_eq!(
            args,
            vec![
                "-o", "parser.so", "-I", "src", "src/parser.c", "-shared", "-Os", "-fPIC",
            ]
        );
    }

    #[test]
    fn cxx_scanner_links_stdcxx() {
        let args = CompileCommand::new()
            .sources(&["src/parser.c".to_owned(), "src/scanner.cc".to_owned()])
            .output("parser.so")
            .build_args(&info("gcc"))
            .unwrap();
        assert_eq!(args.last().map(String::as_str), Some("-lstdc++"));
    }

    #[test]
    fn msvc_args_use_cl_dialect() {
        let args = CompileCommand::new()
            .sources(&["src/parser.c".to_owned()])
            .output("parser.so")
            .build_args(&info("cl"))
            .unwrap();
        assert!(args.contains(&"/LD".to_owned()));
        assert!(args.contains(&"/Fe:parser.so".to_owned()));
        assert!(!args.contains(&"-shared".to_owned()));
    }

    #[test]
    fn zig_prepends_subcommand() {
        let args = CompileCommand::new()
            .sources(&["src/parser.c".to_owned()])
            .output("parser.so")
            .build_args(&info("zig"))
            .unwrap();
        assert_eq!(args.first().map(String::as_str), Some("c++"));
    }

    #[test]
    fn empty_sources_is_an_error() {
        let result = CompileCommand::new().output("parser.so").build_args(&info("cc"));
        assert!(matches!(result, Err(ToolchainError::NoSources)));
    }

    #[test]
    fn missing_output_is_an_error() {
        let result = CompileCommand::new()
            .sources(&["src/parser.c".to_owned()])
            .build_args(&info("cc"));
        assert!(matches!(result, Err(ToolchainError::NoOutput)));
    }
}
