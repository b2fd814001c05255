//! Error types for parsnip-toolchain.

/// Errors produced by tool discovery and invocation building.
#[derive(Debug, thiserror::Error)]
pub enum ToolchainError {
    /// No usable C compiler could be located.
    #[error("no usable C compiler found (tried {tried}) — install one or point the CC environment variable at it")]
    CompilerNotFound { tried: String },

    /// The grammar generator CLI is not installed.
    #[error("tree-sitter CLI not found — install it and add it to PATH, it is required to generate this parser from its grammar")]
    GeneratorNotFound,

    /// npm is required to bootstrap grammar dependencies but is missing.
    #[error("npm not found — install Node.js and add npm to PATH, it is required to bootstrap this grammar before generation")]
    NpmNotFound,

    /// git is not installed.
    #[error("git not found — install git and add it to PATH, it is required to fetch remote grammar sources")]
    GitNotFound,

    /// No source files were given to the compile command.
    #[error("no source files specified — the grammar's file list is empty")]
    NoSources,

    /// No output path was given to the compile command.
    #[error("no output path specified — set the parser library path")]
    NoOutput,
}
