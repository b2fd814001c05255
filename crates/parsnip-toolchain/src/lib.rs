//! External tool discovery and invocation argument construction: the C
//! compiler, the grammar generator CLI, the package manager, and git.

pub mod compiler;
pub mod error;
pub mod generator;
pub mod locate;
pub mod vcs;

pub use compiler::{resolve_compiler, CompileCommand, CompilerInfo};
pub use error::ToolchainError;
pub use generator::{generate_abi, resolve_generator, resolve_npm, GeneratorInfo};
pub use vcs::resolve_git;
