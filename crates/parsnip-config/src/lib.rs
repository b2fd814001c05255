//! Parse and validate `grammars.toml` and `lockfile.json`.

pub mod lockfile;
pub mod registry;

pub use lockfile::Lockfile;
pub use registry::Registry;
