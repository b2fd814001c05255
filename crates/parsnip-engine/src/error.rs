//! Error types for parsnip-engine.

/// Errors produced before a pipeline starts executing.
///
/// Step failures are not represented here: they terminate only the owning
/// pipeline and travel in [`crate::runner::RunStatus`] instead.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// A grammar's install specification is missing a required field.
    #[error("grammar `{grammar}` is missing required field `{field}` in the registry")]
    Configuration { grammar: String, field: String },

    /// A required external tool cannot be located.
    #[error("{0}")]
    Toolchain(#[from] parsnip_toolchain::ToolchainError),

    /// The requested grammar is not tracked as installed.
    #[error("grammar `{name}` is not installed")]
    NotInstalled { name: String },

    /// A registry operation failed.
    #[error("{0}")]
    Registry(#[from] parsnip_config::registry::RegistryError),

    /// A lockfile operation failed.
    #[error("{0}")]
    Lockfile(#[from] parsnip_config::lockfile::LockfileError),

    /// A utility operation failed.
    #[error("{0}")]
    Util(#[from] parsnip_util::error::UtilError),

    /// A filesystem operation failed.
    #[error("cannot access {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
}
