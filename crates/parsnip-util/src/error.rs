//! Error types for parsnip-util.

/// Errors produced by utility functions.
#[derive(Debug, thiserror::Error)]
pub enum UtilError {
    /// An I/O operation failed.
    #[error("cannot access {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    /// A command failed to execute.
    #[error("cannot execute command: {source}")]
    CommandExec { source: std::io::Error },

    /// A download failed.
    #[error("download failed: {message}")]
    Download { message: String },

    /// A tarball could not be unpacked.
    #[error("cannot unpack {path}: {message}")]
    Unpack { path: String, message: String },

    /// A tarball entry attempted to escape the extraction directory.
    #[error("archive contains path traversal entry \"{entry_path}\" that escapes {dest}")]
    PathTraversal { entry_path: String, dest: String },

    /// Cannot determine the user's home directory.
    #[error("cannot determine home directory — set the HOME environment variable")]
    NoHomeDir,
}
