//! Pipeline orchestration for grammar installs: revision resolution, step
//! sequence construction, synchronous and asynchronous execution, progress
//! accounting, and the install/update/uninstall coordinator.

pub mod error;
pub mod install;
pub mod paths;
pub mod pipeline;
pub mod progress;
pub mod revision;
pub mod runner;

pub use error::EngineError;
pub use install::{BatchReport, Coordinator, InstallOptions};
pub use paths::InstallPaths;
pub use pipeline::{ActionStep, BuildContext, Pipeline, ShellStep, Step};
pub use progress::Progress;
pub use revision::RevisionResolver;
pub use runner::{run_sync, Executor, RunReport, RunStatus};
