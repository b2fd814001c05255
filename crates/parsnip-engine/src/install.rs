//! The install coordinator: expand batch requests, filter ignored
//! grammars, and drive one pipeline per target through the resolver, the
//! builder, and the orchestrator.

use std::path::PathBuf;

use parsnip_config::{Lockfile, Registry};

use crate::error::EngineError;
use crate::paths::InstallPaths;
use crate::pipeline::{self, BuildContext, Pipeline};
use crate::progress::Progress;
use crate::revision::{self, RevisionResolver};
use crate::runner::{run_sync, Executor, RunStatus};

/// Options for one install/update batch.
#[derive(Debug, Clone)]
pub struct InstallOptions {
    /// Reinstall without asking, even when already installed and up to date.
    pub force: bool,
    /// Run pipelines one after another, blocking on every step.
    pub sync: bool,
    /// Drop grammars on the user's ignore list from the batch.
    pub exclude_ignored: bool,
    /// Force generation from grammar even for specs that do not request it.
    pub generate_from_source: bool,
}

impl Default for InstallOptions {
    fn default() -> Self {
        Self {
            force: false,
            sync: false,
            exclude_ignored: true,
            generate_from_source: false,
        }
    }
}

/// Per-target results of one batch.
#[derive(Debug, Default)]
pub struct BatchReport {
    /// Targets whose pipeline ran every step.
    pub succeeded: Vec<String>,
    /// Targets dropped before a pipeline was built, with the reason.
    pub skipped: Vec<(String, String)>,
    /// Targets that failed, with the error (including captured output).
    pub failed: Vec<(String, String)>,
}

impl BatchReport {
    /// Whether every target in the batch succeeded or was skipped.
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Yes/no confirmation hook. The engine never reads stdin itself; callers
/// inject an interactive prompt (or keep the auto-confirm default).
pub type ConfirmFn<'a> = Box<dyn FnMut(&str) -> bool + 'a>;

/// Drives install, update, and uninstall batches.
pub struct Coordinator<'a> {
    registry: &'a Registry,
    lockfile: &'a Lockfile,
    paths: &'a InstallPaths,
    queries_source: Option<PathBuf>,
    progress: Progress,
    confirm: ConfirmFn<'a>,
}

impl<'a> Coordinator<'a> {
    pub fn new(registry: &'a Registry, lockfile: &'a Lockfile, paths: &'a InstallPaths) -> Self {
        Self {
            registry,
            lockfile,
            paths,
            queries_source: None,
            progress: Progress::new(),
            confirm: Box::new(|_| true),
        }
    }

    /// Directory holding bundled query files to associate on install.
    pub fn with_queries_source(mut self, dir: PathBuf) -> Self {
        self.queries_source = Some(dir);
        self
    }

    /// Inject the reinstall confirmation prompt.
    pub fn with_confirm(mut self, confirm: impl FnMut(&str) -> bool + 'a) -> Self {
        self.confirm = Box::new(confirm);
        self
    }

    /// The batch progress counters.
    pub fn progress(&self) -> &Progress {
        &self.progress
    }

    /// Whether a grammar's compiled parser is present.
    pub fn is_installed(&self, id: &str) -> bool {
        self.paths.parser_path(id).is_file()
    }

    /// Every grammar with a compiled parser in the install root, sorted.
    pub fn installed_targets(&self) -> Vec<String> {
        let Ok(entries) = std::fs::read_dir(self.paths.parser_dir()) else {
            return Vec::new();
        };
        let mut targets: Vec<String> = entries
            .filter_map(|entry| {
                let path = entry.ok()?.path();
                if path.extension().and_then(|e| e.to_str()) == Some("so") {
                    Some(path.file_stem()?.to_str()?.to_owned())
                } else {
                    None
                }
            })
            .collect();
        targets.sort();
        targets
    }

    /// Install the requested grammars.
    ///
    /// The request may name concrete grammars, group aliases, or `all`;
    /// expansion and the ignore filter happen here. Each remaining target
    /// gets its own pipeline; a failure in one never affects the others.
    pub fn install(&mut self, requested: &[String], options: &InstallOptions) -> BatchReport {
        // Safe between batches only: a no-op while anything is in flight.
        self.progress.reset();

        let mut report = BatchReport::default();
        let mut pipelines: Vec<Pipeline> = Vec::new();

        for id in self.registry.expand(requested) {
            if options.exclude_ignored && self.registry.is_ignored(&id) {
                report.skipped.push((id, "ignored".to_owned()));
                continue;
            }
            let Some(spec) = self.registry.spec(&id) else {
                report
                    .failed
                    .push((id.clone(), format!("grammar `{id}` is not in the registry")));
                continue;
            };
            if self.is_installed(&id) && !options.force {
                let question = format!("grammar `{id}` is already installed — reinstall?");
                if !(self.confirm)(&question) {
                    report.skipped.push((id, "already installed".to_owned()));
                    continue;
                }
            }

            let resolver = RevisionResolver::new(self.registry, self.lockfile, self.paths);
            let ctx = BuildContext {
                paths: self.paths,
                queries_source: self.queries_source.clone(),
                revision: resolver.resolve(&id),
                force_generate: options.generate_from_source,
            };
            match pipeline::build(&id, spec, &ctx) {
                Ok(built) => pipelines.push(built),
                Err(e) => report.failed.push((id, e.to_string())),
            }
        }

        let run_reports = if options.sync {
            pipelines
                .into_iter()
                .map(|p| run_sync(p, &mut self.progress))
                .collect()
        } else {
            Executor::new().run_all(pipelines, &mut self.progress)
        };

        for run in run_reports {
            match run.status {
                RunStatus::Succeeded => report.succeeded.push(run.target),
                RunStatus::Failed { error, output, .. } => {
                    let detail = if output.is_empty() {
                        error
                    } else {
                        format!("{error}\n{output}")
                    };
                    report.failed.push((run.target, detail));
                }
            }
        }

        report
    }

    /// Update grammars: reinstall at the currently resolved revision.
    ///
    /// With an empty request, the batch is limited to installed grammars
    /// whose marker disagrees with the resolved revision; up-to-date
    /// grammars are not touched and get no notification.
    pub fn update(&mut self, requested: &[String], options: &InstallOptions) -> BatchReport {
        let targets = if requested.is_empty() {
            let resolver = RevisionResolver::new(self.registry, self.lockfile, self.paths);
            self.installed_targets()
                .into_iter()
                .filter(|id| resolver.needs_update(id))
                .collect()
        } else {
            self.registry.expand(requested)
        };

        let forced = InstallOptions {
            force: true,
            ..options.clone()
        };
        self.install(&targets, &forced)
    }

    /// Uninstall grammars: remove the parser, the revision marker, and the
    /// query association.
    ///
    /// A target that is not tracked as installed is reported and skipped;
    /// the rest of the batch still runs.
    pub fn uninstall(&mut self, requested: &[String]) -> BatchReport {
        let mut report = BatchReport::default();

        for id in self.registry.expand(requested) {
            if !self.is_installed(&id) {
                let error = EngineError::NotInstalled { name: id.clone() };
                report.failed.push((id, error.to_string()));
                continue;
            }
            match self.remove_artifacts(&id) {
                Ok(()) => report.succeeded.push(id),
                Err(e) => report.failed.push((id, e.to_string())),
            }
        }

        report
    }

    fn remove_artifacts(&self, id: &str) -> Result<(), EngineError> {
        parsnip_util::fs::remove_file_if_exists(&self.paths.parser_path(id))?;
        revision::clear_marker(self.paths, id)?;
        let query_path = self.paths.query_path(id);
        // The association may be a symlink or a copied directory.
        parsnip_util::fs::remove_file_if_exists(&query_path)?;
        parsnip_util::fs::remove_dir_all_if_exists(&query_path)?;
        Ok(())
    }
}
