//! Pipeline construction: turn one grammar's install specification into the
//! ordered step sequence that fetches, generates, compiles, and installs it.

use std::fmt;
use std::path::{Path, PathBuf};

use parsnip_config::registry::GrammarSpec;
use parsnip_toolchain::compiler::CompileCommand;
use parsnip_util::fs as pfs;

use crate::error::EngineError;
use crate::paths::InstallPaths;
use crate::revision;

/// File name the compile step produces inside the working directory before
/// the install step moves it into place.
const BUILT_LIBRARY: &str = "parser.so";

/// One external-command step.
pub struct ShellStep {
    /// Executable to run.
    pub program: PathBuf,
    /// Argument list.
    pub args: Vec<String>,
    /// Working directory, when the step needs one.
    pub cwd: Option<PathBuf>,
    /// Informational line shown when the step starts.
    pub info: String,
    /// Message attached to the failure report when the step exits non-zero.
    pub error: String,
}

/// One in-process step. Runs inline in both execution modes; a returned
/// `Err` is treated as a step failure, terminating the owning pipeline.
pub struct ActionStep {
    /// Informational line shown when the step runs.
    pub info: String,
    action: Box<dyn FnMut() -> Result<(), String>>,
}

impl ActionStep {
    pub fn new(
        info: impl Into<String>,
        action: impl FnMut() -> Result<(), String> + 'static,
    ) -> Self {
        Self {
            info: info.into(),
            action: Box::new(action),
        }
    }

    /// Execute the action.
    ///
    /// # Errors
    /// Returns the action's failure message.
    pub fn run(&mut self) -> Result<(), String> {
        (self.action)()
    }
}

/// One unit of pipeline work.
pub enum Step {
    Shell(ShellStep),
    Action(ActionStep),
}

impl Step {
    /// The step's informational line.
    pub fn info(&self) -> &str {
        match self {
            Step::Shell(s) => &s.info,
            Step::Action(a) => &a.info,
        }
    }
}

impl fmt::Debug for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Step::Shell(s) => f
                .debug_struct("Shell")
                .field("program", &s.program)
                .field("args", &s.args)
                .field("cwd", &s.cwd)
                .finish(),
            Step::Action(a) => f.debug_struct("Action").field("info", &a.info).finish(),
        }
    }
}

/// The ordered step sequence built for one grammar in one run.
#[derive(Debug)]
pub struct Pipeline {
    /// The grammar this pipeline installs.
    pub target: String,
    pub steps: Vec<Step>,
}

impl Pipeline {
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

/// Inputs the builder needs beyond the grammar's own spec.
#[derive(Debug)]
pub struct BuildContext<'a> {
    /// Install locations.
    pub paths: &'a InstallPaths,
    /// Directory holding bundled query files (`<dir>/<grammar>/*.scm`).
    pub queries_source: Option<PathBuf>,
    /// The revision resolved for this grammar, if pinned anywhere.
    pub revision: Option<String>,
    /// Force generation even when the spec does not request it.
    pub force_generate: bool,
}

/// Build the install pipeline for one grammar. Deterministic given
/// identical inputs and tool environment.
///
/// # Errors
/// Returns `Configuration` when the spec is missing its source and
/// `Toolchain` when a required external tool (git, generator, npm,
/// compiler) cannot be located. No pipeline is produced on error.
pub fn build(id: &str, spec: &GrammarSpec, ctx: &BuildContext) -> Result<Pipeline, EngineError> {
    let Some(source) = spec.source.as_deref() else {
        return Err(EngineError::Configuration {
            grammar: id.to_owned(),
            field: "source".to_owned(),
        });
    };

    let remote = spec.is_remote();
    let src_root = if remote {
        ctx.paths.source_path(id)
    } else {
        PathBuf::from(source)
    };
    let workdir = match spec.location.as_deref() {
        Some(location) => src_root.join(location),
        None => src_root.clone(),
    };

    let mut steps = Vec::new();

    if remote {
        steps.push(cleanup_step(id, &src_root));
        steps.extend(fetch_steps(id, source, ctx.revision.as_deref(), &src_root)?);
    }

    if spec.generate || ctx.force_generate {
        let generator = parsnip_toolchain::resolve_generator()?;
        if spec.needs_bootstrap {
            let npm = parsnip_toolchain::resolve_npm()?;
            steps.push(Step::Shell(ShellStep {
                program: npm,
                args: vec!["install".to_owned(), "--silent".to_owned()],
                cwd: Some(workdir.clone()),
                info: format!("Installing node dependencies for {id}..."),
                error: format!("Error installing node dependencies for {id}"),
            }));
        }
        let abi = parsnip_toolchain::generate_abi();
        steps.push(Step::Shell(ShellStep {
            program: generator.path,
            args: vec![
                "generate".to_owned(),
                "--abi".to_owned(),
                abi.to_string(),
            ],
            cwd: Some(workdir.clone()),
            info: format!("Generating {id} parser sources..."),
            error: format!("Error generating {id} parser sources"),
        }));
    }

    let compiler = parsnip_toolchain::resolve_compiler()?;
    let compile_args = CompileCommand::new()
        .sources(&spec.compile_files())
        .output(BUILT_LIBRARY)
        .build_args(&compiler)?;
    steps.push(Step::Shell(ShellStep {
        program: compiler.path,
        args: compile_args,
        cwd: Some(workdir.clone()),
        info: format!("Compiling {id} parser..."),
        error: format!("Error compiling {id} parser"),
    }));

    steps.push(install_artifact_step(id, &workdir, ctx.paths));
    steps.push(marker_step(id, ctx.revision.as_deref(), ctx.paths));
    steps.push(query_step(id, ctx.queries_source.as_deref(), ctx.paths));

    if remote {
        steps.push(cleanup_step(id, &src_root));
    }

    Ok(Pipeline {
        target: id.to_owned(),
        steps,
    })
}

/// Best-effort removal of a stale cached source copy. Never fails the
/// pipeline: a directory that cannot be removed surfaces later as a fetch
/// error with better context.
fn cleanup_step(id: &str, src_root: &Path) -> Step {
    let dir = src_root.to_path_buf();
    Step::Action(ActionStep::new(
        format!("Clearing cached sources for {id}"),
        move || {
            let _ = pfs::remove_dir_all_if_exists(&dir);
            Ok(())
        },
    ))
}

/// Steps that leave the grammar source checked out at `dest`.
///
/// git is the primary fetch mechanism. When git is missing and the source
/// is a GitHub repository, fall back to downloading a source tarball; with
/// neither available the grammar fails before any step runs.
fn fetch_steps(
    id: &str,
    source: &str,
    revision: Option<&str>,
    dest: &Path,
) -> Result<Vec<Step>, EngineError> {
    match parsnip_toolchain::resolve_git() {
        Ok(git) => {
            let mut steps = Vec::new();

            let mut clone_args = vec!["clone".to_owned(), "--quiet".to_owned()];
            if revision.is_none() {
                // Unpinned installs take whatever HEAD is; a shallow clone
                // is enough. Pinned installs need history to check out.
                clone_args.push("--depth=1".to_owned());
            }
            clone_args.push(source.to_owned());
            clone_args.push(dest.display().to_string());
            steps.push(Step::Shell(ShellStep {
                program: git.clone(),
                args: clone_args,
                cwd: None,
                info: format!("Downloading {id} grammar..."),
                error: format!("Error downloading {id} grammar"),
            }));

            if let Some(rev) = revision {
                steps.push(Step::Shell(ShellStep {
                    program: git,
                    args: vec![
                        "-C".to_owned(),
                        dest.display().to_string(),
                        "checkout".to_owned(),
                        "--quiet".to_owned(),
                        rev.to_owned(),
                    ],
                    cwd: None,
                    info: format!("Checking out {rev} for {id}..."),
                    error: format!("Error checking out {rev} for {id}"),
                }));
            }

            Ok(steps)
        }
        Err(git_missing) => {
            let Some(url) = github_tarball_url(source, revision) else {
                return Err(EngineError::Toolchain(git_missing));
            };
            Ok(vec![tarball_fetch_step(id, &url, dest)])
        }
    }
}

fn tarball_fetch_step(id: &str, url: &str, dest: &Path) -> Step {
    let url = url.to_owned();
    let label = format!("{id} grammar");
    let dest = dest.to_path_buf();
    Step::Action(ActionStep::new(
        format!("Downloading {id} grammar (tarball)..."),
        move || {
            let Some(parent) = dest.parent() else {
                return Err(format!("{} has no parent directory", dest.display()));
            };
            pfs::ensure_dir(parent).map_err(|e| e.to_string())?;
            let tarball = parent.join(format!(
                "{}.tar.gz",
                dest.file_name().and_then(|n| n.to_str()).unwrap_or("grammar")
            ));
            parsnip_util::download::download_to_file(&url, &tarball, &label)
                .map_err(|e| e.to_string())?;
            let unpacked = parsnip_util::archive::unpack_tar_gz(&tarball, &dest);
            let _ = pfs::remove_file_if_exists(&tarball);
            unpacked.map_err(|e| e.to_string())
        },
    ))
}

/// Map a GitHub repository URL (optionally pinned) to its source tarball.
fn github_tarball_url(source: &str, revision: Option<&str>) -> Option<String> {
    let base = source.strip_suffix(".git").unwrap_or(source);
    if !base.starts_with("https://github.com/") {
        return None;
    }
    let rev = revision.unwrap_or("HEAD");
    Some(format!("{base}/archive/{rev}.tar.gz"))
}

/// Move the built library into the install location.
fn install_artifact_step(id: &str, workdir: &Path, paths: &InstallPaths) -> Step {
    let built = workdir.join(BUILT_LIBRARY);
    let dest = paths.parser_path(id);
    Step::Action(ActionStep::new(format!("Installing {id} parser..."), move || {
        pfs::move_file(&built, &dest).map_err(|e| e.to_string())
    }))
}

/// Record the revision the pipeline was built at. Unpinned builds have
/// nothing trustworthy to record, so they remove any stale marker instead
/// and always look outdated to `needs_update`.
fn marker_step(id: &str, revision: Option<&str>, paths: &InstallPaths) -> Step {
    let id = id.to_owned();
    let revision = revision.map(str::to_owned);
    let paths = paths.clone();
    Step::Action(ActionStep::new(
        format!("Recording {id} revision"),
        move || match revision.as_deref() {
            Some(rev) => revision::write_marker(&paths, &id, rev).map_err(|e| e.to_string()),
            None => revision::clear_marker(&paths, &id).map_err(|e| e.to_string()),
        },
    ))
}

/// Associate the grammar's bundled query files with the install location.
/// Runs as the pipeline's last install step, so a failed build never gets
/// a query association. Grammars without bundled queries are fine.
fn query_step(id: &str, queries_source: Option<&Path>, paths: &InstallPaths) -> Step {
    let source = queries_source.map(|dir| dir.join(id));
    let link = paths.query_path(id);
    Step::Action(ActionStep::new(format!("Linking {id} queries"), move || {
        let Some(src) = source.as_deref() else {
            return Ok(());
        };
        if !src.is_dir() {
            return Ok(());
        }
        pfs::link_dir(src, &link).map_err(|e| e.to_string())
    }))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use parsnip_config::Registry;

    use super::*;

    fn spec(toml_body: &str) -> (Registry, GrammarSpec) {
        let registry = Registry::from_str(toml_body, "test").unwrap();
        let spec = registry.spec("g").unwrap().clone();
        (registry, spec)
    }

    fn context(paths: &InstallPaths) -> BuildContext<'_> {
        BuildContext {
            paths,
            queries_source: None,
            revision: None,
            force_generate: false,
        }
    }

    fn has_compiler() -> bool {
        parsnip_toolchain::resolve_compiler().is_ok()
    }

    fn shell_programs(pipeline: &Pipeline) -> Vec<String> {
        pipeline
            .steps
            .iter()
            .filter_map(|s| match s {
                Step::Shell(shell) => Some(
                    shell
                        .program
                        .file_name()
                        .and_then(|n| n.to_str())
                        .unwrap_or_default()
                        .to_owned(),
                ),
                Step::Action(_) => None,
            })
            .collect()
    }

    #[test]
    fn missing_source_is_a_configuration_error() {
        let (_, spec) = spec("[grammars.g]\nrevision = \"abc\"\n");
        let tmp = tempfile::tempdir().unwrap();
        let paths = InstallPaths::new(tmp.path());

        let result = build("g", &spec, &context(&paths));
        assert!(matches!(
            result,
            Err(EngineError::Configuration { ref field, .. }) if field == "source"
        ));
    }

    #[test]
    fn local_source_skips_fetch_and_cleanup() {
        if !has_compiler() {
            return;
        }
        let (_, spec) = spec("[grammars.g]\nsource = \"/srv/grammars/g\"\n");
        let tmp = tempfile::tempdir().unwrap();
        let paths = InstallPaths::new(tmp.path());

        let pipeline = build("g", &spec, &context(&paths)).unwrap();
        // compile + install + marker + queries, nothing else
        assert_eq!(pipeline.len(), 4);
        let programs = shell_programs(&pipeline);
        assert_eq!(programs.len(), 1, "only the compile step shells out");

        let Some(Step::Shell(compile)) = pipeline.steps.first() else {
            panic!("first step should be the compile step");
        };
        assert_eq!(compile.cwd.as_deref(), Some(Path::new("/srv/grammars/g")));
    }

    #[test]
    fn location_subpath_becomes_working_directory() {
        if !has_compiler() {
            return;
        }
        let (_, spec) =
            spec("[grammars.g]\nsource = \"/srv/grammars/g\"\nlocation = \"grammars/sub\"\n");
        let tmp = tempfile::tempdir().unwrap();
        let paths = InstallPaths::new(tmp.path());

        let pipeline = build("g", &spec, &context(&paths)).unwrap();
        let Some(Step::Shell(compile)) = pipeline.steps.first() else {
            panic!("first step should be the compile step");
        };
        assert_eq!(
            compile.cwd.as_deref(),
            Some(Path::new("/srv/grammars/g/grammars/sub"))
        );
    }

    #[test]
    fn remote_source_brackets_with_cleanup() {
        if !has_compiler() {
            return;
        }
        let (_, spec) =
            spec("[grammars.g]\nsource = \"https://github.com/tree-sitter/tree-sitter-g\"\n");
        let tmp = tempfile::tempdir().unwrap();
        let paths = InstallPaths::new(tmp.path());

        let pipeline = build("g", &spec, &context(&paths)).unwrap();
        let Some(first) = pipeline.steps.first() else {
            panic!("pipeline is empty");
        };
        let Some(last) = pipeline.steps.last() else {
            panic!("pipeline is empty");
        };
        assert!(first.info().contains("Clearing"));
        assert!(last.info().contains("Clearing"));
    }

    #[test]
    fn pinned_remote_clones_with_history_and_checks_out() {
        let (_, spec) = spec(
            "[grammars.g]\nsource = \"https://github.com/tree-sitter/tree-sitter-g\"\nrevision = \"abc123\"\n",
        );
        let tmp = tempfile::tempdir().unwrap();
        let paths = InstallPaths::new(tmp.path());
        let mut ctx = context(&paths);
        ctx.revision = Some("abc123".to_owned());

        if !has_compiler() || parsnip_toolchain::resolve_git().is_err() {
            // Without git the builder falls back to the tarball action;
            // the git-specific assertions below do not apply.
            return;
        }

        let pipeline = build("g", &spec, &ctx).unwrap();
        let shell_steps: Vec<&ShellStep> = pipeline
            .steps
            .iter()
            .filter_map(|s| match s {
                Step::Shell(shell) => Some(shell),
                Step::Action(_) => None,
            })
            .collect();

        let Some(clone) = shell_steps.first() else {
            panic!("expected a clone step");
        };
        assert!(clone.args.iter().any(|a| a == "clone"));
        assert!(
            !clone.args.iter().any(|a| a == "--depth=1"),
            "pinned installs need history to check out"
        );

        let Some(checkout) = shell_steps.get(1) else {
            panic!("expected a checkout step");
        };
        assert!(checkout.args.iter().any(|a| a == "checkout"));
        assert!(checkout.args.iter().any(|a| a == "abc123"));
    }

    #[test]
    fn unpinned_remote_clones_shallow() {
        let (_, spec) =
            spec("[grammars.g]\nsource = \"https://github.com/tree-sitter/tree-sitter-g\"\n");
        let tmp = tempfile::tempdir().unwrap();
        let paths = InstallPaths::new(tmp.path());

        if !has_compiler() || parsnip_toolchain::resolve_git().is_err() {
            return;
        }

        let pipeline = build("g", &spec, &context(&paths)).unwrap();
        let has_shallow_clone = pipeline.steps.iter().any(|s| match s {
            Step::Shell(shell) => shell.args.iter().any(|a| a == "--depth=1"),
            Step::Action(_) => false,
        });
        assert!(has_shallow_clone);
    }

    #[test]
    fn generate_inserts_bootstrap_before_generation() {
        // Both tools must be present for this spec to build at all; skip
        // on machines without them.
        if !has_compiler()
            || parsnip_toolchain::resolve_generator().is_err()
            || parsnip_toolchain::resolve_npm().is_err()
        {
            return;
        }

        let (_, spec) = spec(
            "[grammars.g]\nsource = \"/srv/grammars/g\"\ngenerate = true\nneeds_bootstrap = true\n",
        );
        let tmp = tempfile::tempdir().unwrap();
        let paths = InstallPaths::new(tmp.path());

        let pipeline = build("g", &spec, &context(&paths)).unwrap();
        let programs = shell_programs(&pipeline);
        let npm_pos = programs.iter().position(|p| p.starts_with("npm"));
        let gen_pos = programs.iter().position(|p| p.starts_with("tree-sitter"));
        assert!(npm_pos.is_some());
        assert!(gen_pos.is_some());
        assert!(npm_pos < gen_pos, "bootstrap must precede generation");
    }

    #[test]
    fn generation_requires_the_generator() {
        if parsnip_toolchain::resolve_generator().is_ok() {
            // Can only observe the ToolMissing path when the tool is absent.
            return;
        }
        let (_, spec) = spec("[grammars.g]\nsource = \"/srv/grammars/g\"\ngenerate = true\n");
        let tmp = tempfile::tempdir().unwrap();
        let paths = InstallPaths::new(tmp.path());

        let result = build("g", &spec, &context(&paths));
        assert!(matches!(result, Err(EngineError::Toolchain(_))));
    }

    #[test]
    fn github_tarball_url_for_pinned_revision() {
        let url = github_tarball_url(
            "https://github.com/tree-sitter/tree-sitter-rust.git",
            Some("abc123"),
        );
        assert_eq!(
            url.as_deref(),
            Some("https://github.com/tree-sitter/tree-sitter-rust/archive/abc123.tar.gz")
        );
    }

    #[test]
    fn github_tarball_url_unpinned_uses_head() {
        let url = github_tarball_url("https://github.com/tree-sitter/tree-sitter-rust", None);
        assert_eq!(
            url.as_deref(),
            Some("https://github.com/tree-sitter/tree-sitter-rust/archive/HEAD.tar.gz")
        );
    }

    #[test]
    fn non_github_remote_has_no_tarball_url() {
        assert_eq!(github_tarball_url("https://gitlab.com/x/y", None), None);
        assert_eq!(github_tarball_url("git@github.com:x/y.git", None), None);
    }

    #[test]
    fn compile_step_uses_spec_files() {
        if !has_compiler() {
            return;
        }
        let (_, spec) = spec(
            "[grammars.g]\nsource = \"/srv/grammars/g\"\nfiles = [\"src/parser.c\", \"src/scanner.cc\"]\n",
        );
        let tmp = tempfile::tempdir().unwrap();
        let paths = InstallPaths::new(tmp.path());

        let pipeline = build("g", &spec, &context(&paths)).unwrap();
        let Some(Step::Shell(compile)) = pipeline.steps.first() else {
            panic!("first step should be the compile step");
        };
        assert!(compile.args.iter().any(|a| a == "src/scanner.cc"));
    }

    #[test]
    fn marker_step_writes_resolved_revision() {
        let tmp = tempfile::tempdir().unwrap();
        let paths = InstallPaths::new(tmp.path());
        let Step::Action(mut action) = marker_step("g", Some("abc123"), &paths) else {
            panic!("marker step should be an action");
        };
        action.run().unwrap();
        let content = std::fs::read_to_string(paths.marker_path("g")).unwrap();
        assert_eq!(content, "abc123\n");
    }

    #[test]
    fn marker_step_unpinned_clears_stale_marker() {
        let tmp = tempfile::tempdir().unwrap();
        let paths = InstallPaths::new(tmp.path());
        revision::write_marker(&paths, "g", "stale").unwrap();

        let Step::Action(mut action) = marker_step("g", None, &paths) else {
            panic!("marker step should be an action");
        };
        action.run().unwrap();
        assert!(!paths.marker_path("g").exists());
    }

    #[cfg(unix)]
    #[test]
    fn query_step_links_bundled_queries() {
        let tmp = tempfile::tempdir().unwrap();
        let paths = InstallPaths::new(&tmp.path().join("root"));
        let bundle = tmp.path().join("bundle");
        std::fs::create_dir_all(bundle.join("g")).unwrap();
        std::fs::write(bundle.join("g").join("highlights.scm"), "(node)").unwrap();

        let Step::Action(mut action) = query_step("g", Some(&bundle), &paths) else {
            panic!("query step should be an action");
        };
        action.run().unwrap();
        assert!(paths.query_path("g").join("highlights.scm").exists());
    }

    #[test]
    fn query_step_without_bundle_is_a_noop() {
        let tmp = tempfile::tempdir().unwrap();
        let paths = InstallPaths::new(tmp.path());
        let Step::Action(mut action) = query_step("g", None, &paths) else {
            panic!("query step should be an action");
        };
        action.run().unwrap();
        assert!(!paths.query_path("g").exists());
    }
}
