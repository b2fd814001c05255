#![forbid(unsafe_code)]

use std::error::Error;
use std::io::Write;
use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand};

use parsnip_config::{Lockfile, Registry};
use parsnip_engine::{BatchReport, Coordinator, InstallOptions, InstallPaths};

type CliResult = Result<(), Box<dyn Error>>;

#[derive(Debug, Parser)]
#[command(name = "parsnip", about = "A grammar parser install manager")]
#[command(version)]
#[command(subcommand_required = true, arg_required_else_help = false)]
struct Cli {
    /// Install root (defaults to PARSNIP_HOME or ~/.parsnip)
    #[arg(long, global = true)]
    root: Option<PathBuf>,
    /// Grammar registry file (defaults to <root>/grammars.toml)
    #[arg(long, global = true)]
    registry: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Install grammars (names, group aliases, or `all`)
    Install {
        /// Grammars to install
        #[arg(required = true)]
        targets: Vec<String>,
        /// Reinstall without asking, even when already installed
        #[arg(long)]
        force: bool,
        /// Run pipelines one after another instead of overlapping them
        #[arg(long)]
        sync: bool,
        /// Also install grammars on the ignore list
        #[arg(long)]
        include_ignored: bool,
        /// Generate parser sources from grammar even when not required
        #[arg(long)]
        generate: bool,
        /// Answer yes to every prompt
        #[arg(long, short = 'y')]
        yes: bool,
    },
    /// Update installed grammars to their resolved revisions
    Update {
        /// Grammars to update; empty means every outdated installed grammar
        targets: Vec<String>,
        /// Run pipelines one after another instead of overlapping them
        #[arg(long)]
        sync: bool,
    },
    /// Uninstall grammars
    Uninstall {
        /// Grammars to uninstall
        #[arg(required = true)]
        targets: Vec<String>,
    },
    /// List registered grammars and their install state
    List {
        /// Only show installed grammars
        #[arg(long)]
        installed: bool,
    },
    /// Check environment and toolchain setup
    Doctor,
    /// Remove cached grammar sources
    Clean,
}

fn main() {
    let cli = Cli::parse();

    let result = match resolve_paths(cli.root) {
        Ok(paths) => dispatch(cli.command, &paths, cli.registry),
        Err(e) => Err(e),
    };

    if let Err(msg) = result {
        eprintln!("error: {msg}");
        process::exit(1);
    }
}

fn dispatch(command: Command, paths: &InstallPaths, registry: Option<PathBuf>) -> CliResult {
    match command {
        Command::Install {
            targets,
            force,
            sync,
            include_ignored,
            generate,
            yes,
        } => cmd_install(
            paths,
            registry,
            &targets,
            InstallOptions {
                force,
                sync,
                exclude_ignored: !include_ignored,
                generate_from_source: generate,
            },
            yes,
        ),
        Command::Update { targets, sync } => cmd_update(paths, registry, &targets, sync),
        Command::Uninstall { targets } => cmd_uninstall(paths, registry, &targets),
        Command::List { installed } => cmd_list(paths, registry, installed),
        Command::Doctor => cmd_doctor(paths, registry),
        Command::Clean => cmd_clean(paths),
    }
}

fn resolve_paths(root: Option<PathBuf>) -> Result<InstallPaths, Box<dyn Error>> {
    match root {
        Some(dir) => Ok(InstallPaths::new(&dir)),
        None => Ok(InstallPaths::discover()?),
    }
}

/// Load the registry and lockfile next to it.
fn load_config(
    paths: &InstallPaths,
    registry_override: Option<PathBuf>,
) -> Result<(Registry, Lockfile, PathBuf), Box<dyn Error>> {
    let (registry_path, lockfile_path) = match registry_override {
        Some(path) => {
            let lockfile = path
                .parent()
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("."))
                .join("lockfile.json");
            (path, lockfile)
        }
        None => (paths.registry_path(), paths.lockfile_path()),
    };
    let registry = Registry::from_path(&registry_path)?;
    let lockfile = Lockfile::from_path(&lockfile_path)?;

    let config_dir = registry_path
        .parent()
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."));

    Ok((registry, lockfile, config_dir))
}

/// Interactive yes/no prompt on stderr; any answer but y/yes declines.
fn confirm(question: &str) -> bool {
    eprint!("{question} [y/N] ");
    let _ = std::io::stderr().flush();
    let mut answer = String::new();
    if std::io::stdin().read_line(&mut answer).is_err() {
        return false;
    }
    matches!(answer.trim().to_lowercase().as_str(), "y" | "yes")
}

fn print_report(verb: &str, report: &BatchReport, status: &str) -> CliResult {
    for (target, reason) in &report.skipped {
        eprintln!("    Skipped {target} ({reason})");
    }
    for target in &report.succeeded {
        eprintln!("    {verb} {target}");
    }
    for (target, error) in &report.failed {
        eprintln!("    Failed {target}: {error}");
    }
    eprintln!("    Done ({status})");

    if report.is_clean() {
        Ok(())
    } else {
        Err(format!("{} grammar(s) failed", report.failed.len()).into())
    }
}

fn cmd_install(
    paths: &InstallPaths,
    registry_override: Option<PathBuf>,
    targets: &[String],
    options: InstallOptions,
    yes: bool,
) -> CliResult {
    let (registry, lockfile, config_dir) = load_config(paths, registry_override)?;

    let mut coordinator = Coordinator::new(&registry, &lockfile, paths)
        .with_queries_source(config_dir.join("queries"));
    if !yes {
        coordinator = coordinator.with_confirm(confirm);
    }

    let report = coordinator.install(targets, &options);
    print_report("Installed", &report, &coordinator.progress().status())
}

fn cmd_update(
    paths: &InstallPaths,
    registry_override: Option<PathBuf>,
    targets: &[String],
    sync: bool,
) -> CliResult {
    let (registry, lockfile, config_dir) = load_config(paths, registry_override)?;

    let mut coordinator = Coordinator::new(&registry, &lockfile, paths)
        .with_queries_source(config_dir.join("queries"));

    let options = InstallOptions {
        sync,
        ..InstallOptions::default()
    };
    let report = coordinator.update(targets, &options);

    if report.succeeded.is_empty() && report.failed.is_empty() && report.skipped.is_empty() {
        eprintln!("    All grammars are up to date");
        return Ok(());
    }
    print_report("Updated", &report, &coordinator.progress().status())
}

fn cmd_uninstall(
    paths: &InstallPaths,
    registry_override: Option<PathBuf>,
    targets: &[String],
) -> CliResult {
    let (registry, lockfile, _) = load_config(paths, registry_override)?;

    let mut coordinator = Coordinator::new(&registry, &lockfile, paths);
    let report = coordinator.uninstall(targets);

    for target in &report.succeeded {
        eprintln!("    Uninstalled {target}");
    }
    for (target, error) in &report.failed {
        eprintln!("    Failed {target}: {error}");
    }

    if report.is_clean() {
        Ok(())
    } else {
        Err(format!("{} grammar(s) failed", report.failed.len()).into())
    }
}

fn cmd_list(
    paths: &InstallPaths,
    registry_override: Option<PathBuf>,
    installed_only: bool,
) -> CliResult {
    let (registry, lockfile, _) = load_config(paths, registry_override)?;
    let coordinator = Coordinator::new(&registry, &lockfile, paths);
    let resolver = parsnip_engine::RevisionResolver::new(&registry, &lockfile, paths);

    for id in registry.grammars.keys() {
        let installed = coordinator.is_installed(id);
        if installed_only && !installed {
            continue;
        }
        let state = if !installed {
            "not installed"
        } else if resolver.needs_update(id) {
            "outdated"
        } else {
            "installed"
        };
        println!("{id}\t{state}");
    }
    Ok(())
}

fn cmd_doctor(paths: &InstallPaths, registry_override: Option<PathBuf>) -> CliResult {
    eprintln!("Checking environment...");
    eprintln!();

    let mut issues = 0u32;

    match parsnip_toolchain::resolve_compiler() {
        Ok(compiler) => eprintln!("  [ok] C compiler: {}", compiler.path.display()),
        Err(e) => {
            eprintln!("  [!!] C compiler: {e}");
            issues = issues.saturating_add(1);
        }
    }

    match parsnip_toolchain::resolve_git() {
        Ok(git) => eprintln!("  [ok] git: {}", git.display()),
        Err(e) => {
            eprintln!("  [!!] git: {e}");
            issues = issues.saturating_add(1);
        }
    }

    match parsnip_toolchain::resolve_generator() {
        Ok(generator) => {
            let version = generator.version.as_deref().unwrap_or("unknown version");
            eprintln!("  [ok] tree-sitter CLI: {} ({version})", generator.path.display());
        }
        // The generator is only needed for grammars that generate from
        // source, so its absence is informational.
        Err(e) => eprintln!("  [--] tree-sitter CLI: {e}"),
    }

    match parsnip_toolchain::resolve_npm() {
        Ok(npm) => eprintln!("  [ok] npm: {}", npm.display()),
        Err(e) => eprintln!("  [--] npm: {e}"),
    }

    let registry_path = registry_override.unwrap_or_else(|| paths.registry_path());
    if registry_path.is_file() {
        match Registry::from_path(&registry_path) {
            Ok(registry) => eprintln!(
                "  [ok] registry: {} ({} grammars)",
                registry_path.display(),
                registry.grammars.len()
            ),
            Err(e) => {
                eprintln!("  [!!] registry: {e}");
                issues = issues.saturating_add(1);
            }
        }
    } else {
        eprintln!("  [--] registry: {} not found", registry_path.display());
    }

    eprintln!();
    if issues == 0 {
        eprintln!("No issues found");
        Ok(())
    } else {
        Err(format!("{issues} issue(s) found").into())
    }
}

fn cmd_clean(paths: &InstallPaths) -> CliResult {
    parsnip_util::fs::remove_dir_all_if_exists(&paths.sources_dir())?;
    eprintln!("    Cleaned cached grammar sources");
    Ok(())
}
