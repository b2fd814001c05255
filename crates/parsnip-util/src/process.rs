//! Process execution helpers for parsnip.

use std::path::Path;
use std::process::Command;

use crate::error::UtilError;

/// Structured output from a command execution.
#[derive(Debug)]
pub struct CommandOutput {
    /// Standard output as a string.
    pub stdout: String,
    /// Standard error as a string.
    pub stderr: String,
    /// Whether the command exited successfully.
    pub success: bool,
    /// The exit code, if the process was not killed by a signal.
    pub exit_code: Option<i32>,
}

impl CommandOutput {
    /// Combined captured output for failure reports: stderr first (where
    /// compilers and git put their diagnostics), then stdout, both trimmed.
    pub fn failure_output(&self) -> String {
        let mut parts = Vec::new();
        if !self.stderr.trim().is_empty() {
            parts.push(self.stderr.trim().to_owned());
        }
        if !self.stdout.trim().is_empty() {
            parts.push(self.stdout.trim().to_owned());
        }
        parts.join("\n")
    }

    /// Describe how the process ended, for error messages.
    pub fn exit_description(&self) -> String {
        match self.exit_code {
            Some(code) => format!("exit code {code}"),
            None => "terminated by signal".to_owned(),
        }
    }
}

/// Execute a command and capture its output.
///
/// # Errors
/// Returns an error if the command cannot be spawned (e.g. binary not found).
/// A non-zero exit code is **not** an error; check `CommandOutput::success`.
pub fn run_command(cmd: &mut Command) -> Result<CommandOutput, UtilError> {
    let output = cmd
        .output()
        .map_err(|source| UtilError::CommandExec { source })?;

    Ok(CommandOutput {
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        success: output.status.success(),
        exit_code: output.status.code(),
    })
}

/// Execute `program` with `args`, optionally in `dir`, capturing output.
///
/// # Errors
/// Returns an error if the command cannot be spawned.
pub fn run_in_dir(
    program: &Path,
    args: &[String],
    dir: Option<&Path>,
) -> Result<CommandOutput, UtilError> {
    let mut cmd = Command::new(program);
    cmd.args(args);
    if let Some(d) = dir {
        cmd.current_dir(d);
    }
    run_command(&mut cmd)
}
