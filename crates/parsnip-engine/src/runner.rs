//! Pipeline execution: a per-pipeline state machine driven either
//! synchronously (each step blocks) or asynchronously (shell steps run as
//! overlapping subprocess spawns, advanced from a single-threaded poll
//! loop).

use std::path::PathBuf;
use std::process::{Child, Command, Stdio};
use std::time::Duration;

use parsnip_util::process::{run_in_dir, CommandOutput};

use crate::pipeline::{Pipeline, ShellStep, Step};
use crate::progress::Progress;

/// Terminal state of one pipeline run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunStatus {
    /// Every step ran successfully.
    Succeeded,
    /// The step at `step` (0-indexed) failed; later steps never ran.
    Failed {
        step: usize,
        error: String,
        /// Captured stdout/stderr of the failing step, empty for actions.
        output: String,
    },
}

/// What one pipeline run reported back.
#[derive(Debug)]
pub struct RunReport {
    pub target: String,
    pub status: RunStatus,
}

impl RunReport {
    pub fn success(&self) -> bool {
        matches!(self.status, RunStatus::Succeeded)
    }
}

/// Outcome of executing one step, fed back into the state machine.
#[derive(Debug)]
enum StepOutcome {
    Success,
    Failure { error: String, output: String },
}

/// What the state machine wants next.
enum Control {
    /// The current step is a shell step; execute it and feed the outcome
    /// back through [`PipelineRun::advance`].
    Shell,
    /// The run reached a terminal state.
    Done(RunStatus),
}

/// The per-pipeline state machine: `(pipeline, index)`, advanced through a
/// single entry point from both execution modes.
struct PipelineRun {
    pipeline: Pipeline,
    index: usize,
    started: bool,
}

impl PipelineRun {
    fn new(pipeline: Pipeline) -> Self {
        Self {
            pipeline,
            index: 0,
            started: false,
        }
    }

    /// Feed the previous step's outcome (`None` on the very first call) and
    /// advance: action steps run inline, the first shell step hands control
    /// back to the caller, and running out of steps is success.
    ///
    /// The first call records exactly one `started` increment; every
    /// terminal transition records exactly one `finished` (plus `failed`
    /// on the failure path).
    fn advance(&mut self, outcome: Option<StepOutcome>, progress: &mut Progress) -> Control {
        if !self.started {
            self.started = true;
            progress.record_start();
        }
        match outcome {
            None => {}
            Some(StepOutcome::Success) => self.index += 1,
            Some(StepOutcome::Failure { error, output }) => {
                progress.record_failure();
                return Control::Done(RunStatus::Failed {
                    step: self.index,
                    error,
                    output,
                });
            }
        }

        loop {
            let Some(step) = self.pipeline.steps.get_mut(self.index) else {
                progress.record_finish();
                return Control::Done(RunStatus::Succeeded);
            };
            match step {
                Step::Shell(_) => return Control::Shell,
                Step::Action(action) => {
                    eprintln!("    {}", action.info);
                    match action.run() {
                        Ok(()) => self.index += 1,
                        Err(message) => {
                            progress.record_failure();
                            return Control::Done(RunStatus::Failed {
                                step: self.index,
                                error: message,
                                output: String::new(),
                            });
                        }
                    }
                }
            }
        }
    }

    /// The current step, which `advance` guaranteed is a shell step.
    fn current_shell(&self) -> Option<&ShellStep> {
        match self.pipeline.steps.get(self.index) {
            Some(Step::Shell(shell)) => Some(shell),
            _ => None,
        }
    }
}

fn shell_outcome(step: &ShellStep, output: &CommandOutput) -> StepOutcome {
    if output.success {
        StepOutcome::Success
    } else {
        StepOutcome::Failure {
            error: format!("{} ({})", step.error, output.exit_description()),
            output: output.failure_output(),
        }
    }
}

/// Run one pipeline to completion, blocking on every step.
///
/// The first failing step terminates the run; its error message and
/// captured output travel back in the report.
pub fn run_sync(pipeline: Pipeline, progress: &mut Progress) -> RunReport {
    let target = pipeline.target.clone();
    let mut run = PipelineRun::new(pipeline);
    let mut outcome = None;

    loop {
        match run.advance(outcome.take(), progress) {
            Control::Done(status) => return RunReport { target, status },
            Control::Shell => {
                let Some(shell) = run.current_shell() else {
                    // advance() only returns Shell while pointing at one.
                    continue;
                };
                eprintln!("    {}", shell.info);
                outcome = Some(match run_in_dir(&shell.program, &shell.args, shell.cwd.as_deref())
                {
                    Ok(output) => shell_outcome(shell, &output),
                    Err(e) => StepOutcome::Failure {
                        error: format!("{}: {e}", shell.error),
                        output: String::new(),
                    },
                });
            }
        }
    }
}

/// One in-flight subprocess with its private output buffers.
///
/// Buffers are plain files keyed uniquely per spawn, so concurrently
/// running pipelines can never cross-contaminate output. They are read
/// back and deleted when the exit is observed.
struct JobHandle {
    child: Child,
    stdout_path: PathBuf,
    stderr_path: PathBuf,
    error_message: String,
}

impl JobHandle {
    fn spawn(shell: &ShellStep, key: u64) -> Result<Self, String> {
        let buffer_dir = std::env::temp_dir().join(format!("parsnip-job-{}", std::process::id()));
        parsnip_util::fs::ensure_dir(&buffer_dir).map_err(|e| e.to_string())?;
        let stdout_path = buffer_dir.join(format!("{key}.out"));
        let stderr_path = buffer_dir.join(format!("{key}.err"));

        let stdout_file = std::fs::File::create(&stdout_path)
            .map_err(|e| format!("cannot create {}: {e}", stdout_path.display()))?;
        let stderr_file = std::fs::File::create(&stderr_path)
            .map_err(|e| format!("cannot create {}: {e}", stderr_path.display()))?;

        let mut cmd = Command::new(&shell.program);
        cmd.args(&shell.args)
            .stdin(Stdio::null())
            .stdout(Stdio::from(stdout_file))
            .stderr(Stdio::from(stderr_file));
        if let Some(cwd) = &shell.cwd {
            cmd.current_dir(cwd);
        }

        match cmd.spawn() {
            Ok(child) => Ok(Self {
                child,
                stdout_path,
                stderr_path,
                error_message: shell.error.clone(),
            }),
            Err(e) => {
                let _ = parsnip_util::fs::remove_file_if_exists(&stdout_path);
                let _ = parsnip_util::fs::remove_file_if_exists(&stderr_path);
                Err(format!(
                    "{}: cannot start {}: {e}",
                    shell.error,
                    shell.program.display()
                ))
            }
        }
    }

    /// Non-blocking exit check. `None` while the process is still running.
    fn try_finish(&mut self) -> Option<StepOutcome> {
        match self.child.try_wait() {
            Ok(None) => None,
            Ok(Some(status)) => {
                let stdout = std::fs::read_to_string(&self.stdout_path).unwrap_or_default();
                let stderr = std::fs::read_to_string(&self.stderr_path).unwrap_or_default();
                self.discard_buffers();

                if status.success() {
                    Some(StepOutcome::Success)
                } else {
                    let exit = match status.code() {
                        Some(code) => format!("exit code {code}"),
                        None => "terminated by signal".to_owned(),
                    };
                    let output = CommandOutput {
                        stdout,
                        stderr,
                        success: false,
                        exit_code: status.code(),
                    };
                    Some(StepOutcome::Failure {
                        error: format!("{} ({exit})", self.error_message),
                        output: output.failure_output(),
                    })
                }
            }
            Err(e) => {
                self.discard_buffers();
                Some(StepOutcome::Failure {
                    error: format!("{}: cannot wait for process: {e}", self.error_message),
                    output: String::new(),
                })
            }
        }
    }

    fn discard_buffers(&self) {
        let _ = parsnip_util::fs::remove_file_if_exists(&self.stdout_path);
        let _ = parsnip_util::fs::remove_file_if_exists(&self.stderr_path);
    }
}

impl Drop for JobHandle {
    fn drop(&mut self) {
        self.discard_buffers();
    }
}

/// One pipeline being driven by the executor.
struct Slot {
    target: String,
    run: PipelineRun,
    job: Option<JobHandle>,
    report: Option<RunReport>,
}

/// Drives many pipelines concurrently from a single thread.
///
/// Parallelism comes entirely from overlapping subprocess lifetimes: shell
/// steps are spawned non-blocking, and a poll loop observes exits one at a
/// time, advancing only the owning pipeline. Steps within one pipeline
/// stay strictly ordered; pipelines interleave arbitrarily. There is no
/// cancellation: spawned processes run to completion even when a sibling
/// pipeline fails.
pub struct Executor {
    spawn_seq: u64,
}

/// How long the poll loop sleeps when no subprocess has exited.
const POLL_INTERVAL: Duration = Duration::from_millis(20);

impl Default for Executor {
    fn default() -> Self {
        Self::new()
    }
}

impl Executor {
    pub fn new() -> Self {
        Self { spawn_seq: 0 }
    }

    /// Run every pipeline to a terminal state and report per pipeline, in
    /// the order the pipelines were given.
    pub fn run_all(mut self, pipelines: Vec<Pipeline>, progress: &mut Progress) -> Vec<RunReport> {
        let mut slots: Vec<Slot> = pipelines
            .into_iter()
            .map(|pipeline| Slot {
                target: pipeline.target.clone(),
                run: PipelineRun::new(pipeline),
                job: None,
                report: None,
            })
            .collect();

        // Start every pipeline; each runs until its first shell step (or a
        // terminal state, for action-only pipelines).
        for slot in &mut slots {
            Self::drive(&mut self.spawn_seq, slot, None, progress);
        }

        // Single-threaded completion dispatch: exactly one exit is
        // processed at a time, so counter updates never interleave.
        while slots.iter().any(|s| s.job.is_some()) {
            let mut observed_exit = false;
            for slot in &mut slots {
                let Some(job) = slot.job.as_mut() else {
                    continue;
                };
                if let Some(outcome) = job.try_finish() {
                    slot.job = None;
                    observed_exit = true;
                    Self::drive(&mut self.spawn_seq, slot, Some(outcome), progress);
                }
            }
            if !observed_exit {
                std::thread::sleep(POLL_INTERVAL);
            }
        }

        slots
            .into_iter()
            .map(|slot| match slot.report {
                Some(report) => report,
                // Unreachable: the loop above only ends once every slot is
                // terminal, and terminal slots always carry a report.
                None => RunReport {
                    target: slot.target,
                    status: RunStatus::Succeeded,
                },
            })
            .collect()
    }

    /// Advance one pipeline until it spawns a subprocess or terminates.
    fn drive(
        spawn_seq: &mut u64,
        slot: &mut Slot,
        outcome: Option<StepOutcome>,
        progress: &mut Progress,
    ) {
        let mut next = outcome;
        loop {
            match slot.run.advance(next.take(), progress) {
                Control::Done(status) => {
                    slot.report = Some(RunReport {
                        target: slot.target.clone(),
                        status,
                    });
                    return;
                }
                Control::Shell => {
                    let Some(shell) = slot.run.current_shell() else {
                        continue;
                    };
                    eprintln!("    {}", shell.info);
                    *spawn_seq += 1;
                    match JobHandle::spawn(shell, *spawn_seq) {
                        Ok(job) => {
                            slot.job = Some(job);
                            return;
                        }
                        Err(message) => {
                            next = Some(StepOutcome::Failure {
                                error: message,
                                output: String::new(),
                            });
                        }
                    }
                }
            }
        }
    }
}
