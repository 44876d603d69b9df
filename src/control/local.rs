// src/control/local.rs

//! Local process-group backend.
//!
//! The command is spawned as the leader of a new process group so that
//! everything it starts can be stopped together. stdout and stderr are
//! drained by two reader tasks while this module polls for exit, the marker
//! file and the deadline.

use std::path::Path;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use nix::unistd::Pid;
use tokio::process::{Child, Command};
use tokio::time::{Instant, sleep, timeout};
use tracing::{debug, info, warn};

use crate::control::cancel::wait_cancelled;
use crate::control::capture::{self, DEFAULT_READER_JOIN_TIMEOUT, StreamCapture};
use crate::control::terminate::{TerminationReport, terminate_group};
use crate::control::{ControlFuture, ControlInterface, Finish, exit_code_from_status};
use crate::types::{CommandSpec, ExecResult};

/// Tunables for [`LocalControl`].
#[derive(Debug, Clone)]
pub struct LocalOptions {
    /// Program (plus arguments) prepended to the command in
    /// `run_until_file_deployed`, e.g. `["/usr/bin/fakeroot"]`.
    pub wrapper: Vec<String>,
    pub reader_join_timeout: Duration,
}

impl Default for LocalOptions {
    fn default() -> Self {
        Self {
            wrapper: Vec::new(),
            reader_join_timeout: DEFAULT_READER_JOIN_TIMEOUT,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct LocalControl {
    options: LocalOptions,
}

/// A spawned process group together with its stream readers.
struct Supervised {
    child: Child,
    pid: Option<u32>,
    pgid: Option<Pid>,
    stdout: StreamCapture,
    stderr: StreamCapture,
    termination: Option<TerminationReport>,
}

impl Supervised {
    /// Stop the group and keep the report for the result.
    async fn stop(&mut self, grace: Duration) {
        let report = terminate_group(&mut self.child, self.pgid, grace).await;
        self.termination = Some(report);
    }

    async fn finish(self, finish: Finish, join_timeout: Duration, started: Instant) -> ExecResult {
        let (stdout, stderr) = capture::finish_pair(self.stdout, self.stderr, join_timeout).await;
        let result = finish
            .into_result(stdout, stderr)
            .with_elapsed(started.elapsed())
            .with_pid(self.pid);
        note_termination(result, self.termination)
    }
}

/// Flag the result when the group could not be confirmed gone.
fn note_termination(result: ExecResult, report: Option<TerminationReport>) -> ExecResult {
    match report {
        Some(report) if !report.confirmed() => {
            warn!(
                pid = ?result.pid,
                state = %report.state,
                forced = report.forced,
                "process group may still be alive"
            );
            result.with_unconfirmed_termination(format!(
                "process group left in state {}",
                report.state
            ))
        }
        _ => result,
    }
}

impl LocalControl {
    pub fn new(options: LocalOptions) -> Self {
        Self { options }
    }

    fn build_command(&self, spec: &CommandSpec, wrapped: bool) -> Result<Command> {
        let mut argv = spec
            .command
            .to_argv()
            .with_context(|| format!("splitting command line '{}'", spec.command))?;
        if wrapped && !self.options.wrapper.is_empty() {
            let mut full = self.options.wrapper.clone();
            full.append(&mut argv);
            argv = full;
        }
        if argv.is_empty() {
            bail!("empty command");
        }

        let mut cmd = Command::new(&argv[0]);
        cmd.args(&argv[1..])
            .envs(&spec.env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .process_group(0)
            .kill_on_drop(true);
        if let Some(cwd) = &spec.cwd {
            cmd.current_dir(cwd);
        }
        Ok(cmd)
    }

    fn spawn(&self, spec: &CommandSpec, wrapped: bool) -> Result<Supervised> {
        let mut cmd = self.build_command(spec, wrapped)?;
        let mut child = cmd
            .spawn()
            .with_context(|| format!("spawning '{}'", spec.command))?;

        let pid = child.id();
        // process_group(0) makes the child its own group leader
        let pgid = pid.map(|pid| Pid::from_raw(pid as i32));
        let stdout = capture::spawn_reader("stdout", child.stdout.take());
        let stderr = capture::spawn_reader("stderr", child.stderr.take());

        info!(cmd = %spec.command, pid = ?pid, cwd = ?spec.cwd, "spawned local process group");
        Ok(Supervised {
            child,
            pid,
            pgid,
            stdout,
            stderr,
            termination: None,
        })
    }

    /// Stop whatever is left of the group and return the natural-exit result.
    async fn exited(&self, proc: &mut Supervised, status: ExitStatus, grace: Duration) -> Finish {
        // orphans may still hold the output pipes open
        proc.stop(grace).await;
        Finish::Exited(exit_code_from_status(status))
    }

    async fn exec_inner(&self, spec: &CommandSpec) -> ExecResult {
        let started = Instant::now();
        let mut proc = match self.spawn(spec, false) {
            Ok(proc) => proc,
            Err(err) => {
                warn!(cmd = %spec.command, error = %format!("{err:#}"), "failed to start command");
                return ExecResult::failed(String::new(), String::new(), format!("{err:#}"))
                    .with_elapsed(started.elapsed());
            }
        };

        let waited = tokio::select! {
            res = timeout(spec.timeout, proc.child.wait()) => Some(res),
            _ = wait_cancelled(spec.cancel.as_ref()) => None,
        };

        let finish = match waited {
            Some(Ok(Ok(status))) => self.exited(&mut proc, status, spec.timeout).await,
            Some(Ok(Err(e))) => {
                proc.stop(spec.timeout).await;
                Finish::Failed(format!("waiting for '{}': {e}", spec.command))
            }
            Some(Err(_)) => {
                info!(
                    cmd = %spec.command,
                    timeout_ms = spec.timeout.as_millis() as u64,
                    "command timed out"
                );
                proc.stop(spec.timeout).await;
                Finish::TimedOut
            }
            None => {
                info!(cmd = %spec.command, "command cancelled");
                proc.stop(spec.timeout).await;
                Finish::Interrupted
            }
        };

        let result = proc
            .finish(finish, self.options.reader_join_timeout, started)
            .await;
        info!(
            cmd = %spec.command,
            outcome = %result.outcome,
            exit_code = result.exit_code,
            elapsed_ms = result.elapsed.as_millis() as u64,
            "command finished"
        );
        result
    }

    async fn run_until_inner(&self, spec: &CommandSpec, marker: &Path) -> ExecResult {
        let started = Instant::now();
        // None: the timeout does not fit on the clock, so there is no deadline
        let deadline = started.checked_add(spec.timeout);

        if marker.exists() {
            warn!(
                marker = %marker.display(),
                "marker already exists before start; it will be reported immediately"
            );
        }

        let mut proc = match self.spawn(spec, true) {
            Ok(proc) => proc,
            Err(err) => {
                warn!(cmd = %spec.command, error = %format!("{err:#}"), "failed to start command");
                return ExecResult::failed(String::new(), String::new(), format!("{err:#}"))
                    .with_elapsed(started.elapsed());
            }
        };

        let finish = loop {
            match proc.child.try_wait() {
                Ok(Some(status)) => break self.exited(&mut proc, status, spec.timeout).await,
                Ok(None) => {}
                Err(e) => {
                    proc.stop(spec.timeout).await;
                    break Finish::Failed(format!("polling '{}': {e}", spec.command));
                }
            }

            if marker.exists() {
                info!(marker = %marker.display(), "marker file detected; stopping process group");
                proc.stop(spec.timeout).await;
                remove_marker(marker).await;
                break Finish::MarkerFound;
            }

            if deadline.is_some_and(|deadline| Instant::now() >= deadline) {
                info!(
                    cmd = %spec.command,
                    marker = %marker.display(),
                    timeout_ms = spec.timeout.as_millis() as u64,
                    "marker not seen before deadline; stopping process group"
                );
                proc.stop(spec.timeout).await;
                break Finish::TimedOut;
            }

            if spec.is_cancelled() {
                info!(cmd = %spec.command, "supervision cancelled; stopping process group");
                proc.stop(spec.timeout).await;
                break Finish::Interrupted;
            }

            sleep(spec.poll_interval).await;
        };

        let result = proc
            .finish(finish, self.options.reader_join_timeout, started)
            .await;
        info!(
            cmd = %spec.command,
            outcome = %result.outcome,
            exit_code = result.exit_code,
            elapsed_ms = result.elapsed.as_millis() as u64,
            "supervised run finished"
        );
        result
    }
}

async fn remove_marker(marker: &Path) {
    match tokio::fs::remove_file(marker).await {
        Ok(()) => debug!(marker = %marker.display(), "removed marker file"),
        Err(e) => warn!(marker = %marker.display(), error = %e, "failed to remove marker file"),
    }
}

impl ControlInterface for LocalControl {
    fn exec_command_blocking<'a>(&'a self, spec: &'a CommandSpec) -> ControlFuture<'a> {
        Box::pin(self.exec_inner(spec))
    }

    fn run_until_file_deployed<'a>(
        &'a self,
        spec: &'a CommandSpec,
        file_path: &'a Path,
    ) -> ControlFuture<'a> {
        Box::pin(self.run_until_inner(spec, file_path))
    }
}
