// src/control/remote.rs

//! Remote polling-shell backend.
//!
//! There is no local process to poll. The command runs over one channel of a
//! [`ShellSession`]; liveness comes from the channel's exit status and the
//! marker is detected by running a separate `test -f` probe each tick. A
//! tick therefore costs at least one network round trip on top of
//! `poll_interval`.
//!
//! Closing a channel stops the local end only. Whether the remote process
//! dies with it depends on the remote side; it is not verified.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;
use tokio::time::{Instant, sleep, timeout};
use tracing::{debug, info, warn};

use crate::control::cancel::wait_cancelled;
use crate::control::capture::{self, DEFAULT_READER_JOIN_TIMEOUT, StreamCapture};
use crate::control::terminate::REAP_TIMEOUT;
use crate::control::{ControlFuture, ControlInterface, Finish, exit_code_from_status};
use crate::session::{RemoteProcess, ShellSession};
use crate::types::{CommandLine, CommandSpec, ExecResult};

pub const PROBE_FOUND: &str = "EXISTS";
pub const PROBE_MISSING: &str = "NOT_EXISTS";

#[derive(Debug, Clone)]
pub struct RemoteOptions {
    /// Environment spliced in front of every `exec_command_blocking` call;
    /// caller variables win on conflicts.
    pub default_env: BTreeMap<String, String>,
    pub reader_join_timeout: Duration,
}

impl Default for RemoteOptions {
    fn default() -> Self {
        Self {
            default_env: BTreeMap::new(),
            reader_join_timeout: DEFAULT_READER_JOIN_TIMEOUT,
        }
    }
}

#[derive(Debug)]
pub struct RemoteControl {
    session: Arc<dyn ShellSession>,
    options: RemoteOptions,
}

/// Build the single shell line sent over the channel.
///
/// `export K=V ...; cd <cwd> && <command>`. Keys and values are spliced in
/// verbatim, so quoting is the caller's responsibility.
pub fn compose_command(
    command: &CommandLine,
    cwd: Option<&Path>,
    env: &BTreeMap<String, String>,
) -> String {
    let mut line = String::new();
    if !env.is_empty() {
        let assignments: Vec<String> = env.iter().map(|(k, v)| format!("{k}={v}")).collect();
        line.push_str("export ");
        line.push_str(&assignments.join(" "));
        line.push_str("; ");
    }
    if let Some(cwd) = cwd {
        line.push_str(&format!("cd {} && ", cwd.display()));
    }
    line.push_str(&command.to_shell_string());
    line
}

/// The existence check run each polling tick.
pub fn probe_command(path: &Path) -> String {
    let quoted = shell_words::quote(&path.to_string_lossy()).into_owned();
    format!("test -f {quoted} && echo '{PROBE_FOUND}' || echo '{PROBE_MISSING}'")
}

/// Interpret probe output. Anything other than the found token is "not yet".
pub fn parse_probe(output: &str) -> bool {
    output.trim() == PROBE_FOUND
}

/// Whether the probe ran far enough to print one of its two tokens.
fn probe_answered(output: &str) -> bool {
    matches!(output.trim(), PROBE_FOUND | PROBE_MISSING)
}

/// One open command channel with its output readers.
struct Channel {
    process: RemoteProcess,
    stdout: StreamCapture,
    stderr: StreamCapture,
}

impl Channel {
    async fn open(session: &dyn ShellSession, line: &str) -> Result<Self> {
        let mut process = session.exec(line).await?;
        let stdout = capture::spawn_reader("stdout", process.child.stdout.take());
        let stderr = capture::spawn_reader("stderr", process.child.stderr.take());
        Ok(Self {
            process,
            stdout,
            stderr,
        })
    }

    /// Non-blocking: the exit code if the command already finished.
    fn exit_status_ready(&mut self) -> Result<Option<i32>> {
        let status = self
            .process
            .child
            .try_wait()
            .context("checking channel exit status")?;
        Ok(status.map(exit_code_from_status))
    }

    async fn recv_exit_status(&mut self) -> Result<i32> {
        let status = self
            .process
            .child
            .wait()
            .await
            .context("waiting for channel exit status")?;
        Ok(exit_code_from_status(status))
    }

    /// Stop the local end of the channel. Safe to call after exit.
    ///
    /// Returns false if the channel process could not be reaped in time.
    async fn close(&mut self) -> bool {
        match self.process.process_group {
            Some(pgid) => {
                if let Err(e) = signal::killpg(Pid::from_raw(pgid), Signal::SIGKILL) {
                    debug!(pgid, error = %e, "channel group already gone");
                }
            }
            None => {
                if let Err(e) = self.process.child.start_kill() {
                    debug!(error = %e, "channel already closed");
                }
            }
        }
        if timeout(REAP_TIMEOUT, self.process.child.wait()).await.is_err() {
            warn!("channel process did not exit after close");
            return false;
        }
        true
    }

    /// Close, collect output and attach `finish`.
    async fn finish(mut self, finish: Finish, join_timeout: Duration) -> ExecResult {
        let closed = self.close().await;
        let (stdout, stderr) = self.collect(join_timeout).await;
        let result = finish.into_result(stdout, stderr);
        if closed {
            result
        } else {
            result.with_unconfirmed_termination("channel process did not exit after close")
        }
    }

    async fn collect(self, join_timeout: Duration) -> (String, String) {
        capture::finish_pair(self.stdout, self.stderr, join_timeout).await
    }
}

impl RemoteControl {
    pub fn new(session: Arc<dyn ShellSession>, options: RemoteOptions) -> Self {
        Self { session, options }
    }

    /// Ask the target whether `path` exists.
    ///
    /// A probe that fails without printing either token means the channel
    /// itself broke, and is an error rather than "not found".
    async fn probe_marker(&self, path: &Path) -> Result<bool> {
        let probe = self.session.exec(&probe_command(path)).await?;
        let output = probe
            .child
            .wait_with_output()
            .await
            .context("reading marker probe output")?;
        let stdout = String::from_utf8_lossy(&output.stdout);
        if !output.status.success() && !probe_answered(&stdout) {
            bail!(
                "probe exited with {}: {}",
                exit_code_from_status(output.status),
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }
        Ok(parse_probe(&stdout))
    }

    async fn exec_inner(&self, spec: &CommandSpec) -> ExecResult {
        let started = Instant::now();
        let mut env = self.options.default_env.clone();
        env.extend(spec.env.iter().map(|(k, v)| (k.clone(), v.clone())));
        let line = compose_command(&spec.command, spec.cwd.as_deref(), &env);
        debug!(dest = %self.session.describe(), command = %line, "running remote command");

        let mut channel = match Channel::open(self.session.as_ref(), &line).await {
            Ok(channel) => channel,
            Err(err) => {
                warn!(
                    dest = %self.session.describe(),
                    error = %format!("{err:#}"),
                    "failed to open channel"
                );
                return ExecResult::failed(String::new(), String::new(), format!("{err:#}"))
                    .with_elapsed(started.elapsed());
            }
        };

        let waited = tokio::select! {
            res = timeout(spec.timeout, channel.recv_exit_status()) => Some(res),
            _ = wait_cancelled(spec.cancel.as_ref()) => None,
        };
        let finish = match waited {
            Some(Ok(Ok(code))) => Finish::Exited(code),
            Some(Ok(Err(err))) => Finish::Failed(format!("{err:#}")),
            Some(Err(_)) => {
                info!(
                    command = %line,
                    timeout_ms = spec.timeout.as_millis() as u64,
                    "remote command timed out; closing channel"
                );
                Finish::TimedOut
            }
            None => Finish::Interrupted,
        };

        let result = channel
            .finish(finish, self.options.reader_join_timeout)
            .await
            .with_elapsed(started.elapsed());
        info!(
            dest = %self.session.describe(),
            outcome = %result.outcome,
            exit_code = result.exit_code,
            elapsed_ms = result.elapsed.as_millis() as u64,
            "remote command finished"
        );
        result
    }

    async fn run_until_inner(&self, spec: &CommandSpec, marker: &Path) -> ExecResult {
        let started = Instant::now();
        // None: the timeout does not fit on the clock, so there is no deadline
        let deadline = started.checked_add(spec.timeout);
        let line = compose_command(&spec.command, spec.cwd.as_deref(), &spec.env);
        info!(
            dest = %self.session.describe(),
            command = %line,
            marker = %marker.display(),
            "starting remote command"
        );

        let mut channel = match Channel::open(self.session.as_ref(), &line).await {
            Ok(channel) => channel,
            Err(err) => {
                warn!(
                    dest = %self.session.describe(),
                    error = %format!("{err:#}"),
                    "failed to open channel"
                );
                return ExecResult::failed(String::new(), String::new(), format!("{err:#}"))
                    .with_elapsed(started.elapsed());
            }
        };

        let finish = loop {
            match channel.exit_status_ready() {
                Ok(Some(code)) => break Finish::Exited(code),
                Ok(None) => {}
                Err(err) => break Finish::Failed(format!("{err:#}")),
            }

            let remaining = deadline.map(|d| d.saturating_duration_since(Instant::now()));
            if remaining.is_none_or(|r| !r.is_zero()) {
                // tokio's timeout treats an unrepresentable deadline as "never"
                let budget = remaining.unwrap_or(Duration::MAX);
                match timeout(budget, self.probe_marker(marker)).await {
                    Ok(Ok(true)) => {
                        info!(
                            marker = %marker.display(),
                            "marker file detected on target; closing channel"
                        );
                        break Finish::MarkerFound;
                    }
                    Ok(Ok(false)) => debug!(
                        marker = %marker.display(),
                        poll_ms = spec.poll_interval.as_millis() as u64,
                        "marker not found; probing again after poll interval"
                    ),
                    Ok(Err(err)) => break Finish::Failed(format!("marker probe failed: {err:#}")),
                    Err(_) => {
                        debug!(marker = %marker.display(), "marker probe still pending at deadline")
                    }
                }
            }

            if deadline.is_some_and(|deadline| Instant::now() >= deadline) {
                info!(
                    marker = %marker.display(),
                    timeout_ms = spec.timeout.as_millis() as u64,
                    "marker not seen before deadline; closing channel"
                );
                break Finish::TimedOut;
            }

            if spec.is_cancelled() {
                info!(command = %line, "supervision cancelled; closing channel");
                break Finish::Interrupted;
            }

            sleep(spec.poll_interval).await;
        };

        let result = channel
            .finish(finish, self.options.reader_join_timeout)
            .await
            .with_elapsed(started.elapsed());
        info!(
            dest = %self.session.describe(),
            outcome = %result.outcome,
            exit_code = result.exit_code,
            elapsed_ms = result.elapsed.as_millis() as u64,
            "supervised remote run finished"
        );
        result
    }
}

impl ControlInterface for RemoteControl {
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

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::path::PathBuf;

    #[test]
    fn compose_puts_env_before_cd_and_command() {
        let mut env = BTreeMap::new();
        env.insert("PATH".to_string(), "/proc/boot".to_string());
        env.insert("A".to_string(), "1".to_string());
        let line = compose_command(
            &CommandLine::from(vec!["./bin", "--flag"]),
            Some(Path::new("/opt/score")),
            &env,
        );
        assert_eq!(line, "export A=1 PATH=/proc/boot; cd /opt/score && ./bin --flag");
    }

    #[test]
    fn compose_without_env_or_cwd_is_the_command() {
        let line = compose_command(&CommandLine::from("echo hi"), None, &BTreeMap::new());
        assert_eq!(line, "echo hi");
    }

    #[test]
    fn compose_does_not_quote_values() {
        let mut env = BTreeMap::new();
        env.insert("MSG".to_string(), "two words".to_string());
        let line = compose_command(&CommandLine::from("true"), None, &env);
        assert_eq!(line, "export MSG=two words; true");
    }

    #[test]
    fn probe_quotes_the_path() {
        let cmd = probe_command(&PathBuf::from("/tmp/with space/test_end"));
        assert_eq!(
            cmd,
            "test -f '/tmp/with space/test_end' && echo 'EXISTS' || echo 'NOT_EXISTS'"
        );
    }

    #[test]
    fn marker_check_answer_requires_a_token() {
        assert!(probe_answered("EXISTS\n"));
        assert!(probe_answered("NOT_EXISTS\n"));
        assert!(!probe_answered(""));
        assert!(!probe_answered("Connection to dut closed."));
    }

    #[test]
    fn probe_output_parsing() {
        assert!(parse_probe("EXISTS\n"));
        assert!(!parse_probe("NOT_EXISTS\n"));
        assert!(!parse_probe(""));
        assert!(!parse_probe("sh: test: not found"));
    }

    proptest! {
        #[test]
        fn composed_line_always_ends_with_the_command(
            cmd in "[a-z]{1,8}( [a-z0-9]{1,8}){0,3}",
            cwd in proptest::option::of("/[a-z]{1,8}"),
            keys in proptest::collection::btree_map("[A-Z]{1,6}", "[a-z0-9]{0,6}", 0..4),
        ) {
            let line = compose_command(
                &CommandLine::from(cmd.as_str()),
                cwd.as_deref().map(Path::new),
                &keys,
            );
            prop_assert!(line.ends_with(&cmd));
            if let Some(cwd) = cwd {
                let expected = format!("cd {cwd} && ");
                prop_assert!(line.contains(&expected));
            }
            for (k, v) in &keys {
                let expected = format!("{k}={v}");
                prop_assert!(line.contains(&expected));
            }
        }
    }
}
