// src/types.rs

//! Value types shared by both execution backends.
//!
//! - [`CommandLine`] / [`CommandSpec`] describe what to run and under which
//!   budget.
//! - [`ExecResult`] is the three-value result contract `(exit_code, stdout,
//!   stderr)`, tagged with an [`Outcome`] so that "marker found" and "exited
//!   with 0" can be told apart even though both carry the code `0`.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use crate::control::cancel::CancelToken;

/// Sentinel exit code reported when the deadline elapsed.
pub const TIMEOUT_CODE: i32 = -1;

/// Sentinel exit code reported when the marker file was observed.
///
/// Collides with a successful natural exit; use [`ExecResult::outcome`] to
/// disambiguate.
pub const FILE_FOUND_CODE: i32 = 0;

/// Exit code reported when the command could not be run or supervised.
pub const FAILURE_CODE: i32 = -1;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(1);
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// The command to run, either as an argument vector or as one shell string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandLine {
    Argv(Vec<String>),
    Shell(String),
}

impl CommandLine {
    /// Split into an argument vector for direct process spawning.
    ///
    /// Shell strings are split with shell-style word rules; no shell
    /// interpreter is involved.
    pub fn to_argv(&self) -> Result<Vec<String>, shell_words::ParseError> {
        match self {
            CommandLine::Argv(args) => Ok(args.clone()),
            CommandLine::Shell(line) => shell_words::split(line),
        }
    }

    /// Render as a single command line for a shell channel.
    ///
    /// Arguments are joined with single spaces and are NOT quoted.
    pub fn to_shell_string(&self) -> String {
        match self {
            CommandLine::Argv(args) => args.join(" "),
            CommandLine::Shell(line) => line.clone(),
        }
    }
}

impl fmt::Display for CommandLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_shell_string())
    }
}

impl From<&str> for CommandLine {
    fn from(line: &str) -> Self {
        CommandLine::Shell(line.to_string())
    }
}

impl From<String> for CommandLine {
    fn from(line: String) -> Self {
        CommandLine::Shell(line)
    }
}

impl From<Vec<String>> for CommandLine {
    fn from(args: Vec<String>) -> Self {
        CommandLine::Argv(args)
    }
}

impl From<Vec<&str>> for CommandLine {
    fn from(args: Vec<&str>) -> Self {
        CommandLine::Argv(args.into_iter().map(str::to_string).collect())
    }
}

/// Everything a backend needs to run one command.
///
/// Built per call and passed by reference, so it cannot change while the
/// command runs.
#[derive(Debug, Clone)]
pub struct CommandSpec {
    pub command: CommandLine,
    pub cwd: Option<PathBuf>,
    /// Overrides applied on top of the backend's default environment.
    pub env: BTreeMap<String, String>,
    pub timeout: Duration,
    pub poll_interval: Duration,
    pub cancel: Option<CancelToken>,
}

impl CommandSpec {
    pub fn new(command: impl Into<CommandLine>) -> Self {
        Self {
            command: command.into(),
            cwd: None,
            env: BTreeMap::new(),
            timeout: DEFAULT_TIMEOUT,
            poll_interval: DEFAULT_POLL_INTERVAL,
            cancel: None,
        }
    }

    pub fn cwd(mut self, cwd: impl Into<PathBuf>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn envs<I, K, V>(mut self, vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.env
            .extend(vars.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn cancel_token(mut self, token: CancelToken) -> Self {
        self.cancel = Some(token);
        self
    }

    pub(crate) fn is_cancelled(&self) -> bool {
        self.cancel.as_ref().is_some_and(CancelToken::is_cancelled)
    }
}

/// Why a supervised call returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// The process exited on its own; `exit_code` is its real status.
    Exited,
    /// The marker file was observed and the process was stopped.
    MarkerFound,
    /// The deadline elapsed and the process was stopped.
    TimedOut,
    /// A cancellation token fired and the process was stopped.
    Interrupted,
    /// Spawning or supervising failed; details are in `stderr`.
    Failed,
}

impl Outcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Exited => "exited",
            Outcome::MarkerFound => "marker-found",
            Outcome::TimedOut => "timed-out",
            Outcome::Interrupted => "interrupted",
            Outcome::Failed => "failed",
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of one supervised call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecResult {
    pub outcome: Outcome,
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
    pub elapsed: Duration,
    /// Pid of the spawned process (also its process group id on the local
    /// backend). `None` for remote channels or when spawning failed.
    pub pid: Option<u32>,
    /// False when the process tree (local) or channel (remote) could not be
    /// confirmed gone before returning.
    pub termination_confirmed: bool,
}

impl ExecResult {
    fn with_outcome(outcome: Outcome, exit_code: i32, stdout: String, stderr: String) -> Self {
        Self {
            outcome,
            exit_code,
            stdout,
            stderr,
            elapsed: Duration::ZERO,
            pid: None,
            termination_confirmed: true,
        }
    }

    pub fn exited(exit_code: i32, stdout: String, stderr: String) -> Self {
        Self::with_outcome(Outcome::Exited, exit_code, stdout, stderr)
    }

    pub fn marker_found(stdout: String, stderr: String) -> Self {
        Self::with_outcome(Outcome::MarkerFound, FILE_FOUND_CODE, stdout, stderr)
    }

    pub fn timed_out(stdout: String, stderr: String) -> Self {
        Self::with_outcome(Outcome::TimedOut, TIMEOUT_CODE, stdout, stderr)
    }

    pub fn interrupted(stdout: String, stderr: String) -> Self {
        Self::with_outcome(Outcome::Interrupted, FAILURE_CODE, stdout, stderr)
    }

    /// Failure result; `error` is appended to whatever stderr was captured.
    pub fn failed(stdout: String, mut stderr: String, error: impl fmt::Display) -> Self {
        if !stderr.is_empty() && !stderr.ends_with('\n') {
            stderr.push('\n');
        }
        stderr.push_str(&error.to_string());
        Self::with_outcome(Outcome::Failed, FAILURE_CODE, stdout, stderr)
    }

    pub fn with_elapsed(mut self, elapsed: Duration) -> Self {
        self.elapsed = elapsed;
        self
    }

    pub fn with_pid(mut self, pid: Option<u32>) -> Self {
        self.pid = pid;
        self
    }

    /// Record that stopping the process could not be confirmed; a note is
    /// appended to stderr so the condition is visible in the plain tuple too.
    pub fn with_unconfirmed_termination(mut self, detail: impl fmt::Display) -> Self {
        self.termination_confirmed = false;
        if !self.stderr.is_empty() && !self.stderr.ends_with('\n') {
            self.stderr.push('\n');
        }
        self.stderr
            .push_str(&format!("termination not confirmed: {detail}\n"));
        self
    }

    /// The untagged `(exit_code, stdout, stderr)` shape.
    pub fn into_tuple(self) -> (i32, String, String) {
        (self.exit_code, self.stdout, self.stderr)
    }

    pub fn is_marker_found(&self) -> bool {
        self.outcome == Outcome::MarkerFound
    }

    pub fn is_timeout(&self) -> bool {
        self.outcome == Outcome::TimedOut
    }

    /// True only for a natural exit with status 0.
    pub fn success(&self) -> bool {
        self.outcome == Outcome::Exited && self.exit_code == 0
    }

    /// Exit status for a CLI process reporting this result.
    pub fn process_exit_code(&self) -> i32 {
        match self.outcome {
            Outcome::Exited => self.exit_code.clamp(0, 255),
            Outcome::MarkerFound => 0,
            Outcome::TimedOut => 124,
            Outcome::Failed => 125,
            Outcome::Interrupted => 130,
        }
    }
}

/// Parse a duration like "50ms", "3s", "2m" or "1h".
pub fn parse_duration(s: &str) -> Result<Duration, String> {
    let s = s.trim();
    if s.is_empty() {
        return Err("empty duration string".to_string());
    }

    let idx = s
        .chars()
        .position(|c| !c.is_ascii_digit())
        .ok_or_else(|| "duration missing unit suffix".to_string())?;

    let (num_part, unit_part) = s.split_at(idx);
    let value: u64 = num_part
        .parse()
        .map_err(|e| format!("invalid duration number '{}': {}", num_part, e))?;
    let unit = unit_part.trim().to_lowercase();

    let seconds_per_unit = match unit.as_str() {
        "ms" => return Ok(Duration::from_millis(value)),
        "s" => 1,
        "m" => 60,
        "h" => 60 * 60,
        _ => {
            return Err(format!(
                "unsupported duration unit '{}'; expected ms, s, m, or h",
                unit
            ));
        }
    };
    value
        .checked_mul(seconds_per_unit)
        .map(Duration::from_secs)
        .ok_or_else(|| format!("duration too large: '{s}'"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn marker_found_and_clean_exit_share_a_code_but_not_an_outcome() {
        let found = ExecResult::marker_found(String::new(), String::new());
        let exited = ExecResult::exited(0, String::new(), String::new());

        assert_eq!(found.exit_code, exited.exit_code);
        assert_ne!(found.outcome, exited.outcome);
        assert!(exited.success());
        assert!(!found.success());
    }

    #[test]
    fn tuple_shape_keeps_code_and_streams() {
        let found = ExecResult::marker_found("up\n".to_string(), "warn\n".to_string());
        assert!(found.is_marker_found());
        assert!(!found.is_timeout());
        assert_eq!(
            found.into_tuple(),
            (FILE_FOUND_CODE, "up\n".to_string(), "warn\n".to_string())
        );

        let timed_out = ExecResult::timed_out(String::new(), String::new());
        assert!(timed_out.is_timeout());
        assert_eq!(timed_out.into_tuple(), (TIMEOUT_CODE, String::new(), String::new()));
    }

    #[test]
    fn unconfirmed_termination_is_flagged_and_noted() {
        let res = ExecResult::timed_out(String::new(), "partial".to_string());
        assert!(res.termination_confirmed);

        let res = res.with_unconfirmed_termination("force-killed");
        assert!(!res.termination_confirmed);
        assert_eq!(res.stderr, "partial\ntermination not confirmed: force-killed\n");
        assert_eq!(res.outcome, Outcome::TimedOut);
    }

    #[test]
    fn failed_appends_error_to_captured_stderr() {
        let res = ExecResult::failed(String::new(), "partial".to_string(), "boom");
        assert_eq!(res.stderr, "partial\nboom");
        assert_eq!(res.exit_code, FAILURE_CODE);
    }

    #[test]
    fn process_exit_code_maps_sentinels() {
        let timed_out = ExecResult::timed_out(String::new(), String::new());
        assert_eq!(timed_out.exit_code, TIMEOUT_CODE);
        assert_eq!(timed_out.process_exit_code(), 124);
        assert_eq!(
            ExecResult::exited(300, String::new(), String::new()).process_exit_code(),
            255
        );
    }

    #[test]
    fn shell_lines_split_with_quotes() {
        let cmd = CommandLine::from("echo 'hello world' two");
        assert_eq!(
            cmd.to_argv().unwrap(),
            vec!["echo".to_string(), "hello world".to_string(), "two".to_string()]
        );
    }

    #[test]
    fn argv_is_joined_without_quoting() {
        let cmd = CommandLine::from(vec!["ls", "-l", "/opt/my dir"]);
        assert_eq!(cmd.to_shell_string(), "ls -l /opt/my dir");
    }

    #[test]
    fn parse_duration_rejects_bad_input() {
        assert!(parse_duration("").is_err());
        assert!(parse_duration("10").is_err());
        assert!(parse_duration("10d").is_err());
        assert_eq!(parse_duration("50ms").unwrap(), Duration::from_millis(50));
        assert_eq!(parse_duration(" 2m ").unwrap(), Duration::from_secs(120));
    }

    #[test]
    fn parse_duration_rejects_overflowing_values() {
        let err = parse_duration("9999999999999999h").unwrap_err();
        assert!(err.contains("too large"));
        assert!(parse_duration("18446744073709551615m").is_err());
        assert_eq!(
            parse_duration("18446744073709551615s").unwrap(),
            Duration::from_secs(u64::MAX)
        );
    }

    proptest! {
        #[test]
        fn parse_duration_accepts_every_millisecond_value(n in 0u64..10_000_000) {
            prop_assert_eq!(parse_duration(&format!("{n}ms")).unwrap(), Duration::from_millis(n));
        }

        #[test]
        fn parse_duration_never_panics_on_large_hours(n in any::<u64>()) {
            let parsed = parse_duration(&format!("{n}h"));
            match n.checked_mul(3600) {
                Some(secs) => prop_assert_eq!(parsed.unwrap(), Duration::from_secs(secs)),
                None => prop_assert!(parsed.is_err()),
            }
        }
    }
}
