// src/control/mod.rs

//! Command execution and deployment detection on a target.
//!
//! - [`ControlInterface`] is the capability every backend implements:
//!   `exec_command_blocking` and `run_until_file_deployed`.
//! - [`local`] runs the command as a local process group.
//! - [`remote`] drives a shell channel and probes for the marker with a
//!   separate round-trip command.
//! - [`Control`] picks one of the two once, when the target is set up.
//! - [`capture`], [`terminate`] and [`cancel`] are the shared building blocks.

use std::future::Future;
use std::path::Path;
use std::pin::Pin;
use std::process::ExitStatus;

use crate::types::{CommandSpec, ExecResult};

pub mod cancel;
pub mod capture;
pub mod local;
pub mod remote;
pub mod terminate;

pub use cancel::{CancelHandle, CancelToken, cancel_pair};
pub use local::{LocalControl, LocalOptions};
pub use remote::{RemoteControl, RemoteOptions};

/// Boxed future returned by [`ControlInterface`] operations.
pub type ControlFuture<'a> = Pin<Box<dyn Future<Output = ExecResult> + Send + 'a>>;

/// Platform independent way to run commands on the target.
///
/// Both operations are total: spawn and transport failures are reported
/// through [`ExecResult`] with `Outcome::Failed`, never as an error. Every
/// process or channel an operation creates is stopped before its future
/// resolves.
pub trait ControlInterface: Send + Sync {
    /// Run a command to completion or until `spec.timeout` elapses.
    fn exec_command_blocking<'a>(&'a self, spec: &'a CommandSpec) -> ControlFuture<'a>;

    /// Start a command and stop it once `file_path` exists.
    ///
    /// Checked every `spec.poll_interval`, in this order: natural exit,
    /// marker present, deadline passed.
    fn run_until_file_deployed<'a>(
        &'a self,
        spec: &'a CommandSpec,
        file_path: &'a Path,
    ) -> ControlFuture<'a>;
}

/// The backend chosen for a target session.
#[derive(Debug)]
pub enum Control {
    Local(LocalControl),
    Remote(RemoteControl),
}

impl Control {
    pub fn is_remote(&self) -> bool {
        matches!(self, Control::Remote(_))
    }
}

impl ControlInterface for Control {
    fn exec_command_blocking<'a>(&'a self, spec: &'a CommandSpec) -> ControlFuture<'a> {
        match self {
            Control::Local(local) => local.exec_command_blocking(spec),
            Control::Remote(remote) => remote.exec_command_blocking(spec),
        }
    }

    fn run_until_file_deployed<'a>(
        &'a self,
        spec: &'a CommandSpec,
        file_path: &'a Path,
    ) -> ControlFuture<'a> {
        match self {
            Control::Local(local) => local.run_until_file_deployed(spec, file_path),
            Control::Remote(remote) => remote.run_until_file_deployed(spec, file_path),
        }
    }
}

/// How a supervision loop ended, before output is attached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Finish {
    Exited(i32),
    MarkerFound,
    TimedOut,
    Interrupted,
    Failed(String),
}

impl Finish {
    pub(crate) fn into_result(self, stdout: String, stderr: String) -> ExecResult {
        match self {
            Finish::Exited(code) => ExecResult::exited(code, stdout, stderr),
            Finish::MarkerFound => ExecResult::marker_found(stdout, stderr),
            Finish::TimedOut => ExecResult::timed_out(stdout, stderr),
            Finish::Interrupted => ExecResult::interrupted(stdout, stderr),
            Finish::Failed(error) => ExecResult::failed(stdout, stderr, error),
        }
    }
}

/// Real exit status, or `128 + signal` for signal deaths.
pub(crate) fn exit_code_from_status(status: ExitStatus) -> i32 {
    use std::os::unix::process::ExitStatusExt;

    match (status.code(), status.signal()) {
        (Some(code), _) => code,
        (None, Some(signal)) => 128 + signal,
        (None, None) => -1,
    }
}
