// src/session/mod.rs

//! Shell-channel transports used by the remote backend.
//!
//! A session is an explicit handle to a connected target. Every call to
//! [`ShellSession::exec`] opens one channel: a local child process whose
//! stdout/stderr carry the remote command's output and whose exit status is
//! the remote exit status. Closing the channel means stopping that child.
//!
//! - [`ssh::SshSession`] talks to a device through an OpenSSH control
//!   master connection.
//! - [`loopback::LoopbackSession`] runs the shell on this host, optionally
//!   with an artificial round-trip delay.

use std::fmt;
use std::future::Future;
use std::pin::Pin;

use anyhow::Result;
use tokio::process::Child;

pub mod loopback;
pub mod ssh;

pub use loopback::LoopbackSession;
pub use ssh::{SshSession, SshTarget};

pub type SessionFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// One open channel.
#[derive(Debug)]
pub struct RemoteProcess {
    /// Local end of the channel; stdout and stderr are piped.
    pub child: Child,
    /// Process group to signal when closing, if the transport created one.
    pub process_group: Option<i32>,
}

pub trait ShellSession: Send + Sync + fmt::Debug {
    /// Start `command` (a complete shell line) on the target.
    fn exec<'a>(&'a self, command: &'a str) -> SessionFuture<'a, Result<RemoteProcess>>;

    /// Short human-readable name of the target, for logs.
    fn describe(&self) -> String;

    /// Release the session. Idempotent.
    fn close(&self) -> SessionFuture<'_, Result<()>>;
}
