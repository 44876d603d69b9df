// src/session/ssh.rs

//! OpenSSH transport with a persistent control master.
//!
//! `connect` opens one master connection (`ssh -MNf`); every channel and
//! every `scp` afterwards multiplexes over its control socket, so a probe
//! costs one round trip instead of a full handshake. `close` tears the
//! master down. Authentication is whatever the local ssh client is set up
//! to do; `BatchMode=yes` makes it fail instead of prompting.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::{Context, Result};
use tokio::process::Command;
use tracing::{debug, info, warn};

use super::{RemoteProcess, SessionFuture, ShellSession};
use crate::errors::TargetError;

/// Where and how to reach the device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SshTarget {
    pub host: String,
    pub user: Option<String>,
    pub port: Option<u16>,
    /// Extra `-o` options, e.g. `StrictHostKeyChecking=no`.
    pub options: Vec<String>,
}

impl SshTarget {
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            user: None,
            port: None,
            options: Vec::new(),
        }
    }

    /// `user@host` or plain `host`.
    pub fn destination(&self) -> String {
        match &self.user {
            Some(user) => format!("{user}@{}", self.host),
            None => self.host.clone(),
        }
    }
}

#[derive(Debug)]
pub struct SshSession {
    target: SshTarget,
    control_path: PathBuf,
    closed: AtomicBool,
}

impl SshSession {
    /// Open the control master connection.
    pub async fn connect(target: SshTarget) -> crate::errors::Result<Self> {
        if target.host.trim().is_empty() {
            return Err(TargetError::SessionError("ssh host cannot be empty".into()));
        }

        let control_path = control_path_for(&target);
        let mut cmd = Command::new("ssh");
        cmd.arg("-MNf")
            .args(["-o", "ControlMaster=yes", "-o", "ControlPersist=yes"])
            .args(common_options(&target, &control_path))
            .args(port_args("-p", target.port))
            .arg(target.destination())
            .stdin(Stdio::null());

        info!(
            dest = %target.destination(),
            control_path = %control_path.display(),
            "opening ssh control connection"
        );
        let output = cmd
            .output()
            .await
            .map_err(|e| TargetError::SessionError(format!("failed to run ssh: {e}")))?;
        if !output.status.success() {
            return Err(TargetError::SessionError(format!(
                "failed to open ssh connection to {}: {}",
                target.destination(),
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        Ok(Self {
            target,
            control_path,
            closed: AtomicBool::new(false),
        })
    }

    pub fn target(&self) -> &SshTarget {
        &self.target
    }

    /// Arguments for another `ssh`/`scp` invocation reusing this connection.
    ///
    /// `port_flag` is `-p` for ssh and `-P` for scp.
    pub fn multiplex_args(&self, port_flag: &str) -> Vec<String> {
        let mut args = common_options(&self.target, &self.control_path);
        args.extend(port_args(port_flag, self.target.port));
        args
    }

    fn exit_command(&self) -> std::process::Command {
        let mut cmd = std::process::Command::new("ssh");
        cmd.args(["-O", "exit"])
            .args(self.multiplex_args("-p"))
            .arg(self.target.destination())
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped());
        cmd
    }
}

fn control_path_for(target: &SshTarget) -> PathBuf {
    let host: String = target
        .host
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect();
    std::env::temp_dir().join(format!("targetctl-{host}-{}.sock", std::process::id()))
}

fn common_options(target: &SshTarget, control_path: &Path) -> Vec<String> {
    let mut args = vec![
        "-o".to_string(),
        format!("ControlPath={}", control_path.display()),
        "-o".to_string(),
        "BatchMode=yes".to_string(),
    ];
    for opt in &target.options {
        args.push("-o".to_string());
        args.push(opt.clone());
    }
    args
}

fn port_args(flag: &str, port: Option<u16>) -> Vec<String> {
    port.map(|p| vec![flag.to_string(), p.to_string()])
        .unwrap_or_default()
}

impl ShellSession for SshSession {
    fn exec<'a>(&'a self, command: &'a str) -> SessionFuture<'a, Result<RemoteProcess>> {
        Box::pin(async move {
            debug!(dest = %self.target.destination(), command, "ssh exec");
            let child = Command::new("ssh")
                .args(self.multiplex_args("-p"))
                .arg(self.target.destination())
                .arg("--")
                .arg(command)
                .stdin(Stdio::null())
                .stdout(Stdio::piped())
                .stderr(Stdio::piped())
                .kill_on_drop(true)
                .spawn()
                .with_context(|| format!("starting ssh channel for '{command}'"))?;

            Ok(RemoteProcess {
                child,
                process_group: None,
            })
        })
    }

    fn describe(&self) -> String {
        format!("ssh:{}", self.target.destination())
    }

    fn close(&self) -> SessionFuture<'_, Result<()>> {
        Box::pin(async move {
            if self.closed.swap(true, Ordering::SeqCst) {
                return Ok(());
            }
            info!(dest = %self.target.destination(), "closing ssh control connection");
            let output = Command::from(self.exit_command())
                .output()
                .await
                .context("running ssh -O exit")?;
            if !output.status.success() {
                warn!(
                    dest = %self.target.destination(),
                    stderr = %String::from_utf8_lossy(&output.stderr).trim(),
                    "ssh control connection did not exit cleanly"
                );
            }
            Ok(())
        })
    }
}

impl Drop for SshSession {
    fn drop(&mut self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            debug!(
                dest = %self.target.destination(),
                "ssh session dropped without close; stopping control master"
            );
            let _ = self.exit_command().status();
        }
    }
}
