// src/session/loopback.rs

//! Shell channel on the local host.
//!
//! Exercises the polling-shell code path without a device. The optional
//! latency is paid before every channel opens, so the marker probe costs one
//! simulated round trip per tick just like it does over the network.

use std::process::Stdio;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::process::Command;
use tokio::time::sleep;
use tracing::trace;

use super::{RemoteProcess, SessionFuture, ShellSession};

#[derive(Debug, Clone, Default)]
pub struct LoopbackSession {
    latency: Duration,
}

impl LoopbackSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_latency(latency: Duration) -> Self {
        Self { latency }
    }
}

impl ShellSession for LoopbackSession {
    fn exec<'a>(&'a self, command: &'a str) -> SessionFuture<'a, Result<RemoteProcess>> {
        Box::pin(async move {
            if !self.latency.is_zero() {
                sleep(self.latency).await;
            }
            trace!(command, "loopback exec");

            let child = Command::new("sh")
                .arg("-c")
                .arg(command)
                .stdin(Stdio::null())
                .stdout(Stdio::piped())
                .stderr(Stdio::piped())
                .process_group(0)
                .kill_on_drop(true)
                .spawn()
                .with_context(|| format!("starting loopback shell for '{command}'"))?;

            let process_group = child.id().map(|pid| pid as i32);
            Ok(RemoteProcess {
                child,
                process_group,
            })
        })
    }

    fn describe(&self) -> String {
        format!("loopback(latency={}ms)", self.latency.as_millis())
    }

    fn close(&self) -> SessionFuture<'_, Result<()>> {
        Box::pin(async { Ok(()) })
    }
}
