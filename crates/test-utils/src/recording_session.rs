use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Result;
use targetctl::session::{LoopbackSession, RemoteProcess, SessionFuture, ShellSession};

/// A loopback session that remembers every command line it was given.
#[derive(Debug, Clone, Default)]
pub struct RecordingSession {
    inner: LoopbackSession,
    commands: Arc<Mutex<Vec<String>>>,
}

impl RecordingSession {
    pub fn new(latency: Duration) -> Self {
        Self {
            inner: LoopbackSession::with_latency(latency),
            ..Self::default()
        }
    }

    pub fn commands(&self) -> Vec<String> {
        self.commands.lock().unwrap().clone()
    }

    /// Commands that were marker probes.
    pub fn probes(&self) -> Vec<String> {
        self.commands()
            .into_iter()
            .filter(|c| c.starts_with("test -f "))
            .collect()
    }
}

impl ShellSession for RecordingSession {
    fn exec<'a>(&'a self, command: &'a str) -> SessionFuture<'a, Result<RemoteProcess>> {
        {
            let mut guard = self.commands.lock().unwrap();
            guard.push(command.to_string());
        }
        self.inner.exec(command)
    }

    fn describe(&self) -> String {
        "recording".to_string()
    }

    fn close(&self) -> SessionFuture<'_, Result<()>> {
        self.inner.close()
    }
}
