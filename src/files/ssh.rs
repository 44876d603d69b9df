// src/files/ssh.rs

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use tokio::process::Command;
use tracing::debug;

use super::{FileTransfer, TransferFuture};
use crate::session::SshSession;

/// `scp` and `find` over an open [`SshSession`].
#[derive(Debug, Clone)]
pub struct SshFiles {
    session: Arc<SshSession>,
}

impl SshFiles {
    pub fn new(session: Arc<SshSession>) -> Self {
        Self { session }
    }

    fn remote_spec(&self, path: &Path) -> String {
        format!("{}:{}", self.session.target().destination(), path.display())
    }

    async fn scp(&self, from: &str, to: &str) -> Result<()> {
        debug!(from, to, "scp");
        let output = Command::new("scp")
            .arg("-q")
            .args(self.session.multiplex_args("-P"))
            .arg(from)
            .arg(to)
            .stdin(Stdio::null())
            .output()
            .await
            .context("running scp")?;
        if !output.status.success() {
            bail!(
                "scp {} -> {} failed: {}",
                from,
                to,
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }
        Ok(())
    }

    async fn upload_inner(&self, local: &Path, remote: &Path) -> Result<()> {
        if let Some(parent) = remote.parent() {
            self.run_remote(&format!(
                "mkdir -p {}",
                shell_words::quote(&parent.to_string_lossy())
            ))
            .await?;
        }
        let from = local.to_string_lossy().into_owned();
        self.scp(&from, &self.remote_spec(remote)).await
    }

    async fn download_inner(&self, remote: &Path, local: &Path) -> Result<()> {
        if let Some(parent) = local.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("creating dir {:?}", parent))?;
        }
        let to = local.to_string_lossy().into_owned();
        self.scp(&self.remote_spec(remote), &to).await
    }

    async fn walk_inner(&self, remote: &Path) -> Result<Vec<PathBuf>> {
        let listing = self
            .run_remote(&format!(
                "find {} -type f",
                shell_words::quote(&remote.to_string_lossy())
            ))
            .await?;
        Ok(parse_find_output(&listing))
    }

    /// Run a short helper command and return its stdout.
    async fn run_remote(&self, command: &str) -> Result<String> {
        let output = Command::new("ssh")
            .args(self.session.multiplex_args("-p"))
            .arg(self.session.target().destination())
            .arg("--")
            .arg(command)
            .stdin(Stdio::null())
            .output()
            .await
            .with_context(|| format!("running '{command}' over ssh"))?;
        if !output.status.success() {
            bail!(
                "'{}' failed on target: {}",
                command,
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

fn parse_find_output(listing: &str) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = listing
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(PathBuf::from)
        .collect();
    files.sort();
    files
}

impl FileTransfer for SshFiles {
    fn upload<'a>(&'a self, local: &'a Path, remote: &'a Path) -> TransferFuture<'a, ()> {
        Box::pin(self.upload_inner(local, remote))
    }

    fn download<'a>(&'a self, remote: &'a Path, local: &'a Path) -> TransferFuture<'a, ()> {
        Box::pin(self.download_inner(remote, local))
    }

    fn walk_files<'a>(&'a self, remote: &'a Path) -> TransferFuture<'a, Vec<PathBuf>> {
        Box::pin(self.walk_inner(remote))
    }
}
