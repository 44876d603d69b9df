// src/files/local.rs

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use tokio::fs;
use tracing::debug;
use walkdir::WalkDir;

use super::{FileTransfer, TransferFuture};

/// Target and host share one filesystem.
///
/// Upload symlinks instead of copying, so a rebuilt binary is picked up
/// without redeploying. An existing regular file at the destination is left
/// alone.
#[derive(Debug, Clone, Default)]
pub struct LocalFiles;

impl LocalFiles {
    pub fn new() -> Self {
        Self
    }

    async fn upload_inner(&self, local: &Path, remote: &Path) -> Result<()> {
        if let Some(parent) = remote.parent() {
            fs::create_dir_all(parent)
                .await
                .with_context(|| format!("creating dir {:?}", parent))?;
        }

        if remote.is_file() {
            debug!(path = %remote.display(), "destination already exists; skipping upload");
            return Ok(());
        }

        let source = fs::canonicalize(local)
            .await
            .with_context(|| format!("canonicalizing {:?}", local))?;
        fs::symlink(&source, remote)
            .await
            .with_context(|| format!("linking {:?} -> {:?}", remote, source))?;
        debug!(from = %source.display(), to = %remote.display(), "linked file");
        Ok(())
    }

    async fn download_inner(&self, remote: &Path, local: &Path) -> Result<()> {
        if let Some(parent) = local.parent() {
            fs::create_dir_all(parent)
                .await
                .with_context(|| format!("creating dir {:?}", parent))?;
        }
        fs::copy(remote, local)
            .await
            .with_context(|| format!("copying {:?} to {:?}", remote, local))?;
        Ok(())
    }

    async fn walk_inner(&self, remote: &Path) -> Result<Vec<PathBuf>> {
        let root = remote.to_path_buf();
        tokio::task::spawn_blocking(move || walk_dir(&root))
            .await
            .map_err(|e| anyhow!("directory walk task failed: {e}"))?
    }
}

fn walk_dir(root: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in WalkDir::new(root).sort_by_file_name() {
        let entry = entry.with_context(|| format!("walking {:?}", root))?;
        if entry.file_type().is_file() {
            files.push(entry.into_path());
        }
    }
    Ok(files)
}

impl FileTransfer for LocalFiles {
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
