// src/files/mod.rs

//! Moving files between this host and the target.
//!
//! [`FileTransfer`] is the collaborator the deployment helpers talk to. The
//! native and loopback targets share this host's filesystem
//! ([`LocalFiles`]); an ssh target copies over the session's control socket
//! ([`SshFiles`]).

use std::fmt::Debug;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;

use anyhow::Result;

pub mod local;
pub mod ssh;

pub use local::LocalFiles;
pub use ssh::SshFiles;

pub type TransferFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T>> + Send + 'a>>;

/// Abstract file-transfer interface.
pub trait FileTransfer: Send + Sync + Debug {
    /// Make `local` available at `remote` on the target.
    fn upload<'a>(&'a self, local: &'a Path, remote: &'a Path) -> TransferFuture<'a, ()>;

    /// Copy `remote` from the target to `local`.
    fn download<'a>(&'a self, remote: &'a Path, local: &'a Path) -> TransferFuture<'a, ()>;

    /// Every regular file below `remote`, recursively. Full paths.
    fn walk_files<'a>(&'a self, remote: &'a Path) -> TransferFuture<'a, Vec<PathBuf>>;
}
