// src/target.rs

//! One connected target: the chosen backend plus its file transfer.
//!
//! The backend is picked once, from the config, when the target is opened.
//! A target that owns a session must be [`Target::close`]d; the session's
//! own `Drop` is only a backstop.

use std::sync::Arc;

use tracing::info;

use crate::config::{ConfigFile, TargetConfig, TargetKind};
use crate::control::{Control, LocalControl, LocalOptions, RemoteControl, RemoteOptions};
use crate::errors::Result;
use crate::files::{FileTransfer, LocalFiles, SshFiles};
use crate::session::{LoopbackSession, ShellSession, SshSession, SshTarget};

#[derive(Debug)]
pub struct Target {
    kind: TargetKind,
    control: Control,
    files: Arc<dyn FileTransfer>,
    session: Option<Arc<dyn ShellSession>>,
}

impl Target {
    /// Connect according to `cfg.target`.
    pub async fn open(cfg: &ConfigFile) -> Result<Self> {
        let local_options = LocalOptions {
            wrapper: cfg.local.wrapper.clone(),
            reader_join_timeout: cfg.defaults.reader_join_timeout,
        };
        let remote_options = RemoteOptions {
            default_env: cfg.remote.default_env.clone(),
            reader_join_timeout: cfg.defaults.reader_join_timeout,
        };

        let target = match &cfg.target {
            TargetConfig::Native => Self::native(local_options),
            TargetConfig::Loopback { latency } => {
                let session: Arc<dyn ShellSession> =
                    Arc::new(LoopbackSession::with_latency(*latency));
                Self::remote(
                    TargetKind::Loopback,
                    session,
                    Arc::new(LocalFiles::new()),
                    remote_options,
                )
            }
            TargetConfig::Ssh {
                host,
                user,
                port,
                options,
            } => {
                let ssh_target = SshTarget {
                    host: host.clone(),
                    user: user.clone(),
                    port: *port,
                    options: options.clone(),
                };
                let session = Arc::new(SshSession::connect(ssh_target).await?);
                let files = Arc::new(SshFiles::new(Arc::clone(&session)));
                Self::remote(TargetKind::Ssh, session, files, remote_options)
            }
        };
        info!(kind = %target.kind, "target ready");
        Ok(target)
    }

    /// Local process-group backend on this host.
    pub fn native(options: LocalOptions) -> Self {
        Self {
            kind: TargetKind::Native,
            control: Control::Local(LocalControl::new(options)),
            files: Arc::new(LocalFiles::new()),
            session: None,
        }
    }

    /// Polling-shell backend over an already open session.
    pub fn remote(
        kind: TargetKind,
        session: Arc<dyn ShellSession>,
        files: Arc<dyn FileTransfer>,
        options: RemoteOptions,
    ) -> Self {
        Self {
            kind,
            control: Control::Remote(RemoteControl::new(Arc::clone(&session), options)),
            files,
            session: Some(session),
        }
    }

    pub fn kind(&self) -> TargetKind {
        self.kind
    }

    pub fn control(&self) -> &Control {
        &self.control
    }

    pub fn files(&self) -> &dyn FileTransfer {
        self.files.as_ref()
    }

    pub fn is_remote(&self) -> bool {
        self.control.is_remote()
    }

    /// Whether deployed binaries live on a separate filesystem and need
    /// their mode set there.
    pub fn has_own_filesystem(&self) -> bool {
        self.kind == TargetKind::Ssh
    }

    /// Release the session, if any.
    pub async fn close(self) -> Result<()> {
        if let Some(session) = self.session {
            info!(dest = %session.describe(), "closing target session");
            session.close().await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn default_config_opens_a_native_target() {
        let target = Target::open(&ConfigFile::default()).await.unwrap();
        assert_eq!(target.kind(), TargetKind::Native);
        assert!(!target.is_remote());
        assert!(!target.has_own_filesystem());
        target.close().await.unwrap();
    }

    #[tokio::test]
    async fn loopback_config_uses_the_polling_backend() {
        let mut cfg = ConfigFile::default();
        cfg.target = TargetConfig::Loopback {
            latency: Duration::from_millis(5),
        };
        let target = Target::open(&cfg).await.unwrap();
        assert_eq!(target.kind(), TargetKind::Loopback);
        assert!(target.is_remote());
        target.close().await.unwrap();
    }
}
