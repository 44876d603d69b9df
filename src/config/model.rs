// src/config/model.rs

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use serde::Deserialize;

use crate::control::capture::DEFAULT_READER_JOIN_TIMEOUT;
use crate::types::{DEFAULT_POLL_INTERVAL, DEFAULT_TIMEOUT};

/// Top-level configuration as read from a TOML file.
///
/// ```toml
/// [target]
/// kind = "ssh"
/// host = "192.168.100.10"
/// user = "root"
///
/// [local]
/// wrapper = ["/usr/bin/fakeroot"]
///
/// [remote]
/// default_env = { PATH = "/proc/boot" }
///
/// [defaults]
/// timeout = "1s"
/// poll_interval = "50ms"
/// ```
///
/// All sections are optional.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawConfigFile {
    #[serde(default)]
    pub target: RawTargetSection,

    #[serde(default)]
    pub local: LocalSection,

    #[serde(default)]
    pub remote: RemoteSection,

    #[serde(default)]
    pub defaults: RawDefaultsSection,
}

/// Which backend drives the target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum TargetKind {
    /// Commands run as local process groups.
    #[default]
    Native,
    /// Commands run over an OpenSSH connection.
    Ssh,
    /// Polling-shell backend against this host.
    Loopback,
}

impl fmt::Display for TargetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TargetKind::Native => "native",
            TargetKind::Ssh => "ssh",
            TargetKind::Loopback => "loopback",
        };
        f.write_str(s)
    }
}

/// `[target]` section.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawTargetSection {
    #[serde(default)]
    pub kind: TargetKind,

    /// Required for `kind = "ssh"`.
    #[serde(default)]
    pub host: Option<String>,

    #[serde(default)]
    pub user: Option<String>,

    #[serde(default)]
    pub port: Option<u16>,

    /// Extra `-o` options handed to ssh and scp.
    #[serde(default)]
    pub ssh_options: Vec<String>,

    /// Simulated round trip for `kind = "loopback"`, e.g. `"20ms"`.
    #[serde(default)]
    pub latency: Option<String>,
}

/// `[local]` section.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct LocalSection {
    /// Prepended to the command in `run_until_file_deployed`.
    #[serde(default)]
    pub wrapper: Vec<String>,
}

/// `[remote]` section.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct RemoteSection {
    /// Exported before every `exec_command_blocking` on a remote target.
    #[serde(default)]
    pub default_env: BTreeMap<String, String>,
}

/// `[defaults]` section, durations still as strings.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawDefaultsSection {
    #[serde(default)]
    pub timeout: Option<String>,

    #[serde(default)]
    pub poll_interval: Option<String>,

    #[serde(default)]
    pub reader_join_timeout: Option<String>,
}

/// Checked `[target]` section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TargetConfig {
    Native,
    Ssh {
        host: String,
        user: Option<String>,
        port: Option<u16>,
        options: Vec<String>,
    },
    Loopback {
        latency: Duration,
    },
}

impl TargetConfig {
    pub fn kind(&self) -> TargetKind {
        match self {
            TargetConfig::Native => TargetKind::Native,
            TargetConfig::Ssh { .. } => TargetKind::Ssh,
            TargetConfig::Loopback { .. } => TargetKind::Loopback,
        }
    }
}

/// Checked `[defaults]` section.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Defaults {
    pub timeout: Duration,
    pub poll_interval: Duration,
    pub reader_join_timeout: Duration,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            poll_interval: DEFAULT_POLL_INTERVAL,
            reader_join_timeout: DEFAULT_READER_JOIN_TIMEOUT,
        }
    }
}

/// Validated configuration.
///
/// Only obtainable through `TryFrom<RawConfigFile>` or [`Default`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigFile {
    pub target: TargetConfig,
    pub local: LocalSection,
    pub remote: RemoteSection,
    pub defaults: Defaults,
}

impl ConfigFile {
    pub(crate) fn new_unchecked(
        target: TargetConfig,
        local: LocalSection,
        remote: RemoteSection,
        defaults: Defaults,
    ) -> Self {
        Self {
            target,
            local,
            remote,
            defaults,
        }
    }
}

impl Default for ConfigFile {
    fn default() -> Self {
        Self::new_unchecked(
            TargetConfig::Native,
            LocalSection::default(),
            RemoteSection::default(),
            Defaults::default(),
        )
    }
}
