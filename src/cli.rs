// src/cli.rs

//! CLI argument parsing using `clap`.

use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Parser, Subcommand, ValueEnum};

use crate::config::TargetKind;
use crate::types::parse_duration;

/// Command-line arguments for `targetctl`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "targetctl",
    version,
    about = "Run and supervise test binaries on a native, loopback or ssh target.",
    long_about = None
)]
pub struct CliArgs {
    /// Path to the config file (TOML).
    ///
    /// Default: `Targetctl.toml` in the current working directory, if present.
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Override `[target].kind`.
    #[arg(long, value_enum, value_name = "KIND")]
    pub target: Option<TargetKind>,

    /// Override `[target].host`.
    #[arg(long, value_name = "HOST")]
    pub host: Option<String>,

    /// Override `[target].user`.
    #[arg(long, value_name = "USER")]
    pub user: Option<String>,

    /// Override `[target].port`.
    #[arg(long, value_name = "PORT")]
    pub port: Option<u16>,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `TARGETCTL_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Run a command to completion or until the timeout.
    Exec(ExecArgs),

    /// Run a command until a marker file appears.
    RunUntil(RunUntilArgs),

    /// Upload staged binaries to their `/opt/...` location on the target.
    Deploy {
        #[arg(required = true, value_name = "BIN")]
        binaries: Vec<PathBuf>,
    },

    /// Download `.xml` test reports from the target.
    Collect {
        #[arg(long, value_name = "DIR")]
        remote_dir: PathBuf,
        #[arg(long, value_name = "DIR")]
        local_dir: PathBuf,
    },

    /// Fail unless `expected` reports with zero failures are in `dir`.
    Check {
        #[arg(long, value_name = "DIR")]
        dir: PathBuf,
        #[arg(long, value_name = "N")]
        expected: usize,
    },
}

/// Options shared by `exec` and `run-until`.
#[derive(Debug, Clone, Args)]
pub struct CommonRunArgs {
    /// Working directory for the command.
    #[arg(long, value_name = "DIR")]
    pub cwd: Option<PathBuf>,

    /// Extra environment variable, repeatable.
    #[arg(long = "env", value_name = "KEY=VALUE", value_parser = parse_key_val)]
    pub env: Vec<(String, String)>,

    /// Overall budget, e.g. `500ms`, `10s`. Defaults to `[defaults].timeout`.
    #[arg(long, value_name = "DURATION", value_parser = parse_duration)]
    pub timeout: Option<Duration>,

    /// The command and its arguments.
    #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true, value_name = "CMD")]
    pub command: Vec<String>,
}

#[derive(Debug, Clone, Args)]
pub struct ExecArgs {
    #[command(flatten)]
    pub common: CommonRunArgs,
}

#[derive(Debug, Clone, Args)]
pub struct RunUntilArgs {
    /// File whose appearance means the command is deployed.
    #[arg(long, value_name = "PATH")]
    pub marker: PathBuf,

    /// Time between checks. Defaults to `[defaults].poll_interval`.
    #[arg(long, value_name = "DURATION", value_parser = parse_duration)]
    pub poll_interval: Option<Duration>,

    #[command(flatten)]
    pub common: CommonRunArgs,
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

fn parse_key_val(s: &str) -> Result<(String, String), String> {
    let (key, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got '{s}'"))?;
    if key.is_empty() {
        return Err(format!("empty variable name in '{s}'"));
    }
    Ok((key.to_string(), value.to_string()))
}

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}
