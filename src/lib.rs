// src/lib.rs

pub mod cli;
pub mod config;
pub mod control;
pub mod deploy;
pub mod errors;
pub mod files;
pub mod logging;
pub mod results;
pub mod session;
pub mod target;
pub mod types;

use std::io::Write;

use anyhow::{Context, Result};
use tracing::{info, warn};

use crate::cli::{CliArgs, Command, CommonRunArgs};
use crate::config::{ConfigFile, TargetConfig, TargetKind};
use crate::control::{CancelHandle, CancelToken, ControlInterface, cancel_pair};
use crate::target::Target;
use crate::types::{CommandLine, CommandSpec, ExecResult};

pub use crate::control::Control;
pub use crate::types::{FILE_FOUND_CODE, Outcome, TIMEOUT_CODE};

/// High-level entry point used by `main.rs`.
///
/// Loads the config, applies CLI overrides, opens the target, runs the
/// subcommand and closes the target again. Returns the process exit code.
pub async fn run(args: CliArgs) -> Result<i32> {
    // checking local reports needs no target
    if let Command::Check { dir, expected } = &args.command {
        return check(dir, *expected);
    }

    let cfg = load_config(&args)?;
    let target = Target::open(&cfg).await?;

    let (handle, token) = cancel_pair();
    spawn_ctrl_c_listener(handle);

    let outcome = run_on_target(&args.command, &cfg, &target, token).await;
    if let Err(e) = target.close().await {
        warn!(error = %e, "failed to close target session");
    }
    outcome
}

fn load_config(args: &CliArgs) -> Result<ConfigFile> {
    let mut cfg = match &args.config {
        Some(path) => config::load_and_validate(path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => config::load_or_default(config::default_config_path())?,
    };
    apply_overrides(&mut cfg, args)?;
    Ok(cfg)
}

/// Let `--target`, `--host`, `--user` and `--port` win over the file.
fn apply_overrides(cfg: &mut ConfigFile, args: &CliArgs) -> Result<()> {
    let kind = args.target.unwrap_or_else(|| cfg.target.kind());
    cfg.target = match kind {
        TargetKind::Native => TargetConfig::Native,
        TargetKind::Loopback => match &cfg.target {
            TargetConfig::Loopback { latency } => TargetConfig::Loopback { latency: *latency },
            _ => TargetConfig::Loopback {
                latency: std::time::Duration::ZERO,
            },
        },
        TargetKind::Ssh => {
            let (host, user, port, options) = match &cfg.target {
                TargetConfig::Ssh {
                    host,
                    user,
                    port,
                    options,
                } => (Some(host.clone()), user.clone(), *port, options.clone()),
                _ => (None, None, None, Vec::new()),
            };
            let host = args.host.clone().or(host).filter(|h| !h.trim().is_empty());
            let host = host.ok_or_else(|| {
                errors::TargetError::ConfigError(
                    "an ssh target needs a host (--host or [target].host)".to_string(),
                )
            })?;
            TargetConfig::Ssh {
                host,
                user: args.user.clone().or(user),
                port: args.port.or(port),
                options,
            }
        }
    };
    Ok(())
}

fn spawn_ctrl_c_listener(handle: CancelHandle) {
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to listen for Ctrl+C");
            return;
        }
        info!("Ctrl+C received; stopping supervised command");
        handle.cancel();
    });
}

async fn run_on_target(
    command: &Command,
    cfg: &ConfigFile,
    target: &Target,
    token: CancelToken,
) -> Result<i32> {
    match command {
        Command::Exec(exec) => {
            let spec = build_spec(&exec.common, cfg, token);
            let res = target.control().exec_command_blocking(&spec).await;
            report(&res)
        }
        Command::RunUntil(run) => {
            let spec = build_spec(&run.common, cfg, token)
                .poll_interval(run.poll_interval.unwrap_or(cfg.defaults.poll_interval));
            let res = target
                .control()
                .run_until_file_deployed(&spec, &run.marker)
                .await;
            report(&res)
        }
        Command::Deploy { binaries } => {
            let deployed = deploy::deploy_binaries(
                target.files(),
                target.control(),
                binaries,
                target.has_own_filesystem(),
                cfg.defaults.timeout,
            )
            .await?;
            for path in deployed {
                println!("{}", path.display());
            }
            Ok(0)
        }
        Command::Collect {
            remote_dir,
            local_dir,
        } => {
            let downloaded =
                deploy::download_results(target.files(), remote_dir, local_dir).await?;
            for path in downloaded {
                println!("{}", path.display());
            }
            Ok(0)
        }
        Command::Check { dir, expected } => check(dir, *expected),
    }
}

fn check(dir: &std::path::Path, expected: usize) -> Result<i32> {
    let summary = results::check_for_failures(dir, expected)?;
    info!(checked = summary.checked.len(), "all test reports passed");
    Ok(0)
}

fn build_spec(args: &CommonRunArgs, cfg: &ConfigFile, token: CancelToken) -> CommandSpec {
    let mut spec = CommandSpec::new(CommandLine::Argv(args.command.clone()))
        .envs(args.env.iter().cloned())
        .timeout(args.timeout.unwrap_or(cfg.defaults.timeout))
        .poll_interval(cfg.defaults.poll_interval)
        .cancel_token(token);
    if let Some(cwd) = &args.cwd {
        spec = spec.cwd(cwd);
    }
    spec
}

/// Echo captured output and map the result to an exit code.
fn report(res: &ExecResult) -> Result<i32> {
    let mut stdout = std::io::stdout().lock();
    stdout.write_all(res.stdout.as_bytes())?;
    stdout.flush()?;
    let mut stderr = std::io::stderr().lock();
    stderr.write_all(res.stderr.as_bytes())?;
    stderr.flush()?;

    info!(
        outcome = %res.outcome,
        exit_code = res.exit_code,
        elapsed_ms = res.elapsed.as_millis() as u64,
        "done"
    );
    Ok(res.process_exit_code())
}
