// src/logging.rs

//! Logging setup for `targetctl`.
//!
//! The filter comes from the `--log-level` flag when given. Otherwise
//! `TARGETCTL_LOG` is read as an `EnvFilter` directive list, so both a bare
//! level (`debug`) and per-module directives (`targetctl::control=trace,warn`)
//! work. Anything unparsable falls back to `info`.
//!
//! Logs go to STDERR; stdout carries only the supervised command's output.

use anyhow::{Result, anyhow};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt;

use crate::cli::LogLevel;

pub const LOG_ENV: &str = "TARGETCTL_LOG";
const DEFAULT_DIRECTIVE: &str = "info";

/// Install the global subscriber. Call once at startup.
pub fn init_logging(cli_level: Option<LogLevel>) -> Result<()> {
    let env = std::env::var(LOG_ENV).ok();
    let filter = build_filter(cli_level, env.as_deref());

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| anyhow!("failed to install tracing subscriber: {e}"))
}

fn build_filter(cli_level: Option<LogLevel>, env: Option<&str>) -> EnvFilter {
    let directive = match (cli_level, env) {
        (Some(lvl), _) => level_directive(lvl).to_string(),
        (None, Some(raw)) => normalize_env(raw),
        (None, None) => DEFAULT_DIRECTIVE.to_string(),
    };
    EnvFilter::try_new(&directive).unwrap_or_else(|_| EnvFilter::new(DEFAULT_DIRECTIVE))
}

fn level_directive(lvl: LogLevel) -> &'static str {
    match lvl {
        LogLevel::Error => "error",
        LogLevel::Warn => "warn",
        LogLevel::Info => "info",
        LogLevel::Debug => "debug",
        LogLevel::Trace => "trace",
    }
}

// A bare word that is not a level would otherwise parse as a target name
// enabling everything under it.
fn normalize_env(raw: &str) -> String {
    let trimmed = raw.trim();
    match trimmed.to_ascii_lowercase().as_str() {
        "" => DEFAULT_DIRECTIVE.to_string(),
        "warning" => "warn".to_string(),
        lvl @ ("error" | "warn" | "info" | "debug" | "trace" | "off") => lvl.to_string(),
        _ if trimmed.contains(['=', ',', ':']) => trimmed.to_string(),
        _ => DEFAULT_DIRECTIVE.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing_subscriber::filter::LevelFilter;

    fn max_level(cli: Option<LogLevel>, env: Option<&str>) -> Option<LevelFilter> {
        build_filter(cli, env).max_level_hint()
    }

    #[test]
    fn cli_flag_wins_over_environment() {
        assert_eq!(max_level(Some(LogLevel::Warn), Some("trace")), Some(LevelFilter::WARN));
    }

    #[test]
    fn env_level_strings_are_case_insensitive() {
        assert_eq!(max_level(None, Some(" DEBUG ")), Some(LevelFilter::DEBUG));
        assert_eq!(max_level(None, Some("warning")), Some(LevelFilter::WARN));
        assert_eq!(max_level(None, Some("verbose")), Some(LevelFilter::INFO));
        assert_eq!(max_level(None, None), Some(LevelFilter::INFO));
    }

    #[test]
    fn env_accepts_per_module_directives() {
        let filter = build_filter(None, Some("targetctl::control=trace,warn"));
        assert_eq!(filter.max_level_hint(), Some(LevelFilter::TRACE));
        assert!(filter.to_string().contains("targetctl::control=trace"));
    }

    #[test]
    fn malformed_directives_fall_back_to_info() {
        assert_eq!(max_level(None, Some("targetctl=loud")), Some(LevelFilter::INFO));
    }
}
