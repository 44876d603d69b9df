// src/config/validate.rs

use std::time::Duration;

use crate::config::model::{
    ConfigFile, Defaults, LocalSection, RawConfigFile, RawDefaultsSection, RawTargetSection,
    TargetConfig, TargetKind,
};
use crate::errors::{Result, TargetError};
use crate::types::parse_duration;

impl TryFrom<RawConfigFile> for ConfigFile {
    type Error = crate::errors::TargetError;

    fn try_from(raw: RawConfigFile) -> std::result::Result<Self, Self::Error> {
        let target = validate_target(raw.target)?;
        validate_local(&raw.local)?;
        let defaults = validate_defaults(&raw.defaults)?;
        Ok(ConfigFile::new_unchecked(target, raw.local, raw.remote, defaults))
    }
}

fn validate_target(raw: RawTargetSection) -> Result<TargetConfig> {
    match raw.kind {
        TargetKind::Native => Ok(TargetConfig::Native),
        TargetKind::Ssh => {
            let host = raw
                .host
                .filter(|h| !h.trim().is_empty())
                .ok_or_else(|| {
                    TargetError::ConfigError(
                        "[target].host is required when kind = \"ssh\"".to_string(),
                    )
                })?;
            Ok(TargetConfig::Ssh {
                host,
                user: raw.user,
                port: raw.port,
                options: raw.ssh_options,
            })
        }
        TargetKind::Loopback => {
            let latency = optional_duration("[target].latency", raw.latency.as_deref())?
                .unwrap_or(Duration::ZERO);
            Ok(TargetConfig::Loopback { latency })
        }
    }
}

fn validate_local(local: &LocalSection) -> Result<()> {
    if local.wrapper.iter().any(|part| part.trim().is_empty()) {
        return Err(TargetError::ConfigError(
            "[local].wrapper entries must be non-empty".to_string(),
        ));
    }
    Ok(())
}

fn validate_defaults(raw: &RawDefaultsSection) -> Result<Defaults> {
    let fallback = Defaults::default();
    let defaults = Defaults {
        timeout: optional_duration("[defaults].timeout", raw.timeout.as_deref())?
            .unwrap_or(fallback.timeout),
        poll_interval: optional_duration("[defaults].poll_interval", raw.poll_interval.as_deref())?
            .unwrap_or(fallback.poll_interval),
        reader_join_timeout: optional_duration(
            "[defaults].reader_join_timeout",
            raw.reader_join_timeout.as_deref(),
        )?
        .unwrap_or(fallback.reader_join_timeout),
    };

    if defaults.poll_interval.is_zero() {
        return Err(TargetError::ConfigError(
            "[defaults].poll_interval must be greater than zero".to_string(),
        ));
    }
    Ok(defaults)
}

fn optional_duration(field: &str, value: Option<&str>) -> Result<Option<Duration>> {
    value
        .map(|s| {
            parse_duration(s)
                .map_err(|e| TargetError::ConfigError(format!("invalid {field} '{s}': {e}")))
        })
        .transpose()
}
