// tests/config_loading.rs

mod common;
use crate::common::{TestResult, init_tracing};

use std::collections::BTreeMap;
use std::fs;
use std::time::Duration;

use tempfile::tempdir;

use targetctl::config::{ConfigFile, TargetConfig, load_and_validate, load_or_default};
use targetctl::errors::TargetError;

#[test]
fn full_config_round_trips_into_typed_sections() -> TestResult {
    init_tracing();
    let dir = tempdir()?;
    let path = dir.path().join("Targetctl.toml");
    fs::write(
        &path,
        r#"
[target]
kind = "ssh"
host = "192.168.100.10"
user = "root"
port = 2222
ssh_options = ["StrictHostKeyChecking=no", "UserKnownHostsFile=/dev/null"]

[local]
wrapper = ["/usr/bin/fakeroot"]

[remote]
default_env = { PATH = "/proc/boot:/bin", LD_LIBRARY_PATH = "/opt/score/lib" }

[defaults]
timeout = "10s"
poll_interval = "100ms"
reader_join_timeout = "1s"
"#,
    )?;

    let cfg = load_and_validate(&path)?;
    assert_eq!(
        cfg.target,
        TargetConfig::Ssh {
            host: "192.168.100.10".into(),
            user: Some("root".into()),
            port: Some(2222),
            options: vec![
                "StrictHostKeyChecking=no".into(),
                "UserKnownHostsFile=/dev/null".into()
            ],
        }
    );
    assert_eq!(cfg.local.wrapper, vec!["/usr/bin/fakeroot"]);

    let mut env = BTreeMap::new();
    env.insert("LD_LIBRARY_PATH".to_string(), "/opt/score/lib".to_string());
    env.insert("PATH".to_string(), "/proc/boot:/bin".to_string());
    assert_eq!(cfg.remote.default_env, env);

    assert_eq!(cfg.defaults.timeout, Duration::from_secs(10));
    assert_eq!(cfg.defaults.poll_interval, Duration::from_millis(100));
    assert_eq!(cfg.defaults.reader_join_timeout, Duration::from_secs(1));
    Ok(())
}

#[test]
fn missing_default_file_falls_back_to_native() -> TestResult {
    let dir = tempdir()?;
    let cfg = load_or_default(dir.path().join("Targetctl.toml"))?;
    assert_eq!(cfg, ConfigFile::default());
    Ok(())
}

#[test]
fn explicitly_named_missing_file_is_an_io_error() -> TestResult {
    let dir = tempdir()?;
    let err = load_and_validate(dir.path().join("absent.toml")).unwrap_err();
    assert!(matches!(err, TargetError::IoError(_)));
    Ok(())
}

#[test]
fn unknown_section_is_rejected() -> TestResult {
    let dir = tempdir()?;
    let path = dir.path().join("Targetctl.toml");
    fs::write(&path, "[qemu]\nimage = \"x.img\"\n")?;
    let err = load_and_validate(&path).unwrap_err();
    assert!(matches!(err, TargetError::TomlError(_)));
    Ok(())
}
