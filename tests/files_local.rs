// tests/files_local.rs

mod common;
use crate::common::{TestResult, init_tracing};

use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use tempfile::tempdir;

use targetctl::control::LocalControl;
use targetctl::deploy::{deploy_binaries, download_results};
use targetctl::errors::TargetError;
use targetctl::files::{FileTransfer, LocalFiles};

#[tokio::test]
async fn upload_links_to_the_canonical_source() -> TestResult {
    init_tracing();
    let dir = tempdir()?;
    let source = dir.path().join("build/smoke");
    fs::create_dir_all(source.parent().unwrap())?;
    fs::write(&source, b"#!/bin/sh\n")?;
    let dest = dir.path().join("target/opt/score/smoke");

    LocalFiles::new().upload(&source, &dest).await?;

    assert!(fs::symlink_metadata(&dest)?.file_type().is_symlink());
    assert_eq!(fs::read_link(&dest)?, source.canonicalize()?);
    Ok(())
}

#[tokio::test]
async fn upload_keeps_an_existing_file() -> TestResult {
    init_tracing();
    let dir = tempdir()?;
    let source = dir.path().join("new");
    let dest = dir.path().join("existing");
    fs::write(&source, b"new")?;
    fs::write(&dest, b"old")?;

    LocalFiles::new().upload(&source, &dest).await?;

    assert!(!fs::symlink_metadata(&dest)?.file_type().is_symlink());
    assert_eq!(fs::read(&dest)?, b"old");
    Ok(())
}

#[tokio::test]
async fn walk_lists_nested_files_only() -> TestResult {
    init_tracing();
    let dir = tempdir()?;
    fs::create_dir_all(dir.path().join("a/b"))?;
    fs::write(dir.path().join("top.xml"), b"")?;
    fs::write(dir.path().join("a/b/deep.txt"), b"")?;

    let files = LocalFiles::new().walk_files(dir.path()).await?;

    assert_eq!(
        files,
        vec![dir.path().join("a/b/deep.txt"), dir.path().join("top.xml")]
    );
    Ok(())
}

#[tokio::test]
async fn only_xml_reports_are_downloaded_and_flattened() -> TestResult {
    init_tracing();
    let remote = tempdir()?;
    let local = tempdir()?;
    fs::create_dir_all(remote.path().join("suite"))?;
    fs::write(remote.path().join("smoke.xml"), b"<testsuites failures=\"0\"/>")?;
    fs::write(remote.path().join("suite/unit.xml"), b"<testsuites failures=\"0\"/>")?;
    fs::write(remote.path().join("suite/log.txt"), b"noise")?;

    let mut downloaded = download_results(&LocalFiles::new(), remote.path(), local.path()).await?;
    downloaded.sort();

    assert_eq!(
        downloaded,
        vec![local.path().join("smoke.xml"), local.path().join("unit.xml")]
    );
    assert!(!local.path().join("log.txt").exists());
    Ok(())
}

#[tokio::test]
async fn deploy_rejects_missing_and_unmappable_binaries() -> TestResult {
    init_tracing();
    let dir = tempdir()?;
    let files = LocalFiles::new();
    let control = LocalControl::default();

    let missing = vec![dir.path().join("opt/score/absent")];
    let err = deploy_binaries(&files, &control, &missing, false, Duration::from_secs(1))
        .await
        .unwrap_err();
    assert!(matches!(err, TargetError::TransferError(msg) if msg.contains("is not a file")));

    let unmapped: PathBuf = dir.path().join("plain");
    fs::write(&unmapped, b"")?;
    let err = deploy_binaries(&files, &control, &[unmapped], false, Duration::from_secs(1))
        .await
        .unwrap_err();
    assert!(matches!(err, TargetError::TransferError(msg) if msg.contains("opt")));
    Ok(())
}
