// tests/results_check.rs

mod common;
use crate::common::{TestResult, init_tracing};

use std::fs;

use tempfile::tempdir;

use targetctl::errors::TargetError;
use targetctl::results::check_for_failures;

const PASSING: &str = r#"<?xml version="1.0"?><testsuites tests="4" failures="0" errors="0"/>"#;
const FAILING: &str = r#"<?xml version="1.0"?><testsuites tests="4" failures="2" errors="0"/>"#;

#[test]
fn passing_reports_with_matching_count() -> TestResult {
    init_tracing();
    let dir = tempdir()?;
    fs::write(dir.path().join("a.xml"), PASSING)?;
    fs::write(dir.path().join("b.xml"), PASSING)?;
    fs::write(dir.path().join("notes.txt"), "failures=\"9\"")?;

    let summary = check_for_failures(dir.path(), 2)?;
    assert_eq!(summary.checked.len(), 2);
    Ok(())
}

#[test]
fn failing_report_is_named() -> TestResult {
    init_tracing();
    let dir = tempdir()?;
    fs::write(dir.path().join("good.xml"), PASSING)?;
    fs::write(dir.path().join("bad.xml"), FAILING)?;

    let err = check_for_failures(dir.path(), 2).unwrap_err();
    match err {
        TargetError::ResultsError(msg) => {
            assert!(msg.contains("bad.xml"));
            assert!(!msg.contains("good.xml"));
        }
        other => panic!("unexpected error {other:?}"),
    }
    Ok(())
}

#[test]
fn failures_are_reported_before_count_mismatch() -> TestResult {
    init_tracing();
    let dir = tempdir()?;
    fs::write(dir.path().join("bad.xml"), FAILING)?;

    let err = check_for_failures(dir.path(), 3).unwrap_err();
    assert!(matches!(err, TargetError::ResultsError(msg) if msg.contains("failures found")));
    Ok(())
}

#[test]
fn count_mismatch_lists_what_was_found() -> TestResult {
    init_tracing();
    let dir = tempdir()?;
    fs::write(dir.path().join("only.xml"), PASSING)?;

    let err = check_for_failures(dir.path(), 2).unwrap_err();
    match err {
        TargetError::ResultsError(msg) => {
            assert!(msg.contains("expected to find 2"));
            assert!(msg.contains("only.xml"));
        }
        other => panic!("unexpected error {other:?}"),
    }
    Ok(())
}

#[test]
fn report_without_failures_attribute_counts_as_failing() -> TestResult {
    let dir = tempdir()?;
    fs::write(dir.path().join("truncated.xml"), "<testsuites")?;
    assert!(check_for_failures(dir.path(), 1).is_err());
    Ok(())
}
