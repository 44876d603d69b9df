// src/results.rs

//! Checking downloaded JUnit-style XML reports.
//!
//! Only the first `failures="N"` attribute of each file is read; the
//! reports are not otherwise parsed.

use std::path::{Path, PathBuf};

use regex::Regex;
use tracing::{debug, warn};

use crate::errors::{Result, TargetError};

const FAILURES_ATTR: &str = r#"failures="(\d+)""#;

/// Failure count of one report, or `None` if it carries no attribute.
fn failure_count(re: &Regex, xml: &str) -> Option<u64> {
    re.captures(xml)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

/// Summary of a successful check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResultsSummary {
    pub checked: Vec<PathBuf>,
}

/// Check the `.xml` files directly in `dir`.
///
/// Errors if any report has a non-zero (or missing) failure count, or if the
/// number of reports differs from `expected_count`. Failing files are
/// reported before a count mismatch.
pub fn check_for_failures(dir: &Path, expected_count: usize) -> Result<ResultsSummary> {
    let re = Regex::new(FAILURES_ATTR)
        .map_err(|e| TargetError::ResultsError(format!("invalid failures pattern: {e}")))?;
    let mut checked = Vec::new();
    let mut failing = Vec::new();

    let mut entries: Vec<PathBuf> = std::fs::read_dir(dir)?
        .map(|entry| entry.map(|e| e.path()))
        .collect::<std::io::Result<_>>()?;
    entries.sort();

    for path in entries {
        if path.extension().is_none_or(|ext| ext != "xml") || !path.is_file() {
            continue;
        }
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let xml = std::fs::read_to_string(&path)?;

        match failure_count(&re, &xml) {
            Some(0) => debug!(file = %name, "no failures"),
            Some(n) => {
                warn!(file = %name, failures = n, "test report has failures");
                failing.push(name);
            }
            None => {
                warn!(file = %name, "test report has no failures attribute");
                failing.push(name);
            }
        }
        checked.push(path);
    }

    if !failing.is_empty() {
        return Err(TargetError::ResultsError(format!(
            "failures found in the following files:\n {}",
            failing.join("\n")
        )));
    }

    if checked.len() != expected_count {
        let names: Vec<String> = checked
            .iter()
            .filter_map(|p| p.file_name())
            .map(|n| n.to_string_lossy().into_owned())
            .collect();
        return Err(TargetError::ResultsError(format!(
            "expected to find {expected_count} xml files in {}, instead found {}:\n{}",
            dir.display(),
            checked.len(),
            names.join("\n")
        )));
    }

    Ok(ResultsSummary { checked })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_failures_attribute_is_used() {
        let re = Regex::new(FAILURES_ATTR).unwrap();
        let xml = r#"<testsuites tests="3" failures="0"><testsuite failures="2"/></testsuites>"#;
        assert_eq!(failure_count(&re, xml), Some(0));
        assert_eq!(failure_count(&re, r#"<testsuites failures="12">"#), Some(12));
        assert_eq!(failure_count(&re, "<testsuites/>"), None);
    }
}
