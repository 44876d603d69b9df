#![allow(dead_code)]

use std::time::Duration;

pub use targetctl_test_utils::{group_is_gone, init_tracing, scripts, with_timeout};

pub type TestResult = Result<(), Box<dyn std::error::Error>>;

/// Slack allowed on top of a deadline for spawning, signalling and reaping.
pub const OVERHEAD: Duration = Duration::from_millis(1500);
