//! Shell snippets that behave like a binary announcing its deployment.

use std::path::Path;
use std::time::Duration;

use targetctl::types::CommandLine;

fn seconds(d: Duration) -> String {
    format!("{:.3}", d.as_secs_f64())
}

fn quoted(path: &Path) -> String {
    format!("'{}'", path.display())
}

/// Creates `marker` after `delay`, then keeps running for `linger`.
pub fn touch_then_sleep(marker: &Path, delay: Duration, linger: Duration) -> CommandLine {
    CommandLine::Argv(vec![
        "sh".into(),
        "-c".into(),
        format!(
            "sleep {}; touch {}; sleep {}",
            seconds(delay),
            quoted(marker),
            seconds(linger)
        ),
    ])
}

/// Same as [`touch_then_sleep`], as one line for a shell channel.
pub fn touch_then_sleep_line(marker: &Path, delay: Duration, linger: Duration) -> CommandLine {
    CommandLine::Shell(format!(
        "sleep {}; touch {}; sleep {}",
        seconds(delay),
        quoted(marker),
        seconds(linger)
    ))
}

/// A wrapper (`LocalOptions::wrapper`) that touches `marker` after `delay`
/// in the background and then `exec`s the wrapped command.
pub fn marker_wrapper(marker: &Path, delay: Duration) -> Vec<String> {
    vec![
        "sh".into(),
        "-c".into(),
        format!(
            "(sleep {}; touch {}) & exec \"$@\"",
            seconds(delay),
            quoted(marker)
        ),
        "marker-wrapper".into(),
    ]
}

