pub mod recording_session;
pub mod scripts;

use std::sync::Once;

use nix::errno::Errno;
use nix::sys::signal::killpg;
use nix::unistd::Pid;
use tracing_subscriber::{EnvFilter, fmt};

pub use recording_session::RecordingSession;

static INIT: Once = Once::new();

/// Initialise tracing for tests.
///
/// - Uses `with_test_writer()`, so logs are captured per-test.
/// - The Rust test harness only prints captured output for **failing** tests
///   (unless you run with `-- --nocapture`).
///
/// Enable levels with e.g.:
/// `RUST_LOG=debug cargo test`
pub fn init_tracing() {
    INIT.call_once(|| {
        let filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

        fmt()
            .with_env_filter(filter)
            .with_test_writer() // print only for failing tests unless --nocapture
            .with_target(true)
            .init();
    });
}

/// Run a future with a 10-second timeout.
pub async fn with_timeout<F, T>(f: F) -> T
where
    F: std::future::Future<Output = T>,
{
    tokio::time::timeout(std::time::Duration::from_secs(10), f)
        .await
        .expect("Test timed out after 10 seconds")
}

/// True when no process is left in the group led by `pid`.
pub fn group_is_gone(pid: u32) -> bool {
    matches!(killpg(Pid::from_raw(pid as i32), None), Err(Errno::ESRCH))
}
