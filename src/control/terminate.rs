// src/control/terminate.rs

//! Escalating termination of a local process group.
//!
//! `RUNNING -> GRACEFUL_SIGNAL_SENT -> (EXITED | FORCE_KILLED) -> REAPED`
//!
//! The whole group is signalled, not only the direct child, so descendants
//! started by the supervised binary go down with it. "Gone" means the leader
//! has been reaped and no process is left in the group.

use std::fmt;
use std::process::ExitStatus;
use std::time::Duration;

use nix::errno::Errno;
use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;
use tokio::process::Child;
use tokio::time::{Instant, sleep, timeout};
use tracing::{debug, info, warn};

/// Interval between liveness checks while waiting for a graceful exit.
pub const TERMINATION_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Upper bound on reaping the leader after the forced kill.
pub const REAP_TIMEOUT: Duration = Duration::from_secs(2);

/// Grace used when the requested one does not fit on the clock, e.g. a
/// caller passing `Duration::MAX` as "no timeout".
pub const MAX_GRACE: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminationState {
    Running,
    GracefulSignalSent,
    Exited,
    ForceKilled,
    Reaped,
}

impl fmt::Display for TerminationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TerminationState::Running => "running",
            TerminationState::GracefulSignalSent => "graceful-signal-sent",
            TerminationState::Exited => "exited",
            TerminationState::ForceKilled => "force-killed",
            TerminationState::Reaped => "reaped",
        };
        f.write_str(s)
    }
}

/// What the termination sequence achieved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TerminationReport {
    /// Last state reached. `Reaped` when termination was confirmed.
    pub state: TerminationState,
    /// Whether SIGKILL had to be sent.
    pub forced: bool,
    /// Leader status, if it was collected.
    pub status: Option<ExitStatus>,
}

impl TerminationReport {
    pub fn confirmed(&self) -> bool {
        self.state == TerminationState::Reaped
    }
}

/// Liveness of the supervised group.
///
/// Reaps the leader as a side effect when it has exited.
fn group_alive(child: &mut Child, pgid: Option<Pid>) -> bool {
    let leader_alive = match child.try_wait() {
        Ok(Some(_)) => false,
        Ok(None) => true,
        Err(e) => {
            debug!(error = %e, "try_wait failed; treating leader as alive");
            true
        }
    };
    if leader_alive {
        return true;
    }

    match pgid {
        // signal 0 only checks whether any member can be addressed
        Some(pgid) => !matches!(signal::killpg(pgid, None), Err(Errno::ESRCH)),
        None => false,
    }
}

fn signal_group(child: &mut Child, pgid: Option<Pid>, sig: Signal) {
    if let Some(pgid) = pgid {
        match signal::killpg(pgid, sig) {
            Ok(()) => return,
            Err(Errno::ESRCH) => {
                debug!(pgid = pgid.as_raw(), signal = %sig, "process group already gone");
                return;
            }
            Err(e) => {
                warn!(
                    pgid = pgid.as_raw(),
                    signal = %sig,
                    error = %e,
                    "killpg failed; signalling leader only"
                );
            }
        }
    }

    if sig == Signal::SIGKILL {
        if let Err(e) = child.start_kill() {
            debug!(error = %e, "start_kill failed");
        }
    } else if let Some(pid) = child.id() {
        if let Err(e) = signal::kill(Pid::from_raw(pid as i32), sig) {
            debug!(pid, signal = %sig, error = %e, "kill failed");
        }
    }
}

/// Stop the process group rooted at `child`, escalating from SIGTERM to
/// SIGKILL after `grace`.
///
/// Always returns; if the forced kill cannot be confirmed within
/// [`REAP_TIMEOUT`] the report says so instead of blocking.
pub async fn terminate_group(
    child: &mut Child,
    pgid: Option<Pid>,
    grace: Duration,
) -> TerminationReport {
    let mut state = TerminationState::Running;
    let pgid_raw = pgid.map(Pid::as_raw);

    if !group_alive(child, pgid) {
        return TerminationReport {
            state: TerminationState::Reaped,
            forced: false,
            status: child.try_wait().ok().flatten(),
        };
    }

    signal_group(child, pgid, Signal::SIGTERM);
    state = advance(state, TerminationState::GracefulSignalSent, pgid_raw);

    let now = Instant::now();
    let deadline = now.checked_add(grace).unwrap_or(now + MAX_GRACE);
    loop {
        if !group_alive(child, pgid) {
            state = advance(state, TerminationState::Exited, pgid_raw);
            break;
        }
        if Instant::now() >= deadline {
            break;
        }
        sleep(TERMINATION_POLL_INTERVAL).await;
    }

    let mut forced = false;
    if state != TerminationState::Exited {
        warn!(
            pgid = ?pgid_raw,
            grace_ms = grace.as_millis() as u64,
            "group survived SIGTERM; sending SIGKILL"
        );
        signal_group(child, pgid, Signal::SIGKILL);
        forced = true;
        state = advance(state, TerminationState::ForceKilled, pgid_raw);
    }

    let status = match timeout(REAP_TIMEOUT, child.wait()).await {
        Ok(Ok(status)) => Some(status),
        Ok(Err(e)) => {
            warn!(pgid = ?pgid_raw, error = %e, "failed to reap process");
            None
        }
        Err(_) => {
            warn!(pgid = ?pgid_raw, "process not reaped in time; termination unconfirmed");
            None
        }
    };

    if status.is_some() && forced {
        // SIGKILL is not instantaneous for the rest of the group
        let settle = Instant::now() + REAP_TIMEOUT;
        while group_alive(child, pgid) && Instant::now() < settle {
            sleep(TERMINATION_POLL_INTERVAL).await;
        }
    }

    if status.is_some() && !group_alive(child, pgid) {
        state = advance(state, TerminationState::Reaped, pgid_raw);
    } else {
        warn!(pgid = ?pgid_raw, state = %state, "could not confirm that the process group is gone");
    }

    info!(pgid = ?pgid_raw, forced, state = %state, "process group terminated");
    TerminationReport { state, forced, status }
}

fn advance(from: TerminationState, to: TerminationState, pgid: Option<i32>) -> TerminationState {
    debug!(pgid = ?pgid, from = %from, to = %to, "termination state change");
    to
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::process::Stdio;
    use tokio::process::Command;

    fn spawn_group(script: &str) -> (Child, Pid) {
        let child = Command::new("sh")
            .arg("-c")
            .arg(script)
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .process_group(0)
            .kill_on_drop(true)
            .spawn()
            .expect("spawn sh");
        let pgid = Pid::from_raw(child.id().expect("pid") as i32);
        (child, pgid)
    }

    #[tokio::test]
    async fn sigterm_is_enough_for_cooperative_group() {
        let (mut child, pgid) = spawn_group("sleep 30 & sleep 30; wait");
        let report = terminate_group(&mut child, Some(pgid), Duration::from_secs(2)).await;

        assert!(report.confirmed());
        assert!(!report.forced);
        assert_eq!(signal::killpg(pgid, None), Err(Errno::ESRCH));
    }

    #[tokio::test]
    async fn escalates_to_sigkill_when_sigterm_is_ignored() {
        let (mut child, pgid) =
            spawn_group("trap '' TERM; sleep 30 & trap '' TERM; sleep 30; wait");
        // give the shell time to install the trap
        sleep(Duration::from_millis(100)).await;

        let report = terminate_group(&mut child, Some(pgid), Duration::from_millis(200)).await;

        assert!(report.forced);
        assert!(report.confirmed());
        assert_eq!(signal::killpg(pgid, None), Err(Errno::ESRCH));
    }

    #[tokio::test]
    async fn unbounded_grace_does_not_overflow() {
        let (mut child, pgid) = spawn_group("sleep 30");
        let report = terminate_group(&mut child, Some(pgid), Duration::MAX).await;

        assert!(report.confirmed());
        assert!(!report.forced);
    }

    #[tokio::test]
    async fn already_exited_process_is_reported_reaped() {
        let (mut child, pgid) = spawn_group("exit 3");
        child.wait().await.unwrap();

        let report = terminate_group(&mut child, Some(pgid), Duration::from_secs(1)).await;
        assert_eq!(report.state, TerminationState::Reaped);
        assert!(!report.forced);
        assert_eq!(report.status.and_then(|s| s.code()), Some(3));
    }
}
