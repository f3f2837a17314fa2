//! Cross-platform child termination.
//!
//! All platform branching for kill semantics lives here so the runner and
//! everything above it never test the platform directly. On POSIX we signal
//! the whole process group first (agent CLIs fork helpers that must die
//! with them) and fall back to the direct pid; elsewhere we only have the
//! handle-level kill.

use tokio::process::Child;
use tracing::debug;

/// Strength of a termination request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TermSignal {
    /// Polite request (SIGTERM); the child may clean up.
    Term,
    /// Guaranteed death (SIGKILL); not catchable.
    Kill,
}

#[cfg(unix)]
impl TermSignal {
    fn raw(self) -> i32 {
        match self {
            TermSignal::Term => libc::SIGTERM,
            TermSignal::Kill => libc::SIGKILL,
        }
    }
}

/// Send `signal` to a child we still hold the handle for.
///
/// Prefers the process group; falls back to the direct handle when the
/// group signal fails (the child may have left its group).
pub(crate) fn terminate(child: &mut Child, signal: TermSignal) {
    match child.id() {
        Some(pid) => terminate_pid(pid, signal),
        None => {
            // Already reaped; nothing to signal.
            debug!("terminate called on exited child");
        }
    }

    #[cfg(not(unix))]
    if signal == TermSignal::Kill {
        let _ = child.start_kill();
    }
}

/// Send `signal` to a child known only by pid (e.g. from `disconnect`).
#[cfg(unix)]
pub(crate) fn terminate_pid(pid: u32, signal: TermSignal) {
    let sig = signal.raw();
    if signal_group(pid, sig).is_err() {
        debug!(pid, sig, "process-group signal failed; falling back to pid");
        let _ = signal_pid(pid, sig);
    }
}

#[cfg(not(unix))]
pub(crate) fn terminate_pid(pid: u32, _signal: TermSignal) {
    // Pid-only termination needs POSIX signals; we target macOS/Linux.
    // Elsewhere only the handle-holding paths (timeout kill, kill_on_drop)
    // can stop a child, so make the gap visible instead of failing silently.
    tracing::warn!(pid, "pid-only termination is not supported on this platform");
}

/// Forward a raw host signal (SIGINT/SIGTERM) to the child's group.
#[cfg(unix)]
pub(crate) fn forward_signal(pid: u32, sig: i32) {
    if signal_group(pid, sig).is_err() {
        let _ = signal_pid(pid, sig);
    }
}

/// Whether a process with this pid still exists.
#[cfg(unix)]
pub(crate) fn is_alive(pid: u32) -> bool {
    // SAFETY: signal 0 performs existence/permission checks only.
    unsafe { libc::kill(pid as i32, 0) == 0 }
}

#[cfg(not(unix))]
pub(crate) fn is_alive(_pid: u32) -> bool {
    false
}

#[cfg(unix)]
fn signal_group(pid: u32, sig: i32) -> std::io::Result<()> {
    // SAFETY: a negative pid addresses the process group with that id; the
    // runner spawns children into their own group.
    let ret = unsafe { libc::kill(-(pid as i32), sig) };
    if ret == 0 {
        Ok(())
    } else {
        Err(std::io::Error::last_os_error())
    }
}

#[cfg(unix)]
fn signal_pid(pid: u32, sig: i32) -> std::io::Result<()> {
    // SAFETY: pid came from a child we spawned.
    let ret = unsafe { libc::kill(pid as i32, sig) };
    if ret == 0 {
        Ok(())
    } else {
        Err(std::io::Error::last_os_error())
    }
}
