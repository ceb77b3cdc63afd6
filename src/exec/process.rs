// src/exec/process.rs

//! Child process helpers.
//!
//! On unix every executor child is started as the leader of its own process
//! group, so a terminate request reaches whatever the command itself spawned.

use std::time::Duration;

use tokio::process::{Child, Command};
use tokio::time::timeout;
use tracing::debug;

/// Put the command's child into a fresh process group.
#[cfg(unix)]
pub fn isolate_process_group(cmd: &mut Command) {
    cmd.process_group(0);
}

#[cfg(not(unix))]
pub fn isolate_process_group(_cmd: &mut Command) {}

/// Ask the child to stop, then force it.
///
/// Sends SIGTERM to the child's process group, waits up to `grace` for the
/// child to exit, then kills it. Whatever is left in the group is killed
/// afterwards.
pub async fn terminate_child(child: &mut Child, grace: Duration) -> std::io::Result<()> {
    let pid = child.id();

    if let Some(pid) = pid {
        term_group(pid);
    }

    let result = match timeout(grace, child.wait()).await {
        Ok(status) => {
            let status = status?;
            debug!(?pid, ?status, "child exited after terminate request");
            Ok(())
        }
        Err(_) => {
            debug!(?pid, ?grace, "child ignored terminate request; killing");
            child.kill().await
        }
    };

    if let Some(pid) = pid {
        kill_group(pid);
    }

    result
}

/// Kills the child's process group when dropped.
///
/// `kill_on_drop` only reaches the direct child; this covers the rest of the
/// group when an execution future is dropped mid-flight.
#[derive(Debug)]
pub struct ProcessGroupGuard {
    pid: Option<u32>,
}

impl ProcessGroupGuard {
    pub fn new(pid: Option<u32>) -> Self {
        Self { pid }
    }
}

impl Drop for ProcessGroupGuard {
    fn drop(&mut self) {
        if let Some(pid) = self.pid.take() {
            kill_group(pid);
        }
    }
}

#[cfg(unix)]
fn term_group(pid: u32) {
    signal_group(pid, nix::sys::signal::Signal::SIGTERM);
}

#[cfg(unix)]
fn kill_group(pid: u32) {
    signal_group(pid, nix::sys::signal::Signal::SIGKILL);
}

#[cfg(not(unix))]
fn term_group(_pid: u32) {}

#[cfg(not(unix))]
fn kill_group(_pid: u32) {}

#[cfg(unix)]
fn signal_group(pid: u32, signal: nix::sys::signal::Signal) {
    use nix::sys::signal::killpg;
    use nix::unistd::Pid;

    let Ok(raw) = i32::try_from(pid) else {
        return;
    };
    if let Err(e) = killpg(Pid::from_raw(raw), signal) {
        // ESRCH: the group is already gone.
        debug!(pid, ?signal, error = %e, "signalling process group failed");
    }
}
