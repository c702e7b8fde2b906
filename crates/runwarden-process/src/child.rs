//! Managed child process wrapper

use std::io;

use tokio::process::Child;
use tracing::{debug, warn};

use crate::exit::ExitStatus;

/// Termination request delivered to a child
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminationSignal {
    /// SIGTERM: ask the process to shut down
    Graceful,
    /// SIGKILL: cannot be caught or ignored
    Forceful,
}

/// Wrapper around tokio::process::Child owned by exactly one run
pub struct ManagedChild {
    /// Underlying tokio child process
    child: Child,
    /// Process ID
    pid: u32,
    /// Child leads its own process group (pgid == pid)
    process_group: bool,
    /// Exit status once reaped
    status: Option<ExitStatus>,
    /// Group already swept after the leader exited
    swept: bool,
}

impl ManagedChild {
    pub(crate) fn new(child: Child, pid: u32, process_group: bool) -> Self {
        Self {
            child,
            pid,
            process_group,
            status: None,
            swept: false,
        }
    }

    /// Get process ID
    pub fn pid(&self) -> u32 {
        self.pid
    }

    /// Exit status if the process has already been reaped
    pub fn status(&self) -> Option<&ExitStatus> {
        self.status.as_ref()
    }

    /// Check for exit without blocking, reaping the child if it is done
    pub fn try_status(&mut self) -> io::Result<Option<ExitStatus>> {
        if let Some(status) = &self.status {
            return Ok(Some(status.clone()));
        }
        let status = self.child.try_wait()?.map(ExitStatus::from);
        if let Some(status) = &status {
            debug!(pid = %self.pid, status = %status, "Process exited");
            self.status = Some(status.clone());
        }
        Ok(status)
    }

    /// Check if process is still running
    pub fn is_running(&mut self) -> bool {
        matches!(self.try_status(), Ok(None))
    }

    /// Wait for process to exit. Cancel safe; the status is cached.
    pub async fn wait(&mut self) -> io::Result<ExitStatus> {
        if let Some(status) = &self.status {
            return Ok(status.clone());
        }
        let status = ExitStatus::from(self.child.wait().await?);
        debug!(pid = %self.pid, status = %status, "Process exited");
        self.status = Some(status.clone());
        Ok(status)
    }

    /// Deliver a termination signal.
    ///
    /// A reaped child is never signalled again: its pid may already belong to
    /// another process.
    pub fn signal(&mut self, signal: TerminationSignal) -> io::Result<()> {
        if self.status.is_some() {
            return Ok(());
        }
        debug!(pid = %self.pid, signal = ?signal, group = self.process_group, "Signalling process");

        #[cfg(unix)]
        {
            use nix::errno::Errno;
            use nix::sys::signal::{kill, killpg, Signal};
            use nix::unistd::Pid;

            let sig = match signal {
                TerminationSignal::Graceful => Signal::SIGTERM,
                TerminationSignal::Forceful => Signal::SIGKILL,
            };
            let pid = Pid::from_raw(self.pid as i32);
            let sent = if self.process_group {
                killpg(pid, sig)
            } else {
                kill(pid, sig)
            };
            match sent {
                Ok(()) | Err(Errno::ESRCH) => Ok(()),
                Err(e) => {
                    warn!(pid = %self.pid, error = %e, "Failed to signal process");
                    Err(e.into())
                }
            }
        }

        #[cfg(not(unix))]
        {
            // No graceful request exists here; both steps are a hard kill.
            let _ = signal;
            match self.child.start_kill() {
                Err(e) if e.kind() != io::ErrorKind::InvalidInput => Err(e),
                _ => Ok(()),
            }
        }
    }

    /// SIGKILL whatever is left of the process group once the leader is gone.
    ///
    /// Runs at most once; the group id stays reserved while members remain,
    /// so it cannot hit an unrelated process.
    pub fn sweep_group(&mut self) {
        if !self.process_group || self.swept || self.status.is_none() {
            return;
        }
        self.swept = true;

        #[cfg(unix)]
        {
            use nix::errno::Errno;
            use nix::sys::signal::{killpg, Signal};
            use nix::unistd::Pid;

            match killpg(Pid::from_raw(self.pid as i32), Signal::SIGKILL) {
                Ok(()) => debug!(pid = %self.pid, "Killed leftover process group members"),
                Err(Errno::ESRCH) => {}
                Err(e) => warn!(pid = %self.pid, error = %e, "Failed to sweep process group"),
            }
        }
    }

    /// Fire-and-forget SIGKILL for contexts that cannot await.
    ///
    /// Reaches the whole group when there is one; the child itself is left
    /// for tokio's orphan reaper.
    pub(crate) fn start_kill(&mut self) {
        if self.status.is_some() {
            return;
        }
        if self.process_group {
            if let Err(e) = self.signal(TerminationSignal::Forceful) {
                warn!(pid = %self.pid, error = %e, "Failed to kill process group");
            }
            return;
        }
        if let Err(e) = self.child.start_kill() {
            warn!(pid = %self.pid, error = %e, "Failed to kill process");
        }
    }
}
