//! Escalating termination: SIGTERM, bounded grace period, then SIGKILL

use std::io;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::child::{ManagedChild, TerminationSignal};
use crate::exit::ExitStatus;

/// How a terminated process came to an end
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Termination {
    /// Had already exited; nothing was signalled
    AlreadyExited(ExitStatus),
    /// Exited within the grace period after SIGTERM
    Graceful(ExitStatus),
    /// Needed SIGKILL
    Forced(ExitStatus),
}

impl Termination {
    pub fn status(&self) -> &ExitStatus {
        match self {
            Termination::AlreadyExited(status)
            | Termination::Graceful(status)
            | Termination::Forced(status) => status,
        }
    }

    pub fn was_forced(&self) -> bool {
        matches!(self, Termination::Forced(_))
    }
}

/// Termination policy for one run
#[derive(Debug, Clone, Copy)]
pub struct Terminator {
    grace_period: Duration,
}

impl Terminator {
    pub fn new(grace_period: Duration) -> Self {
        Self { grace_period }
    }

    pub fn grace_period(&self) -> Duration {
        self.grace_period
    }

    /// Bring the child down and reap it.
    ///
    /// Safe to call repeatedly: an already reaped child yields
    /// `AlreadyExited` without any signal. The wait after SIGKILL has no
    /// timeout.
    pub async fn terminate(&self, child: &mut ManagedChild) -> io::Result<Termination> {
        let pid = child.pid();

        if let Some(status) = child.try_status()? {
            debug!(pid = %pid, status = %status, "Process already terminated");
            child.sweep_group();
            return Ok(Termination::AlreadyExited(status));
        }

        child.signal(TerminationSignal::Graceful)?;

        let outcome = match tokio::time::timeout(self.grace_period, child.wait()).await {
            Ok(status) => {
                let status = status?;
                info!(pid = %pid, status = %status, "Subprocess terminated gracefully");
                Termination::Graceful(status)
            }
            Err(_) => {
                warn!(
                    pid = %pid,
                    grace_ms = %self.grace_period.as_millis(),
                    "Graceful termination failed, killing process"
                );
                child.signal(TerminationSignal::Forceful)?;
                let status = child.wait().await?;
                info!(pid = %pid, status = %status, "Subprocess killed");
                Termination::Forced(status)
            }
        };

        child.sweep_group();
        Ok(outcome)
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::process::Stdio;
    use std::time::Instant;
    use tokio::io::{AsyncBufReadExt, BufReader};
    use tokio::process::Command;

    async fn spawn_shell(script: &str) -> ManagedChild {
        let mut cmd = Command::new("sh");
        cmd.args(["-c", script])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .process_group(0)
            .kill_on_drop(true);
        let mut child = cmd.spawn().unwrap();
        let pid = child.id().unwrap();

        // Wait for the script to announce itself so traps are installed.
        let stdout = child.stdout.take().unwrap();
        let mut lines = BufReader::new(stdout).lines();
        assert_eq!(lines.next_line().await.unwrap().as_deref(), Some("ready"));
        tokio::spawn(async move { while let Ok(Some(_)) = lines.next_line().await {} });

        ManagedChild::new(child, pid, true)
    }

    #[tokio::test]
    async fn test_graceful_exit() {
        let mut child = spawn_shell("echo ready; exec sleep 30").await;
        let terminator = Terminator::new(Duration::from_secs(5));

        let outcome = terminator.terminate(&mut child).await.unwrap();
        assert!(matches!(outcome, Termination::Graceful(_)));
        assert_eq!(outcome.status().signal(), Some(15));
    }

    #[tokio::test]
    async fn test_escalates_when_sigterm_is_ignored() {
        let mut child = spawn_shell("trap '' TERM; echo ready; sleep 30").await;
        let grace = Duration::from_millis(200);
        let terminator = Terminator::new(grace);

        let started = Instant::now();
        let outcome = terminator.terminate(&mut child).await.unwrap();
        let elapsed = started.elapsed();

        assert!(outcome.was_forced());
        assert_eq!(outcome.status().signal(), Some(9));
        assert!(elapsed >= grace);
        assert!(elapsed < grace + Duration::from_secs(3));
    }

    #[tokio::test]
    async fn test_terminate_is_idempotent() {
        let mut child = spawn_shell("echo ready; exec sleep 30").await;
        let terminator = Terminator::new(Duration::from_secs(5));

        let first = terminator.terminate(&mut child).await.unwrap();
        let second = terminator.terminate(&mut child).await.unwrap();

        assert!(matches!(first, Termination::Graceful(_)));
        assert_eq!(second, Termination::AlreadyExited(first.status().clone()));
    }
}
