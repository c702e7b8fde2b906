//! Process manager - lifecycle orchestration

use std::io;
use std::process::Stdio;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::Stream;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::{
    child::ManagedChild,
    config::ProcessConfig,
    error::{ProcessError, Result},
    exit::{self, ExitStatus},
    output::{LineReader, OutputSource, StderrTail},
    terminator::Terminator,
};

/// How long a failed run may wait for buffered stderr
pub const STDERR_GRACE: Duration = Duration::from_secs(1);

const IDLE: u32 = 0;
const STARTING: u32 = u32::MAX;

/// Where a run is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessState {
    NotStarted,
    /// Producing lines
    Running,
    /// Output ended; waiting for the exit status
    Completing,
    /// A read deadline expired; terminating
    TimedOut,
    /// Torn down before the output ended (cancellation or a broken pipe)
    Cancelling,
    /// Process reaped, resources released
    Terminated,
}

/// Runs one process at a time and hands out its output as a [`LineStream`]
///
/// The manager stays busy from `run` until the stream reaches a terminal
/// outcome, is closed, or finishes background cleanup after being dropped.
pub struct ProcessManager {
    active: Arc<AtomicU32>,
}

impl ProcessManager {
    /// Create new process manager
    pub fn new() -> Self {
        Self {
            active: Arc::new(AtomicU32::new(IDLE)),
        }
    }

    /// Whether a run currently holds this manager
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire) != IDLE
    }

    /// PID of the live process, if any
    pub fn active_pid(&self) -> Option<u32> {
        match self.active.load(Ordering::Acquire) {
            IDLE | STARTING => None,
            pid => Some(pid),
        }
    }

    /// Start a process and stream its output lines.
    ///
    /// Fails with `Conflict` before touching the OS if another run is live,
    /// with `Cancelled` if `cancel` already fired, and with `StartFailure`
    /// if the process cannot be spawned.
    ///
    /// # Examples
    /// ```no_run
    /// use runwarden_process::{ProcessManager, ProcessConfig};
    /// use tokio_util::sync::CancellationToken;
    ///
    /// # #[tokio::main]
    /// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
    /// let manager = ProcessManager::new();
    /// let config = ProcessConfig::new("printf").args(["hi\n"]);
    /// let mut lines = manager.run(config, CancellationToken::new()).await?;
    /// while let Some(line) = lines.next_line().await? {
    ///     println!("{}", line);
    /// }
    /// # Ok(())
    /// # }
    /// ```
    pub async fn run(&self, config: ProcessConfig, cancel: CancellationToken) -> Result<LineStream> {
        let lease = RunLease::acquire(&self.active)?;
        let encoding = config.validate()?;
        if cancel.is_cancelled() {
            return Err(ProcessError::Cancelled);
        }

        info!(
            command = %config.command,
            args = ?config.args,
            cwd = ?config.working_dir,
            merge_stderr = config.merge_stderr,
            "Starting subprocess"
        );

        let spawned = spawn_child(&config)?;
        let pid = spawned.child.pid();
        lease.bind(pid);
        debug!(pid = %pid, "Subprocess started");

        let stderr = spawned
            .stderr
            .map(|pipe| StderrTail::spawn(pipe, config.stderr_capture_bytes, encoding));

        Ok(LineStream {
            run: Some(ActiveRun {
                child: spawned.child,
                reader: LineReader::new(spawned.output, encoding, config.read_timeout)
                    .max_line_bytes(config.max_line_bytes),
                stderr,
                _lease: lease,
            }),
            cancel,
            terminator: Terminator::new(config.grace_period),
            read_timeout: config.read_timeout,
            state: ProcessState::Running,
            pid,
        })
    }
}

impl Default for ProcessManager {
    fn default() -> Self {
        Self::new()
    }
}

/// Marks the manager busy; released on drop
struct RunLease {
    slot: Arc<AtomicU32>,
}

impl RunLease {
    fn acquire(slot: &Arc<AtomicU32>) -> Result<Self> {
        slot.compare_exchange(IDLE, STARTING, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|current| {
                let pid = (current != STARTING).then_some(current);
                warn!(active_pid = ?pid, "Rejected run: another process is already running");
                ProcessError::Conflict { pid }
            })?;
        Ok(Self {
            slot: Arc::clone(slot),
        })
    }

    fn bind(&self, pid: u32) {
        self.slot.store(pid, Ordering::Release);
    }
}

impl Drop for RunLease {
    fn drop(&mut self) {
        self.slot.store(IDLE, Ordering::Release);
    }
}

struct SpawnedChild {
    child: ManagedChild,
    output: OutputSource,
    stderr: Option<tokio::process::ChildStderr>,
}

fn spawn_child(config: &ProcessConfig) -> Result<SpawnedChild> {
    // Build command
    let mut cmd = Command::new(&config.command);
    cmd.args(&config.args);

    // Set working directory
    if let Some(ref dir) = config.working_dir {
        cmd.current_dir(dir);
    }

    // Set environment variables
    for (key, value) in &config.env {
        cmd.env(key, value);
    }

    cmd.stdin(Stdio::null());
    cmd.kill_on_drop(true);

    #[cfg(unix)]
    {
        if config.process_group {
            cmd.process_group(0);
        }
    }

    let merged = if config.merge_stderr {
        Some(OutputSource::merge_into(&mut cmd)?)
    } else {
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());
        None
    };

    let mut child = cmd.spawn()?;
    // Closes the parent's copies of the merged pipe's write ends.
    drop(cmd);

    let pid = child.id().ok_or_else(|| {
        ProcessError::StartFailure(io::Error::new(
            io::ErrorKind::Other,
            "Failed to get process ID",
        ))
    })?;

    let output = match merged {
        Some(output) => output,
        None => OutputSource::Stdout(child.stdout.take().ok_or_else(|| {
            ProcessError::StartFailure(io::Error::new(
                io::ErrorKind::Other,
                "stdout was not captured",
            ))
        })?),
    };
    let stderr = child.stderr.take();

    Ok(SpawnedChild {
        child: ManagedChild::new(child, pid, cfg!(unix) && config.process_group),
        output,
        stderr,
    })
}

struct ActiveRun {
    child: ManagedChild,
    reader: LineReader<OutputSource>,
    stderr: Option<StderrTail>,
    _lease: RunLease,
}

/// Output lines of one run, consumed once.
///
/// `next_line` yields lines in the order the process wrote them, then
/// `Ok(None)` after a zero exit, or a single error after cleanup. Dropping
/// the stream early terminates the process in a background task.
pub struct LineStream {
    run: Option<ActiveRun>,
    cancel: CancellationToken,
    terminator: Terminator,
    read_timeout: Duration,
    state: ProcessState,
    pid: u32,
}

impl LineStream {
    pub fn pid(&self) -> u32 {
        self.pid
    }

    pub fn state(&self) -> ProcessState {
        self.state
    }

    /// True once the process has been reaped and released
    pub fn is_finished(&self) -> bool {
        self.run.is_none()
    }

    /// Next output line, `Ok(None)` once the process exited cleanly
    pub async fn next_line(&mut self) -> Result<Option<String>> {
        let Some(run) = self.run.as_mut() else {
            return Ok(None);
        };

        let read = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => None,
            line = run.reader.next_line() => Some(line),
        };

        match read {
            Some(Ok(Some(line))) => Ok(Some(line)),
            Some(Ok(None)) => self.complete().await,
            Some(Err(err)) => {
                self.state = match err {
                    ProcessError::ReadTimeout { .. } => ProcessState::TimedOut,
                    _ => ProcessState::Cancelling,
                };
                warn!(pid = %self.pid, error = %err, "Subprocess output failed");
                self.shutdown().await;
                Err(err)
            }
            None => {
                warn!(pid = %self.pid, "Subprocess operation cancelled");
                self.state = ProcessState::Cancelling;
                self.shutdown().await;
                Err(ProcessError::Cancelled)
            }
        }
    }

    /// Read every remaining line
    pub async fn collect_lines(mut self) -> Result<Vec<String>> {
        let mut lines = Vec::new();
        while let Some(line) = self.next_line().await? {
            lines.push(line);
        }
        Ok(lines)
    }

    /// Stop the run now, terminating the process if it is still alive
    pub async fn close(mut self) {
        self.stop().await;
    }

    pub(crate) async fn stop(&mut self) {
        if self.run.is_some() {
            debug!(pid = %self.pid, "Closing line stream early");
            self.state = ProcessState::Cancelling;
            self.shutdown().await;
        }
    }

    /// Adapt into a `futures::Stream`; the stream ends after the first error
    pub fn into_stream(self) -> impl Stream<Item = Result<String>> {
        futures::stream::try_unfold(self, |mut lines| async move {
            let next = lines.next_line().await?;
            Ok::<_, ProcessError>(next.map(|line| (line, lines)))
        })
    }

    /// Output ended: wait for the exit status, bounded by the read deadline
    async fn complete(&mut self) -> Result<Option<String>> {
        self.state = ProcessState::Completing;
        let Some(run) = self.run.as_mut() else {
            return Ok(None);
        };

        let waited = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => None,
            status = tokio::time::timeout(self.read_timeout, run.child.wait()) => Some(status),
        };

        let status = match waited {
            Some(Ok(Ok(status))) => status,
            Some(Ok(Err(e))) => {
                self.state = ProcessState::Cancelling;
                self.shutdown().await;
                return Err(ProcessError::ReadFailed(format!(
                    "failed to wait for process: {}",
                    e
                )));
            }
            Some(Err(_)) => {
                warn!(pid = %self.pid, "Output closed but process kept running");
                self.state = ProcessState::TimedOut;
                self.shutdown().await;
                return Err(ProcessError::ReadTimeout {
                    timeout: self.read_timeout,
                });
            }
            None => {
                warn!(pid = %self.pid, "Subprocess operation cancelled");
                self.state = ProcessState::Cancelling;
                self.shutdown().await;
                return Err(ProcessError::Cancelled);
            }
        };

        debug!(pid = %self.pid, status = %status, "Subprocess completed");
        // Background members that let go of the pipe would outlive the run.
        run.child.sweep_group();

        let stderr = match (&status, run.stderr.take()) {
            (ExitStatus::Code(code), Some(tail)) if *code != 0 => tail.excerpt(STDERR_GRACE).await,
            _ => None,
        };

        self.release();
        exit::classify(&status, stderr).map(|()| None)
    }

    /// Terminate (if needed) and release; never interrupted by cancellation
    async fn shutdown(&mut self) {
        if let Some(run) = self.run.as_mut() {
            info!(pid = %self.pid, "Cleaning up subprocess");
            match self.terminator.terminate(&mut run.child).await {
                Ok(outcome) => debug!(pid = %self.pid, outcome = ?outcome, "Subprocess reaped"),
                Err(e) => error!(pid = %self.pid, error = %e, "Error during cleanup"),
            }
        }
        self.release();
    }

    fn release(&mut self) {
        if self.run.take().is_some() {
            self.state = ProcessState::Terminated;
        }
    }
}

impl Drop for LineStream {
    fn drop(&mut self) {
        let Some(mut run) = self.run.take() else {
            return;
        };
        let pid = self.pid;
        let terminator = self.terminator;

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                debug!(pid = %pid, "Line stream dropped before completion, cleaning up");
                handle.spawn(async move {
                    if let Err(e) = terminator.terminate(&mut run.child).await {
                        error!(pid = %pid, error = %e, "Error during cleanup");
                    }
                    drop(run);
                });
            }
            Err(_) => {
                warn!(pid = %pid, "No runtime for cleanup, killing process");
                run.child.start_kill();
            }
        }
    }
}
