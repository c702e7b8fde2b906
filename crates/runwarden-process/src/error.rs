//! Error types for process management

use std::io;
use std::time::Duration;
use thiserror::Error;

/// Coarse category of a [`ProcessError`]
///
/// The first five kinds are the outcomes a run can end with; the rest are
/// usage or I/O failures around it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    StartFailure,
    ReadTimeout,
    NonZeroExit,
    SignalTerminated,
    OperationCancelled,
    Conflict,
    InvalidConfig,
    ReadFailed,
}

/// Process management errors
#[derive(Debug, Error)]
pub enum ProcessError {
    /// Failed to spawn process
    #[error("Failed to start process: {0}")]
    StartFailure(#[from] io::Error),

    /// No output arrived within the per-read deadline
    #[error("Stream read timeout after {}ms", .timeout.as_millis())]
    ReadTimeout { timeout: Duration },

    /// Process exited with a nonzero code
    #[error("Process exited with code {code}{}", stderr_suffix(.stderr))]
    NonZeroExit {
        code: i32,
        stderr: Option<String>,
    },

    /// Process was killed by a signal it did not handle
    #[error("Process killed by signal {signal}")]
    SignalTerminated { signal: String, number: i32 },

    /// The caller cancelled the run
    #[error("Operation cancelled")]
    Cancelled,

    /// Another run is still active on this manager
    #[error("Another process is already running{}", pid_suffix(.pid))]
    Conflict { pid: Option<u32> },

    /// Invalid configuration
    #[error("Invalid process configuration: {0}")]
    InvalidConfig(String),

    /// Reading the output pipe failed
    #[error("Failed to read process output: {0}")]
    ReadFailed(String),
}

fn stderr_suffix(stderr: &Option<String>) -> String {
    match stderr {
        Some(text) if !text.is_empty() => format!("\nError output: {}", text),
        _ => String::new(),
    }
}

fn pid_suffix(pid: &Option<u32>) -> String {
    pid.map(|pid| format!(" (PID: {})", pid)).unwrap_or_default()
}

impl ProcessError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ProcessError::StartFailure(_) => ErrorKind::StartFailure,
            ProcessError::ReadTimeout { .. } => ErrorKind::ReadTimeout,
            ProcessError::NonZeroExit { .. } => ErrorKind::NonZeroExit,
            ProcessError::SignalTerminated { .. } => ErrorKind::SignalTerminated,
            ProcessError::Cancelled => ErrorKind::OperationCancelled,
            ProcessError::Conflict { .. } => ErrorKind::Conflict,
            ProcessError::InvalidConfig(_) => ErrorKind::InvalidConfig,
            ProcessError::ReadFailed(_) => ErrorKind::ReadFailed,
        }
    }

    /// Exit code carried by the error, if the process ended with one
    pub fn return_code(&self) -> Option<i32> {
        match self {
            ProcessError::NonZeroExit { code, .. } => Some(*code),
            _ => None,
        }
    }

    /// Number of the signal that killed the process
    pub fn signal_number(&self) -> Option<i32> {
        match self {
            ProcessError::SignalTerminated { number, .. } => Some(*number),
            _ => None,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, ProcessError::Cancelled)
    }
}

/// Result type for process operations
pub type Result<T> = std::result::Result<T, ProcessError>;
