//! Exit status decoding and classification

use std::fmt;

use crate::error::{ProcessError, Result};

/// How a process ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExitStatus {
    /// Ordinary exit with a code
    Code(i32),
    /// Terminated by a signal
    KilledBySignal { number: i32, name: String },
}

impl ExitStatus {
    /// Decode a raw return code.
    ///
    /// Negative codes are the convention for "killed by signal -code" used by
    /// runtimes that fold both outcomes into one integer.
    pub fn from_raw_code(code: i32) -> Self {
        match code.checked_neg() {
            Some(signal) if code < 0 => Self::from_signal(signal),
            _ => ExitStatus::Code(code),
        }
    }

    pub fn from_signal(number: i32) -> Self {
        ExitStatus::KilledBySignal {
            number,
            name: signal_name(number),
        }
    }

    pub fn success(&self) -> bool {
        matches!(self, ExitStatus::Code(0))
    }

    pub fn code(&self) -> Option<i32> {
        match self {
            ExitStatus::Code(code) => Some(*code),
            ExitStatus::KilledBySignal { .. } => None,
        }
    }

    pub fn signal(&self) -> Option<i32> {
        match self {
            ExitStatus::Code(_) => None,
            ExitStatus::KilledBySignal { number, .. } => Some(*number),
        }
    }
}

impl From<std::process::ExitStatus> for ExitStatus {
    fn from(status: std::process::ExitStatus) -> Self {
        #[cfg(unix)]
        {
            use std::os::unix::process::ExitStatusExt;
            if let Some(sig) = status.signal() {
                return ExitStatus::from_signal(sig);
            }
        }
        #[cfg(unix)]
        {
            status
                .code()
                .map_or(ExitStatus::Code(1), ExitStatus::from_raw_code)
        }

        // Negative codes are plain (NTSTATUS-style) exit codes here.
        #[cfg(not(unix))]
        {
            ExitStatus::Code(status.code().unwrap_or(1))
        }
    }
}

impl fmt::Display for ExitStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExitStatus::Code(code) => write!(f, "exit code {}", code),
            ExitStatus::KilledBySignal { number, name } => {
                write!(f, "signal {} ({})", number, name)
            }
        }
    }
}

/// Human-readable name for a signal number, `SIG<n>` when unknown
pub fn signal_name(number: i32) -> String {
    #[cfg(unix)]
    {
        if let Ok(signal) = nix::sys::signal::Signal::try_from(number) {
            return signal.as_str().to_string();
        }
    }
    format!("SIG{}", number)
}

/// Turn an exit status into the run's outcome.
///
/// `stderr` is whatever diagnostic text could be collected in time; it only
/// enriches `NonZeroExit`.
pub fn classify(status: &ExitStatus, stderr: Option<String>) -> Result<()> {
    match status {
        ExitStatus::Code(0) => Ok(()),
        ExitStatus::Code(code) => Err(ProcessError::NonZeroExit {
            code: *code,
            stderr: stderr.filter(|text| !text.is_empty()),
        }),
        ExitStatus::KilledBySignal { number, name } => Err(ProcessError::SignalTerminated {
            signal: name.clone(),
            number: *number,
        }),
    }
}
