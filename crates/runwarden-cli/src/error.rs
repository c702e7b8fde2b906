// CLI errors and exit codes

use runwarden_config::ConfigError;
use runwarden_process::{BudgetError, ErrorKind, ProcessError};
use thiserror::Error;

/// Exit code for a read timeout or an exhausted run budget
pub const EXIT_TIMEOUT: i32 = 124;
/// Exit code when the program could not be started
pub const EXIT_START_FAILURE: i32 = 127;
/// Exit code after an interrupt
pub const EXIT_CANCELLED: i32 = 130;

/// CLI-specific errors
#[derive(Error, Debug)]
pub enum CliError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Process(#[from] ProcessError),

    #[error("{0}")]
    Budget(BudgetError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<BudgetError> for CliError {
    fn from(err: BudgetError) -> Self {
        match err {
            BudgetError::Process(err) => CliError::Process(err),
            other => CliError::Budget(other),
        }
    }
}

impl CliError {
    /// Process exit code for this failure
    pub fn exit_code(&self) -> i32 {
        match self {
            CliError::Process(err) => process_exit_code(err),
            CliError::Budget(_) => EXIT_TIMEOUT,
            CliError::Config(_) | CliError::Io(_) => 1,
        }
    }

    /// Get a user-friendly error message with suggestions
    pub fn user_message(&self) -> String {
        match self {
            CliError::Config(e) => format!(
                "Configuration error: {}\n\nRun 'runwarden config show' to check your configuration.",
                e
            ),
            CliError::Process(ProcessError::StartFailure(e)) => {
                format!("Failed to start process: {}\n\nCheck the program name and PATH.", e)
            }
            other => other.to_string(),
        }
    }
}

fn process_exit_code(err: &ProcessError) -> i32 {
    match err.kind() {
        ErrorKind::NonZeroExit => err.return_code().unwrap_or(1),
        ErrorKind::SignalTerminated => err.signal_number().map_or(1, |n| 128 + n),
        ErrorKind::ReadTimeout => EXIT_TIMEOUT,
        ErrorKind::OperationCancelled => EXIT_CANCELLED,
        ErrorKind::StartFailure => EXIT_START_FAILURE,
        ErrorKind::Conflict | ErrorKind::InvalidConfig | ErrorKind::ReadFailed => 1,
    }
}

pub type CliResult<T> = Result<T, CliError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_exit_codes() {
        let nonzero = CliError::Process(ProcessError::NonZeroExit {
            code: 3,
            stderr: None,
        });
        assert_eq!(nonzero.exit_code(), 3);

        let signal = CliError::Process(ProcessError::SignalTerminated {
            signal: "SIGKILL".to_string(),
            number: 9,
        });
        assert_eq!(signal.exit_code(), 137);

        let timeout = CliError::Process(ProcessError::ReadTimeout {
            timeout: Duration::from_millis(10),
        });
        assert_eq!(timeout.exit_code(), EXIT_TIMEOUT);

        assert_eq!(CliError::Process(ProcessError::Cancelled).exit_code(), 130);

        let start = CliError::Process(ProcessError::StartFailure(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            "missing",
        )));
        assert_eq!(start.exit_code(), 127);

        let config = CliError::Config(ConfigError::Validation("bad".to_string()));
        assert_eq!(config.exit_code(), 1);
    }

    #[test]
    fn test_budget_errors_unwrap_process_errors() {
        let exceeded: CliError = BudgetError::Exceeded {
            budget: Duration::from_secs(1),
        }
        .into();
        assert_eq!(exceeded.exit_code(), EXIT_TIMEOUT);

        let inner: CliError = BudgetError::Process(ProcessError::Cancelled).into();
        assert!(matches!(inner, CliError::Process(ProcessError::Cancelled)));
    }
}
