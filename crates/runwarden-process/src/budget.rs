//! Overall run budget layered over the per-read deadline

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::config::ProcessConfig;
use crate::error::ProcessError;
use crate::manager::{LineStream, ProcessManager, ProcessState};

/// Failure of a budgeted run
#[derive(Debug, Error)]
pub enum BudgetError {
    /// The whole run took longer than its budget
    #[error("Run exceeded overall budget of {}ms", .budget.as_millis())]
    Exceeded { budget: Duration },

    #[error(transparent)]
    Process(#[from] ProcessError),
}

impl BudgetError {
    pub fn is_exceeded(&self) -> bool {
        matches!(self, BudgetError::Exceeded { .. })
    }

    /// The underlying process error, if that is what ended the run
    pub fn process_error(&self) -> Option<&ProcessError> {
        match self {
            BudgetError::Process(err) => Some(err),
            BudgetError::Exceeded { .. } => None,
        }
    }
}

/// Caps the wall-clock time of a whole run.
///
/// When the budget runs out the run is cancelled through a child of the
/// caller's token, so termination follows the normal escalation path.
#[derive(Debug, Clone, Copy)]
pub struct RunBudget {
    limit: Duration,
}

impl RunBudget {
    pub fn new(limit: Duration) -> Self {
        Self { limit }
    }

    pub fn from_millis(millis: u64) -> Self {
        Self::new(Duration::from_millis(millis))
    }

    pub fn limit(&self) -> Duration {
        self.limit
    }

    pub async fn run(
        &self,
        manager: &ProcessManager,
        config: ProcessConfig,
        cancel: CancellationToken,
    ) -> Result<BudgetedLineStream, BudgetError> {
        let token = cancel.child_token();
        let lines = manager.run(config, token.clone()).await?;

        let expired = Arc::new(AtomicBool::new(false));
        let timer = {
            let expired = Arc::clone(&expired);
            let limit = self.limit;
            let pid = lines.pid();
            tokio::spawn(async move {
                tokio::time::sleep(limit).await;
                warn!(pid = %pid, budget_ms = %limit.as_millis(), "Run budget exhausted");
                expired.store(true, Ordering::Release);
                token.cancel();
            })
        };

        Ok(BudgetedLineStream {
            lines,
            expired,
            timer,
            limit: self.limit,
        })
    }
}

/// A [`LineStream`] that also ends when its budget runs out
pub struct BudgetedLineStream {
    lines: LineStream,
    expired: Arc<AtomicBool>,
    timer: JoinHandle<()>,
    limit: Duration,
}

impl BudgetedLineStream {
    pub fn pid(&self) -> u32 {
        self.lines.pid()
    }

    pub fn state(&self) -> ProcessState {
        self.lines.state()
    }

    pub async fn next_line(&mut self) -> Result<Option<String>, BudgetError> {
        match self.lines.next_line().await {
            Err(ProcessError::Cancelled) if self.expired.load(Ordering::Acquire) => {
                Err(BudgetError::Exceeded { budget: self.limit })
            }
            other => other.map_err(BudgetError::from),
        }
    }

    pub async fn collect_lines(mut self) -> Result<Vec<String>, BudgetError> {
        let mut lines = Vec::new();
        while let Some(line) = self.next_line().await? {
            lines.push(line);
        }
        Ok(lines)
    }

    pub async fn close(mut self) {
        self.timer.abort();
        self.lines.stop().await;
    }
}

impl Drop for BudgetedLineStream {
    fn drop(&mut self) {
        self.timer.abort();
    }
}
