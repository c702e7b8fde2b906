//! # runwarden-process
//!
//! **Purpose**: Run one external program at a time and stream its output
//! line by line.
//!
//! ## Features
//!
//! - **Line Streaming**: Decoded lines in the order the program wrote them
//! - **Read Deadlines**: Every read waits at most `read_timeout`
//! - **Cancellation**: A caller-owned `CancellationToken` stops the run
//! - **Escalating Termination**: SIGTERM, a grace period, then SIGKILL of the
//!   whole process group
//! - **Classified Failures**: Non-zero exits carry their stderr tail, signal
//!   deaths carry the signal name
//! - **Run Budgets**: Optional cap on the wall-clock time of a whole run
//!
//! ## Usage
//!
//! ```rust,no_run
//! use runwarden_process::{ProcessConfig, ProcessManager};
//! use tokio_util::sync::CancellationToken;
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let manager = ProcessManager::new();
//!
//! let config = ProcessConfig::new("cargo")
//!     .args(["build", "--message-format=short"])
//!     .read_timeout_ms(60_000);
//!
//! let mut lines = manager.run(config, CancellationToken::new()).await?;
//! while let Some(line) = lines.next_line().await? {
//!     println!("{}", line);
//! }
//! # Ok(())
//! # }
//! ```

pub mod budget;
pub mod child;
pub mod config;
pub mod error;
pub mod exit;
pub mod manager;
pub mod output;
pub mod terminator;

pub use budget::{BudgetError, BudgetedLineStream, RunBudget};
pub use child::{ManagedChild, TerminationSignal};
pub use config::ProcessConfig;
pub use error::{ErrorKind, ProcessError, Result};
pub use exit::ExitStatus;
pub use manager::{LineStream, ProcessManager, ProcessState};
pub use terminator::{Termination, Terminator};
