//! Runwarden CLI
//!
//! Thin entry point over `runwarden-process`: loads configuration, turns
//! SIGINT/SIGTERM into cancellation and maps run outcomes to exit codes.

pub mod cli;
pub mod error;
pub mod logging;
pub mod runner;
pub mod signals;

pub use cli::{Cli, Commands, ConfigAction, RunArgs};
pub use error::{CliError, CliResult};
