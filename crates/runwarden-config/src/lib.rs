//! Runwarden configuration
//!
//! Runner settings are read from an optional TOML file and overridden by
//! `RUNWARDEN_*` environment variables, then turned into the process-level
//! [`runwarden_process::ProcessConfig`] and [`runwarden_process::RunBudget`].

pub mod error;
pub mod manager;
pub mod types;

pub use error::{ConfigError, Result};
pub use manager::ConfigManager;
pub use types::{ConfigManager as ConfigManagerTrait, RunnerConfig};
