//! Core configuration types and data structures

use std::path::PathBuf;
use std::time::Duration;

use runwarden_process::{ProcessConfig, RunBudget};
use serde::{Deserialize, Serialize};

/// Runner configuration shared by every run
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RunnerConfig {
    /// Longest wait for a single line of output
    pub read_timeout_ms: u64,
    /// Time between SIGTERM and SIGKILL
    pub grace_period_ms: u64,
    /// Optional cap on a whole run
    pub overall_timeout_ms: Option<u64>,
    /// Encoding label of the program's output
    pub encoding: String,
    /// Interleave stderr with stdout
    pub merge_stderr: bool,
    /// Spawn each program as a process group leader
    pub process_group: bool,
    /// Bytes of separate stderr kept for error messages
    pub stderr_capture_bytes: usize,
    /// Longest output line kept whole; longer lines are split
    pub max_line_bytes: usize,
    /// Working directory for spawned programs
    pub working_dir: Option<PathBuf>,
    /// Log filter, e.g. `info` or `runwarden_process=debug`
    pub log_level: String,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            read_timeout_ms: 30_000,
            grace_period_ms: 5_000,
            overall_timeout_ms: None,
            encoding: "utf-8".to_string(),
            merge_stderr: true,
            process_group: true,
            stderr_capture_bytes: 8192,
            max_line_bytes: 1024 * 1024,
            working_dir: None,
            log_level: "info".to_string(),
        }
    }
}

impl RunnerConfig {
    /// Build the process config for one command line
    pub fn process_config<I, S>(&self, argv: I) -> crate::Result<ProcessConfig>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut config = ProcessConfig::from_argv(argv)?
            .read_timeout(Duration::from_millis(self.read_timeout_ms))
            .grace_period(Duration::from_millis(self.grace_period_ms))
            .encoding(self.encoding.clone())
            .merge_stderr(self.merge_stderr)
            .process_group(self.process_group)
            .stderr_capture_bytes(self.stderr_capture_bytes)
            .max_line_bytes(self.max_line_bytes);
        if let Some(dir) = &self.working_dir {
            config = config.working_dir(dir);
        }
        Ok(config)
    }

    /// Overall run budget, if one is configured
    pub fn budget(&self) -> Option<RunBudget> {
        self.overall_timeout_ms.map(RunBudget::from_millis)
    }
}

/// Configuration manager trait
pub trait ConfigManager {
    /// Load configuration
    fn load_config(&mut self) -> Result<RunnerConfig, crate::error::ConfigError>;
    /// Save configuration
    fn save_config(&self, config: &RunnerConfig) -> Result<(), crate::error::ConfigError>;
    /// Validate configuration
    fn validate_config(&self, config: &RunnerConfig) -> Result<(), crate::error::ConfigError>;
}
