//! Process configuration

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use encoding_rs::Encoding;

use crate::error::{ProcessError, Result};

/// Default per-read deadline
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(30);

/// Default wait between SIGTERM and SIGKILL
pub const DEFAULT_GRACE_PERIOD: Duration = Duration::from_secs(5);

/// Default cap on retained stderr bytes
pub const DEFAULT_STDERR_CAPTURE_BYTES: usize = 8 * 1024;

/// Default cap on one line; longer lines are split
pub const DEFAULT_MAX_LINE_BYTES: usize = 1024 * 1024;

/// Description of one process to run
///
/// Built once and never mutated by the manager; every run takes its own
/// copy. `command` plus `args` form the argv.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessConfig {
    /// Executable command (argv[0])
    pub command: String,
    /// Command arguments
    pub args: Vec<String>,
    /// Working directory (None = current dir)
    pub working_dir: Option<PathBuf>,
    /// Environment variables (added to parent env)
    pub env: BTreeMap<String, String>,
    /// Route stderr into the same pipe as stdout
    pub merge_stderr: bool,
    /// Encoding label for decoding output, e.g. `utf-8` or `windows-1252`
    pub encoding: String,
    /// Longest wait for a single line of output
    pub read_timeout: Duration,
    /// Wait between the graceful and the forceful termination signal
    pub grace_period: Duration,
    /// Spawn the child as leader of its own process group
    pub process_group: bool,
    /// Stderr tail kept for diagnostics when stderr is not merged
    pub stderr_capture_bytes: usize,
    /// Longest line held in memory; longer output arrives as several lines
    pub max_line_bytes: usize,
}

impl ProcessConfig {
    /// Create new process configuration
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            args: vec![],
            working_dir: None,
            env: BTreeMap::new(),
            merge_stderr: true,
            encoding: "utf-8".to_string(),
            read_timeout: DEFAULT_READ_TIMEOUT,
            grace_period: DEFAULT_GRACE_PERIOD,
            process_group: true,
            stderr_capture_bytes: DEFAULT_STDERR_CAPTURE_BYTES,
            max_line_bytes: DEFAULT_MAX_LINE_BYTES,
        }
    }

    /// Build from a full argv; the first element is the program
    pub fn from_argv<I, S>(argv: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut argv = argv.into_iter().map(Into::into);
        let command = argv
            .next()
            .ok_or_else(|| ProcessError::InvalidConfig("argv must not be empty".to_string()))?;
        Ok(Self::new(command).args(argv))
    }

    /// Set command arguments
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    /// Set working directory
    pub fn working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    /// Add environment variable
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Merge stderr into the line stream (true) or capture it separately
    pub fn merge_stderr(mut self, merge: bool) -> Self {
        self.merge_stderr = merge;
        self
    }

    /// Set output encoding label
    pub fn encoding(mut self, label: impl Into<String>) -> Self {
        self.encoding = label.into();
        self
    }

    /// Set per-read deadline
    pub fn read_timeout(mut self, duration: Duration) -> Self {
        self.read_timeout = duration;
        self
    }

    /// Set per-read deadline in milliseconds
    pub fn read_timeout_ms(self, millis: u64) -> Self {
        self.read_timeout(Duration::from_millis(millis))
    }

    /// Set the grace period before SIGKILL
    pub fn grace_period(mut self, duration: Duration) -> Self {
        self.grace_period = duration;
        self
    }

    /// Enable/disable spawning into a new process group
    pub fn process_group(mut self, enabled: bool) -> Self {
        self.process_group = enabled;
        self
    }

    /// Set the stderr capture cap
    pub fn stderr_capture_bytes(mut self, bytes: usize) -> Self {
        self.stderr_capture_bytes = bytes;
        self
    }

    /// Set the line length cap
    pub fn max_line_bytes(mut self, bytes: usize) -> Self {
        self.max_line_bytes = bytes;
        self
    }

    /// Full argv, program first
    pub fn argv(&self) -> Vec<&str> {
        std::iter::once(self.command.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect()
    }

    /// Check the configuration and resolve the output encoding
    pub fn validate(&self) -> Result<&'static Encoding> {
        if self.command.trim().is_empty() {
            return Err(ProcessError::InvalidConfig(
                "command must not be empty".to_string(),
            ));
        }
        if self.read_timeout.is_zero() {
            return Err(ProcessError::InvalidConfig(
                "read timeout must be greater than 0".to_string(),
            ));
        }
        if self.max_line_bytes == 0 {
            return Err(ProcessError::InvalidConfig(
                "max line bytes must be greater than 0".to_string(),
            ));
        }
        resolve_encoding(&self.encoding)
    }
}

/// Look up an encoding label, accepting only encodings where `\n` is a
/// single `0x0A` byte so that lines can be split before decoding.
pub fn resolve_encoding(label: &str) -> Result<&'static Encoding> {
    let encoding = Encoding::for_label(label.trim().as_bytes()).ok_or_else(|| {
        ProcessError::InvalidConfig(format!("unknown encoding label: {}", label))
    })?;
    if !encoding.is_ascii_compatible() {
        return Err(ProcessError::InvalidConfig(format!(
            "encoding {} is not ASCII-compatible",
            encoding.name()
        )));
    }
    Ok(encoding)
}
