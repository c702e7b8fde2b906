// Command-line definition

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use runwarden_config::RunnerConfig;

/// Runwarden - run a program, stream its output, never leave it behind
#[derive(Parser, Debug)]
#[command(name = "runwarden")]
#[command(bin_name = "runwarden")]
#[command(about = "Run a program with read deadlines, cancellation and guaranteed cleanup")]
#[command(version)]
#[command(author = "Runwarden Contributors")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Only log errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Configuration file (default: <config dir>/runwarden/config.toml)
    #[arg(long = "config", global = true, value_name = "PATH")]
    pub config_file: Option<PathBuf>,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Run a program and print its output line by line
    #[command(about = "Run a program and print its output line by line")]
    Run(RunArgs),

    /// Inspect configuration
    #[command(subcommand)]
    Config(ConfigAction),
}

#[derive(Subcommand, Debug, Clone)]
pub enum ConfigAction {
    /// Print the effective configuration as TOML
    Show,
}

#[derive(Args, Debug, Clone, Default)]
pub struct RunArgs {
    /// Longest wait for a single line of output, in milliseconds
    #[arg(long, value_name = "MS")]
    pub read_timeout_ms: Option<u64>,

    /// Wait between SIGTERM and SIGKILL, in milliseconds
    #[arg(long, value_name = "MS")]
    pub grace_period_ms: Option<u64>,

    /// Cap on the whole run, in milliseconds
    #[arg(long, value_name = "MS")]
    pub overall_timeout_ms: Option<u64>,

    /// Working directory for the program
    #[arg(long, value_name = "DIR")]
    pub cwd: Option<PathBuf>,

    /// Encoding of the program's output
    #[arg(long, value_name = "LABEL")]
    pub encoding: Option<String>,

    /// Keep stderr separate; it is shown only when the program fails
    #[arg(long)]
    pub separate_stderr: bool,

    /// Do not put the program in its own process group
    #[arg(long)]
    pub no_process_group: bool,

    /// Program and its arguments
    #[arg(required = true, last = true, value_name = "PROGRAM")]
    pub argv: Vec<String>,
}

impl RunArgs {
    /// Layer command-line overrides over the loaded configuration
    pub fn apply(&self, config: &mut RunnerConfig) {
        if let Some(ms) = self.read_timeout_ms {
            config.read_timeout_ms = ms;
        }
        if let Some(ms) = self.grace_period_ms {
            config.grace_period_ms = ms;
        }
        if let Some(ms) = self.overall_timeout_ms {
            config.overall_timeout_ms = Some(ms);
        }
        if let Some(dir) = &self.cwd {
            config.working_dir = Some(dir.clone());
        }
        if let Some(label) = &self.encoding {
            config.encoding = label.clone();
        }
        if self.separate_stderr {
            config.merge_stderr = false;
        }
        if self.no_process_group {
            config.process_group = false;
        }
    }
}
