// Logging setup

use anyhow::anyhow;
use tracing_subscriber::EnvFilter;

/// Filter directive for the given flags; `None` defers to `RUST_LOG` or config
pub fn flag_level(verbose: bool, quiet: bool) -> Option<&'static str> {
    if quiet {
        Some("error")
    } else if verbose {
        Some("debug")
    } else {
        None
    }
}

/// Build the log filter: flags win over `RUST_LOG`, which wins over config
pub fn build_filter(verbose: bool, quiet: bool, configured: &str) -> anyhow::Result<EnvFilter> {
    if let Some(level) = flag_level(verbose, quiet) {
        return Ok(EnvFilter::new(level));
    }
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return Ok(filter);
    }
    EnvFilter::try_new(configured).map_err(|e| anyhow!("invalid log_level '{}': {}", configured, e))
}

/// Initialize logging to stderr; stdout carries the program's output
pub fn init_logging(verbose: bool, quiet: bool, configured: &str) -> anyhow::Result<()> {
    let filter = build_filter(verbose, quiet, configured)?;
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init()
        .map_err(|e| anyhow!("failed to initialize logging: {}", e))
}
