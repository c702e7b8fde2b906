//! Configuration manager implementation

use std::path::{Path, PathBuf};

use config::{Config, Environment, File, FileFormat};
use runwarden_process::config::resolve_encoding;
use tracing::debug;

use crate::{
    error::{ConfigError, Result},
    types::{ConfigManager as ConfigManagerTrait, RunnerConfig},
};

/// Prefix of environment overrides, e.g. `RUNWARDEN_READ_TIMEOUT_MS`
pub const ENV_PREFIX: &str = "RUNWARDEN";

/// Configuration manager
pub struct ConfigManager {
    /// Configuration file path
    config_path: PathBuf,
    /// The file must exist
    required: bool,
    /// Environment prefix
    env_prefix: String,
}

impl ConfigManager {
    /// Create a new configuration manager
    pub fn new() -> Self {
        Self {
            config_path: Self::default_config_path(),
            required: false,
            env_prefix: ENV_PREFIX.to_string(),
        }
    }

    /// Create with an explicit config file, which must exist
    pub fn with_path(path: PathBuf) -> Self {
        Self {
            config_path: path,
            required: true,
            env_prefix: ENV_PREFIX.to_string(),
        }
    }

    /// Use a different environment prefix
    pub fn with_env_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.env_prefix = prefix.into();
        self
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    /// Get default config path
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("runwarden")
            .join("config.toml")
    }
}

impl ConfigManagerTrait for ConfigManager {
    fn load_config(&mut self) -> Result<RunnerConfig> {
        if self.required && !self.config_path.exists() {
            return Err(ConfigError::NotFound(
                self.config_path.display().to_string(),
            ));
        }
        debug!(path = %self.config_path.display(), prefix = %self.env_prefix, "Loading configuration");

        let builder = Config::builder()
            .add_source(
                File::from(self.config_path.clone())
                    .format(FileFormat::Toml)
                    .required(false),
            )
            .add_source(Environment::with_prefix(&self.env_prefix).try_parsing(true));

        let config = builder.build()?;
        let runner_config: RunnerConfig = config.try_deserialize()?;
        self.validate_config(&runner_config)?;
        Ok(runner_config)
    }

    fn save_config(&self, config: &RunnerConfig) -> Result<()> {
        self.validate_config(config)?;
        let toml = toml::to_string(config)?;
        if let Some(parent) = self.config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&self.config_path, toml)?;
        debug!(path = %self.config_path.display(), "Saved configuration");
        Ok(())
    }

    fn validate_config(&self, config: &RunnerConfig) -> Result<()> {
        if config.read_timeout_ms == 0 {
            return Err(ConfigError::Validation(
                "read_timeout_ms must be greater than 0".to_string(),
            ));
        }
        if config.grace_period_ms == 0 {
            return Err(ConfigError::Validation(
                "grace_period_ms must be greater than 0".to_string(),
            ));
        }
        if config.overall_timeout_ms == Some(0) {
            return Err(ConfigError::Validation(
                "overall_timeout_ms must be greater than 0".to_string(),
            ));
        }
        if config.stderr_capture_bytes == 0 {
            return Err(ConfigError::Validation(
                "stderr_capture_bytes must be greater than 0".to_string(),
            ));
        }
        if config.max_line_bytes == 0 {
            return Err(ConfigError::Validation(
                "max_line_bytes must be greater than 0".to_string(),
            ));
        }
        if config.log_level.trim().is_empty() {
            return Err(ConfigError::Validation(
                "log_level must not be empty".to_string(),
            ));
        }
        resolve_encoding(&config.encoding)
            .map_err(|e| ConfigError::Validation(e.to_string()))?;
        Ok(())
    }
}

impl Default for ConfigManager {
    fn default() -> Self {
        Self::new()
    }
}
