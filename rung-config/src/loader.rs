//! Configuration loading and environment variable handling

use crate::domains::RungConfig;
use crate::error::{ConfigError, ConfigResult};
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Configuration loader with environment variable support
pub struct ConfigLoader {
    /// Environment variable prefix
    prefix: String,
}

impl ConfigLoader {
    /// Create a new config loader with the `RUNG` prefix
    pub fn new() -> Self {
        Self {
            prefix: "RUNG".to_string(),
        }
    }

    /// Create a new config loader with custom prefix
    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    /// Load configuration from a YAML file with environment overrides
    pub fn from_file(&self, path: impl AsRef<Path>) -> ConfigResult<RungConfig> {
        let path = path.as_ref();
        log::debug!("Loading configuration from {}", path.display());

        let content = std::fs::read_to_string(path)?;
        let mut config: RungConfig = if content.trim().is_empty() {
            RungConfig::default()
        } else {
            serde_yaml::from_str(&content)?
        };

        self.apply_env_overrides(&mut config)?;
        config.validate_all()?;

        Ok(config)
    }

    /// Load configuration from environment variables only
    pub fn from_env(&self) -> ConfigResult<RungConfig> {
        let mut config = RungConfig::default();
        self.apply_env_overrides(&mut config)?;
        config.validate_all()?;
        Ok(config)
    }

    /// Load from a file when one is given, otherwise from the environment
    pub fn load(&self, config_path: Option<impl AsRef<Path>>) -> ConfigResult<RungConfig> {
        match config_path {
            Some(path) => self.from_file(path),
            None => self.from_env(),
        }
    }

    /// Apply environment variable overrides to configuration
    fn apply_env_overrides(&self, config: &mut RungConfig) -> ConfigResult<()> {
        self.apply_database_overrides(&mut config.database)?;
        self.apply_migrator_overrides(&mut config.migrator)?;
        self.apply_logging_overrides(&mut config.logging)?;
        Ok(())
    }

    fn apply_database_overrides(
        &self,
        config: &mut crate::domains::database::DatabaseConfig,
    ) -> ConfigResult<()> {
        if let Ok(url) = self.get_env_var("DATABASE_URL") {
            config.url = url;
        }

        if let Ok(max) = self.get_env_var("DATABASE_MAX_CONNECTIONS") {
            config.max_connections = self.parse_env("DATABASE_MAX_CONNECTIONS", &max)?;
        }

        Ok(())
    }

    fn apply_migrator_overrides(
        &self,
        config: &mut crate::domains::migrator::MigratorConfig,
    ) -> ConfigResult<()> {
        if let Ok(hold) = self.get_env_var("HOLD_LOCK_ON_FAILURE") {
            config.hold_lock_on_failure = self.parse_env("HOLD_LOCK_ON_FAILURE", &hold)?;
        }

        if let Ok(dir) = self.get_env_var("MIGRATIONS_DIR") {
            config.migrations_dir = PathBuf::from(dir);
        }

        Ok(())
    }

    fn apply_logging_overrides(
        &self,
        config: &mut crate::domains::logging::LoggingConfig,
    ) -> ConfigResult<()> {
        if let Ok(log_level) = self.get_env_var("LOG_LEVEL") {
            config.level = self.parse_env("LOG_LEVEL", &log_level)?;
        }

        if let Ok(format) = self.get_env_var("LOG_FORMAT") {
            config.format = self.parse_env("LOG_FORMAT", &format)?;
        }

        Ok(())
    }

    fn parse_env<T>(&self, name: &str, value: &str) -> ConfigResult<T>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        value.parse().map_err(|e| {
            ConfigError::EnvError(format!("Invalid {}_{}: {}", self.prefix, name, e))
        })
    }

    /// Get environment variable with prefix
    fn get_env_var(&self, name: &str) -> Result<String, std::env::VarError> {
        std::env::var(format!("{}_{}", self.prefix, name))
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}
