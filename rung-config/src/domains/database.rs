//! Database configuration

use crate::error::ConfigResult;
use crate::validation::{validate_identifier, validate_positive, validate_url, Validatable};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Database URL (e.g., "sqlite://rung.db?mode=rwc")
    #[serde(default = "default_database_url")]
    pub url: String,

    /// Maximum number of database connections in the pool
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// Connection timeout
    #[serde(
        with = "crate::domains::utils::serde_duration",
        default = "default_connection_timeout"
    )]
    pub connection_timeout: Duration,

    /// Table holding the single lock row
    #[serde(default = "default_lock_table")]
    pub lock_table: String,

    /// Table recording applied versions
    #[serde(default = "default_versions_table")]
    pub versions_table: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: default_database_url(),
            max_connections: default_max_connections(),
            connection_timeout: default_connection_timeout(),
            lock_table: default_lock_table(),
            versions_table: default_versions_table(),
        }
    }
}

impl Validatable for DatabaseConfig {
    fn validate(&self) -> ConfigResult<()> {
        validate_url(&self.url, "url", self.domain_name())?;
        validate_positive(self.max_connections, "max_connections", self.domain_name())?;
        validate_positive(
            self.connection_timeout.as_secs(),
            "connection_timeout",
            self.domain_name(),
        )?;
        validate_identifier(&self.lock_table, "lock_table", self.domain_name())?;
        validate_identifier(&self.versions_table, "versions_table", self.domain_name())?;

        if self.lock_table.eq_ignore_ascii_case(&self.versions_table) {
            return Err(self.validation_error("lock_table and versions_table must differ"));
        }

        Ok(())
    }

    fn domain_name(&self) -> &'static str {
        "database"
    }
}

// Default value functions
fn default_database_url() -> String {
    "sqlite://rung.db?mode=rwc".to_string()
}

fn default_max_connections() -> u32 {
    5
}

fn default_connection_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_lock_table() -> String {
    "schema_lock".to_string()
}

fn default_versions_table() -> String {
    "schema_migrations".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_database_config_defaults() {
        let config = DatabaseConfig::default();
        assert_eq!(config.lock_table, "schema_lock");
        assert_eq!(config.versions_table, "schema_migrations");
        assert_eq!(config.connection_timeout, Duration::from_secs(30));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_database_config_validation() {
        let mut config = DatabaseConfig::default();
        config.max_connections = 0;
        assert!(config.validate().is_err());

        let mut config = DatabaseConfig::default();
        config.versions_table = "bad name".to_string();
        assert!(config.validate().is_err());

        let mut config = DatabaseConfig::default();
        config.lock_table = "SCHEMA_MIGRATIONS".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_yaml_uses_defaults() {
        let config: DatabaseConfig = serde_yaml::from_str("url: \"sqlite::memory:\"\n").unwrap();
        assert_eq!(config.url, "sqlite::memory:");
        assert_eq!(config.max_connections, 5);
        assert_eq!(config.lock_table, "schema_lock");
    }
}
