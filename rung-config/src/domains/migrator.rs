//! Migration engine configuration

use crate::error::ConfigResult;
use crate::validation::{validate_required_string, Validatable};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Migrator configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct MigratorConfig {
    /// Leave the version store lock held when a migration fails
    #[serde(default = "crate::domains::utils::default_false")]
    pub hold_lock_on_failure: bool,

    /// Directory containing `<version>_<name>.up.sql` / `.down.sql` files
    #[serde(default = "default_migrations_dir")]
    pub migrations_dir: PathBuf,
}

impl Default for MigratorConfig {
    fn default() -> Self {
        Self {
            hold_lock_on_failure: false,
            migrations_dir: default_migrations_dir(),
        }
    }
}

impl Validatable for MigratorConfig {
    fn validate(&self) -> ConfigResult<()> {
        validate_required_string(
            &self.migrations_dir.to_string_lossy(),
            "migrations_dir",
            self.domain_name(),
        )
    }

    fn domain_name(&self) -> &'static str {
        "migrator"
    }
}

fn default_migrations_dir() -> PathBuf {
    PathBuf::from("migrations")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_migrator_config_defaults() {
        let config = MigratorConfig::default();
        assert!(!config.hold_lock_on_failure);
        assert_eq!(config.migrations_dir, PathBuf::from("migrations"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_empty_migrations_dir_rejected() {
        let config = MigratorConfig {
            migrations_dir: PathBuf::new(),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
