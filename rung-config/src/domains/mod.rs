//! Domain-specific configuration modules

pub mod database;
pub mod logging;
pub mod migrator;
pub mod utils;

use crate::error::ConfigResult;
use crate::validation::Validatable;
use serde::{Deserialize, Serialize};

/// Main Rung configuration combining all domains
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(default)]
pub struct RungConfig {
    /// Database and version store configuration
    pub database: database::DatabaseConfig,

    /// Migration engine configuration
    pub migrator: migrator::MigratorConfig,

    /// Logging configuration
    pub logging: logging::LoggingConfig,
}

impl RungConfig {
    /// Validate every domain
    pub fn validate_all(&self) -> ConfigResult<()> {
        self.database.validate()?;
        self.migrator.validate()?;
        self.logging.validate()?;
        Ok(())
    }
}
