//! Configuration for Rung
//!
//! Configuration is split by domain (database, migrator, logging), loaded
//! from an optional YAML file, overridden from `RUNG_*` environment variables
//! and validated before use.

pub mod domains;
pub mod error;
pub mod loader;
pub mod validation;

// Re-export main types
pub use error::{ConfigError, ConfigResult};
pub use loader::ConfigLoader;
pub use validation::Validatable;

// Re-export domain configurations
pub use domains::{
    database::DatabaseConfig,
    logging::{LogFormat, LogLevel, LoggingConfig},
    migrator::MigratorConfig,
    RungConfig,
};

// Re-export utilities
pub use domains::utils::serde_duration;
