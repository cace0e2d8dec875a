//! CLI argument parsing definitions

use clap::{Parser, Subcommand, ValueEnum};
use rung_core::{Version, REVERT_TARGET_INITIAL, RUN_TARGET_LATEST};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about = "Apply and revert versioned SQL migrations", long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(long, value_name = "PATH", global = true)]
    pub config: Option<PathBuf>,

    /// Database URL (overrides configuration)
    #[arg(long, value_name = "URL", global = true)]
    pub database_url: Option<String>,

    /// Directory containing migration files (overrides configuration)
    #[arg(long, value_name = "PATH", global = true)]
    pub dir: Option<PathBuf>,

    /// Set the log level (trace, debug, info, warn, error)
    #[arg(long, value_name = "LEVEL", global = true)]
    pub log_level: Option<String>,

    /// Leave the version store locked when a migration fails
    #[arg(long, global = true)]
    pub hold_lock_on_failure: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Apply pending migrations
    Up {
        /// Apply migrations up to and including this version (-1 for all)
        #[arg(long, value_name = "VERSION", default_value_t = RUN_TARGET_LATEST, allow_negative_numbers = true)]
        to: Version,
    },

    /// Revert applied migrations
    Down {
        /// Revert migrations above this version (0 for all)
        #[arg(long, value_name = "VERSION", default_value_t = REVERT_TARGET_INITIAL)]
        to: Version,
    },

    /// Show the current version, pending migrations and lock state
    Status,

    /// Release a version store lock left behind by a failed run
    Unlock,

    /// Configuration commands
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommands {
    /// Show the effective configuration
    Show {
        /// Output format
        #[arg(long, value_enum, default_value_t = OutputFormat::Yaml)]
        format: OutputFormat,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum OutputFormat {
    Yaml,
    Json,
}
