//! Command implementations

pub mod config;
pub mod migrate;
pub mod status;
pub mod unlock;

use anyhow::{Context, Result};
use rung_config::{ConfigError, ConfigLoader, LogLevel, RungConfig};
use rung_core::Migrator;
use rung_logging::tracing_sinks;
use rung_storage::{connect, SqlDirLoader, SqliteVersionStore};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::cli::Cli;

/// Load configuration and apply command line overrides
pub fn load_config(cli: &Cli) -> Result<RungConfig> {
    let mut config = ConfigLoader::new()
        .load(cli.config.as_ref())
        .context("Failed to load configuration")?;

    if let Some(url) = &cli.database_url {
        config.database.url = url.clone();
    }
    if let Some(dir) = &cli.dir {
        config.migrator.migrations_dir = dir.clone();
    }
    if let Some(level) = &cli.log_level {
        config.logging.level = level
            .parse::<LogLevel>()
            .map_err(|e| ConfigError::ValidationError(format!("--log-level: {}", e)))?;
    }
    if cli.hold_lock_on_failure {
        config.migrator.hold_lock_on_failure = true;
    }

    config
        .validate_all()
        .context("Invalid command line overrides")?;
    Ok(config)
}

/// Connect to the configured database
pub async fn open_store(config: &RungConfig) -> Result<SqliteVersionStore> {
    let conn = connect(&config.database)
        .await
        .with_context(|| format!("Failed to connect to {}", config.database.url))?;
    Ok(SqliteVersionStore::from_config(conn, &config.database))
}

/// Build a migrator over the configured store and migrations directory
pub async fn build_migrator(
    config: &RungConfig,
    ctx: &CancellationToken,
) -> Result<Migrator<SqliteVersionStore>> {
    let store = open_store(config).await?;
    let loader = SqlDirLoader::new(&config.migrator.migrations_dir);
    let (log, debug_sink) = tracing_sinks();

    let migrator = Migrator::from_loader(store, &loader, ctx)
        .await
        .with_context(|| {
            format!(
                "Failed to load migrations from {}",
                config.migrator.migrations_dir.display()
            )
        })?
        .with_log_sink(log)
        .with_debug_sink(debug_sink)
        .hold_lock_on_failure(config.migrator.hold_lock_on_failure);

    debug!("Loaded {} migrations", migrator.sources().len());
    Ok(migrator)
}

/// Cancellation token cancelled on Ctrl-C
pub fn shutdown_token() -> CancellationToken {
    let token = CancellationToken::new();
    let cancel = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupt received, cancelling");
            cancel.cancel();
        }
    });
    token
}
