mod cli;
mod commands;

use clap::Parser;
use colored::Colorize;
use rung_config::ConfigError;
use rung_core::{Direction, LoaderError, MigrateFailure};
use rung_logging::init_logging;
use std::process::ExitCode;
use tracing::info;

use cli::{Cli, Commands, ConfigCommands};

/// Exit status for operational failures
const EXIT_FAILURE: u8 = 1;
/// Exit status for usage and configuration errors
const EXIT_USAGE: u8 = 2;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            report_error(&err);
            ExitCode::from(exit_code(&err))
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = commands::load_config(&cli)?;
    init_logging(&config.logging)?;

    info!("Rung {} starting", env!("CARGO_PKG_VERSION"));

    let ctx = commands::shutdown_token();
    match &cli.command {
        Commands::Up { to } => commands::migrate::execute(&config, &ctx, Direction::Run, *to).await,
        Commands::Down { to } => {
            commands::migrate::execute(&config, &ctx, Direction::Revert, *to).await
        }
        Commands::Status => commands::status::execute(&config, &ctx).await,
        Commands::Unlock => commands::unlock::execute(&config, &ctx).await,
        Commands::Config {
            command: ConfigCommands::Show { format },
        } => commands::config::show(&config, *format),
    }
}

fn report_error(err: &anyhow::Error) {
    eprintln!("{} {}", "❌ Error:".red().bold(), err);
    for cause in err.chain().skip(1) {
        eprintln!("  caused by: {}", cause);
    }

    if let Some(hint) = operator_hint(err) {
        eprintln!("{} {}", "hint:".yellow().bold(), hint);
    }
}

/// Next step for the operator when a run leaves the lock in question
fn operator_hint(err: &anyhow::Error) -> Option<&'static str> {
    let failure = err.downcast_ref::<MigrateFailure>()?;
    if failure.lock_held {
        Some(
            "the version store lock is still held; \
             run `rung unlock` once the database has been checked",
        )
    } else if failure.error.is_locked() {
        Some(
            "another run holds the version store lock; \
             if none is running, clear it with `rung unlock`",
        )
    } else {
        None
    }
}

fn exit_code(err: &anyhow::Error) -> u8 {
    if let Some(failure) = err.downcast_ref::<MigrateFailure>() {
        return if failure.error.is_configuration() {
            EXIT_USAGE
        } else {
            EXIT_FAILURE
        };
    }
    if err.downcast_ref::<ConfigError>().is_some() || err.downcast_ref::<LoaderError>().is_some()
    {
        return EXIT_USAGE;
    }
    EXIT_FAILURE
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Context;
    use rung_core::{MigrateError, Report, SourceError, StoreError};

    fn failure(error: MigrateError) -> anyhow::Error {
        failure_with_lock(error, false)
    }

    fn failure_with_lock(error: MigrateError, lock_held: bool) -> anyhow::Error {
        anyhow::Error::new(MigrateFailure {
            report: Report {
                direction: Direction::Run,
                versions: vec![],
            },
            error,
            lock_held,
        })
    }

    #[test]
    fn test_configuration_errors_exit_with_usage() {
        let err = failure(MigrateError::from(SourceError::DuplicateVersion(2)));
        assert_eq!(exit_code(&err), EXIT_USAGE);

        let err = anyhow::Error::new(ConfigError::ValidationError("bad".to_string()))
            .context("Failed to load configuration");
        assert_eq!(exit_code(&err), EXIT_USAGE);

        let err = Err::<(), _>(LoaderError::Cancelled)
            .context("Failed to load migrations")
            .unwrap_err();
        assert_eq!(exit_code(&err), EXIT_USAGE);
    }

    #[test]
    fn test_operational_errors_exit_with_failure() {
        assert_eq!(
            exit_code(&failure(MigrateError::Lock(StoreError::Locked))),
            EXIT_FAILURE
        );
        assert_eq!(exit_code(&anyhow::anyhow!("connection refused")), EXIT_FAILURE);
    }

    #[test]
    fn test_hint_when_release_failed() {
        let error = MigrateError::join_release(
            Some(MigrateError::Cancelled(2)),
            StoreError::Cancelled,
        );
        let hint = operator_hint(&failure_with_lock(error, true)).unwrap();
        assert!(hint.contains("rung unlock"));
        assert!(hint.starts_with("the version store lock is still held"));
    }

    #[test]
    fn test_hint_for_contended_lock() {
        let hint = operator_hint(&failure(MigrateError::Lock(StoreError::Locked))).unwrap();
        assert!(hint.starts_with("another run holds"));
        assert!(operator_hint(&failure(MigrateError::MissingRecorded(3))).is_none());
        assert!(operator_hint(&anyhow::anyhow!("connection refused")).is_none());
    }
}
