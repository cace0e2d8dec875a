//! `up` and `down`

use anyhow::Result;
use colored::Colorize;
use rung_config::RungConfig;
use rung_core::{Direction, Report, Version};
use tokio_util::sync::CancellationToken;

use super::build_migrator;

pub async fn execute(
    config: &RungConfig,
    ctx: &CancellationToken,
    direction: Direction,
    target: Version,
) -> Result<()> {
    let migrator = build_migrator(config, ctx).await?;

    let report = match direction {
        Direction::Run => migrator.run(ctx, target).await?,
        Direction::Revert => migrator.revert(ctx, target).await?,
    };

    print_report(&report);
    Ok(())
}

fn print_report(report: &Report) {
    if report.is_empty() {
        let message = match report.direction {
            Direction::Run => "Already up to date",
            Direction::Revert => "Nothing to revert",
        };
        println!("{} {}", "✅".green(), message);
        return;
    }

    let verb = match report.direction {
        Direction::Run => "Applied",
        Direction::Revert => "Reverted",
    };
    println!(
        "{} {} {} migration(s): {}",
        "✅".green(),
        verb,
        report.count(),
        format_versions(&report.versions)
    );
}

pub(crate) fn format_versions(versions: &[Version]) -> String {
    versions
        .iter()
        .map(|v| v.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}
