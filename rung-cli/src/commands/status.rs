//! `status`

use anyhow::{Context, Result};
use colored::Colorize;
use rung_config::RungConfig;
use tokio_util::sync::CancellationToken;

use super::build_migrator;
use super::migrate::format_versions;

pub async fn execute(config: &RungConfig, ctx: &CancellationToken) -> Result<()> {
    let migrator = build_migrator(config, ctx).await?;
    let status = migrator.status(ctx).await?;
    let locked = migrator
        .store()
        .is_locked(ctx)
        .await
        .context("Failed to read lock state")?;
    let applied = migrator
        .store()
        .applied(ctx)
        .await
        .context("Failed to read applied versions")?;

    match status.current {
        Some(version) if status.unknown_current => println!(
            "Current version: {} {}",
            version,
            "(no matching migration file)".yellow()
        ),
        Some(version) => println!("Current version: {}", version),
        None => println!("Current version: {}", "none".dimmed()),
    }

    if status.pending.is_empty() {
        println!("Pending: {}", "none".dimmed());
    } else {
        println!(
            "Pending: {} ({})",
            status.pending.len(),
            format_versions(&status.pending)
        );
    }

    if locked {
        println!("Lock: {}", "held".red().bold());
    } else {
        println!("Lock: {}", "free".green());
    }

    if !applied.is_empty() {
        println!("\nApplied:");
        for entry in applied {
            let name = migrator
                .sources()
                .iter()
                .find(|m| m.version() == entry.version)
                .map(|m| m.name())
                .unwrap_or("?");
            println!("  {:>6}  {}  {}", entry.version, entry.applied_at, name);
        }
    }

    Ok(())
}
