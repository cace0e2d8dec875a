//! `unlock`

use anyhow::{Context, Result};
use colored::Colorize;
use rung_config::RungConfig;
use rung_core::{Migrator, VersionStore};
use tokio_util::sync::CancellationToken;

use super::open_store;

pub async fn execute(config: &RungConfig, ctx: &CancellationToken) -> Result<()> {
    let store = open_store(config).await?;
    store
        .init(ctx)
        .await
        .context("Failed to initialise version store")?;

    if !store
        .is_locked(ctx)
        .await
        .context("Failed to read lock state")?
    {
        println!("{} Version store lock is not held", "✅".green());
        return Ok(());
    }

    Migrator::new(store, Vec::new()).force_release(ctx).await?;
    println!("{} Version store lock released", "✅".green());
    Ok(())
}
