//! `config show`

use anyhow::{Context, Result};
use rung_config::RungConfig;

use crate::cli::OutputFormat;

pub fn show(config: &RungConfig, format: OutputFormat) -> Result<()> {
    println!("{}", render(config, format)?);
    Ok(())
}

fn render(config: &RungConfig, format: OutputFormat) -> Result<String> {
    match format {
        OutputFormat::Yaml => serde_yaml::to_string(config).context("Failed to serialize to YAML"),
        OutputFormat::Json => {
            serde_json::to_string_pretty(config).context("Failed to serialize to JSON")
        }
    }
}
