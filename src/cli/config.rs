use std::path::Path;

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;

use crate::config::Config;

/// Arguments of `ask config`.
#[derive(Args, Debug, Default)]
pub struct ConfigArgs {
    /// Print only the path of the configuration file
    #[arg(long)]
    pub path: bool,
}

/// `ask init`: write the default configuration.
pub async fn init(path: &Path) -> Result<()> {
    Config::init_at(path).await?;
    println!("{} {}", "Created".green().bold(), path.display());
    println!("Add your API key as \"api_key\" or export ASK_API_KEY.");
    Ok(())
}

/// `ask config`: show the loaded configuration with the key masked.
pub fn show(args: &ConfigArgs, config: &Config, path: &Path) -> Result<()> {
    if args.path {
        println!("{}", path.display());
        return Ok(());
    }

    let origin = if path.exists() { "" } else { " (not found, showing defaults)" };
    println!("{} {}{}", "Config file:".bold(), path.display(), origin.dimmed());
    let rendered =
        serde_json::to_string_pretty(&config.redacted()).context("Failed to render configuration")?;
    println!("{rendered}");
    Ok(())
}
