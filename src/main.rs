//! ask CLI entry point
//!
//! Parses arguments, runs the command and renders any error with
//! [`user_friendly_error`] before exiting with status 1.
//!
//! - `chat` - Ask a question or start an interactive session
//! - `update` - Update ask to the latest release
//! - `version` - Print build information
//! - `init` - Write the default configuration file
//! - `config` - Show the active configuration

use anyhow::Result;
use ask_cli::cli;
use ask_cli::core::user_friendly_error;
use clap::Parser;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = cli::Cli::parse();

    #[cfg(windows)]
    colored::control::set_virtual_terminal(true).ok();

    match cli.execute().await {
        Ok(()) => Ok(()),
        Err(e) => {
            let error_ctx = user_friendly_error(e);
            error_ctx.display();
            std::process::exit(1);
        }
    }
}
