//! Command-line interface for ask.
//!
//! Each command lives in its own module with its own argument struct and
//! `execute` function. The commands are thin callers: chat goes through
//! [`crate::client`], updates through [`crate::upgrade`].
//!
//! # Available Commands
//!
//! - `chat` - Ask a question, or start an interactive session
//! - `cmd` - Turn a task description into a shell command and run it
//! - `test` - Check that the chat endpoint answers
//! - `completion` - Print a shell completion script
//! - `update` - Check for, install or roll back a release of ask
//! - `version` - Print build information
//! - `init` - Write the default configuration file
//! - `config` - Show the active configuration
//!
//! # Examples
//!
//! ```bash
//! ask chat "how do I list open ports?"
//! ask chat --role shell            # interactive session
//! ask cmd "find files larger than 100MB"
//! ask test
//! ask update --check
//! ask --no-progress update --yes
//! ask --config ./dev.json config
//! ```

mod chat;
mod cmd;
mod completion;
mod config;
mod connectivity;
mod update;
mod version;


use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::debug;
use tracing_subscriber::EnvFilter;

use crate::config::Config;
use crate::constants::{CONFIG_PATH_ENV, NO_PROGRESS_ENV};
use crate::upgrade::{BuildInfo, ReleaseResolver, VersionChecker};

/// Runtime configuration derived from the global flags.
///
/// Kept separate from [`Cli`] so tests can build one without parsing
/// arguments.
#[derive(Debug, Clone, Default)]
pub struct CliConfig {
    /// Filter directive for the tracing subscriber; `None` keeps `RUST_LOG`
    /// or falls back to `warn`.
    pub log_level: Option<String>,

    /// Disable progress bars (sets `ASK_NO_PROGRESS`).
    pub no_progress: bool,

    /// Explicit config file (sets `ASK_CONFIG`).
    pub config_path: Option<PathBuf>,
}

impl CliConfig {
    /// Configuration with every default.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Export the settings other layers read from the environment.
    ///
    /// Must run before any other thread is started.
    pub fn apply_to_env(&self) {
        // SAFETY: called once from `execute_with_config`, before the command
        // spawns threads of its own.
        unsafe {
            if self.no_progress {
                std::env::set_var(NO_PROGRESS_ENV, "1");
            }
            if let Some(ref path) = self.config_path {
                std::env::set_var(CONFIG_PATH_ENV, path);
            }
        }
    }

    /// Install the global tracing subscriber (stderr, no timestamps).
    pub fn init_logging(&self) {
        let filter = match (&self.log_level, std::env::var("RUST_LOG")) {
            (Some(level), _) => EnvFilter::new(level),
            (None, Ok(_)) => EnvFilter::from_default_env(),
            (None, Err(_)) => EnvFilter::new("warn"),
        };

        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .with_target(false)
            .without_time()
            .try_init();
    }
}

/// `ask` - a command-line assistant for chat-completion endpoints.
#[derive(Parser)]
#[command(
    name = "ask",
    about = "A command-line assistant for chat-completion endpoints",
    version,
    author,
    long_about = "ask sends questions to an OpenAI-compatible chat endpoint and streams the answer.\nIt can also replace itself with the newest release (`ask update`)."
)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Show debug output
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    verbose: bool,

    /// Only print errors
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Path to the configuration file (default: ~/.config/ask/config.json)
    #[arg(short, long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Disable progress bars and spinners
    #[arg(long, global = true)]
    no_progress: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Ask a question, or start an interactive chat when none is given
    Chat(chat::ChatArgs),

    /// Suggest a shell command for a task and run it after confirmation
    Cmd(cmd::CmdArgs),

    /// Test connectivity to the configured endpoint and model
    Test,

    /// Generate a shell completion script
    Completion(completion::CompletionArgs),

    /// Update ask to the latest release
    Update(update::UpdateArgs),

    /// Print version and build information
    Version,

    /// Write a default configuration file
    Init,

    /// Show the active configuration (API key masked)
    Config(config::ConfigArgs),
}

impl Cli {
    /// Run the parsed command.
    ///
    /// # Errors
    ///
    /// Whatever the command fails with; `main` turns it into a
    /// user-friendly message.
    pub async fn execute(self) -> Result<()> {
        let config = self.build_config();
        self.execute_with_config(config).await
    }

    /// Translate the global flags into a [`CliConfig`].
    #[must_use]
    pub fn build_config(&self) -> CliConfig {
        let log_level = if self.verbose {
            Some("debug".to_string())
        } else if self.quiet {
            Some("error".to_string())
        } else {
            None
        };

        CliConfig {
            log_level,
            no_progress: self.no_progress || self.quiet,
            config_path: self.config.clone(),
        }
    }

    /// Run the command with an explicit [`CliConfig`].
    ///
    /// # Errors
    ///
    /// See [`Cli::execute`].
    pub async fn execute_with_config(self, cli_config: CliConfig) -> Result<()> {
        cli_config.apply_to_env();
        cli_config.init_logging();

        let build = BuildInfo::current();
        let config_path = Config::resolve_path(cli_config.config_path.as_deref())?;
        debug!("Using config file {}", config_path.display());

        match self.command {
            Commands::Version => {
                version::execute(&build);
                Ok(())
            }
            Commands::Completion(args) => {
                completion::execute(&args);
                Ok(())
            }
            Commands::Init => config::init(&config_path).await,
            Commands::Config(args) => {
                let config = Config::load(&config_path).await?;
                config::show(&args, &config, &config_path)
            }
            Commands::Update(args) => {
                let config = Config::load(&config_path).await?;
                update::execute(args, build, &config, &config_path).await
            }
            Commands::Chat(args) => {
                let config = Config::load(&config_path).await?;
                if !self.quiet {
                    startup_notice(&build, &config, &config_path).await;
                }
                chat::execute(args, &build, &config).await
            }
            Commands::Cmd(args) => {
                let config = Config::load(&config_path).await?;
                cmd::execute(args, &build, &config).await
            }
            Commands::Test => {
                let config = Config::load(&config_path).await?;
                connectivity::execute(&build, &config).await
            }
        }
    }
}

/// Print the cached "new version available" notice, if enabled and due.
async fn startup_notice(build: &BuildInfo, config: &Config, config_path: &std::path::Path) {
    if !config.upgrade.check_on_startup {
        return;
    }
    let Some(cache_dir) = config_path.parent() else {
        return;
    };
    let resolver = match ReleaseResolver::new(build.clone()) {
        Ok(resolver) => resolver,
        Err(e) => {
            debug!("Skipping startup update check: {}", e);
            return;
        }
    };

    let checker = VersionChecker::new(resolver, config.upgrade.clone(), cache_dir);
    match checker.check_for_updates_if_needed().await {
        Ok(Some(latest)) => VersionChecker::display_update_notification(&build.version, &latest),
        Ok(None) => {}
        Err(e) => debug!("Startup update check failed: {}", e),
    }
}
