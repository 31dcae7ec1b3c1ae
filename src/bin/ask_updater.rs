//! `ask_updater <target> <staged>`
//!
//! Finishes an update that `ask` could not complete in-process: waits for
//! the old executable to be released, swaps the staged one in, and starts
//! the new `ask`. Exit codes: 0 success, 1 timeout or failure, 2
//! inconsistent state, 64 usage error.

use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use ask_cli::config::Config;
use ask_cli::upgrade::UpgradeError;
use ask_cli::upgrade::config::UpgradeConfig;
use ask_cli::upgrade::waiter::{EXIT_USAGE, HelperOutcome, HelperState, LockWaiter};
use clap::Parser;
use colored::Colorize;
use tracing::debug;
use tracing_subscriber::EnvFilter;

/// Finish an `ask` update once the running executable has exited
#[derive(Parser, Debug)]
#[command(name = "ask_updater", version)]
struct Args {
    /// The live `ask` executable to replace
    #[arg(value_name = "TARGET-EXECUTABLE")]
    target: PathBuf,

    /// The downloaded executable to install
    #[arg(value_name = "NEW-EXECUTABLE")]
    staged: PathBuf,
}

fn main() {
    #[cfg(windows)]
    colored::control::set_virtual_terminal(true).ok();

    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .without_time()
        .try_init();

    let Args { target, staged } = match Args::try_parse() {
        Ok(args) => args,
        Err(e) if !e.use_stderr() => e.exit(),
        Err(e) => {
            let _ = e.print();
            std::process::exit(EXIT_USAGE);
        }
    };

    println!("{}", "ask updater".cyan().bold());
    println!("  Target:     {}", target.display());
    println!("  New binary: {}", staged.display());

    let settings = upgrade_settings();
    let waiter = LockWaiter::new().with_timing(
        settings.lock_poll(),
        settings.lock_wait(),
        settings.backup_grace(),
    );

    let mut outcome = waiter.run(&staged, &target, report, relaunch);
    match &outcome {
        HelperOutcome::Relaunched { .. } => {}
        HelperOutcome::RelaunchFailed { target, reason, .. } => {
            eprintln!("{} {}", "Could not start the new version:".red(), reason);
            eprintln!("Please start it manually: {}", target.display());
        }
        HelperOutcome::Failed(e) => explain(e, &staged),
    }

    outcome.wait_for_cleanup();
    std::process::exit(outcome.exit_code());
}

/// Timing from the user's config file; defaults when it cannot be read.
fn upgrade_settings() -> UpgradeConfig {
    let Ok(path) = Config::resolve_path(None) else {
        return UpgradeConfig::default();
    };
    match std::fs::read_to_string(&path).map(|s| serde_json::from_str::<Config>(&s)) {
        Ok(Ok(config)) => config.upgrade,
        Ok(Err(e)) => {
            debug!("Ignoring unreadable config {}: {}", path.display(), e);
            UpgradeConfig::default()
        }
        Err(_) => UpgradeConfig::default(),
    }
}

fn report(state: HelperState) {
    match state {
        HelperState::WaitingForLock => println!("{}", "Waiting for ask to exit...".yellow()),
        HelperState::BackedUp => println!("Backed up the current version."),
        HelperState::Installed => println!("{}", "Installed the new version.".green()),
        HelperState::Relaunched => println!("{}", "Started the new version.".green().bold()),
        HelperState::TimedOut | HelperState::Failed => {}
    }
}

/// Start the new executable with the terminal inherited, without waiting.
fn relaunch(target: &Path) -> std::io::Result<()> {
    Command::new(target)
        .arg("version")
        .stdin(Stdio::inherit())
        .stdout(Stdio::inherit())
        .stderr(Stdio::inherit())
        .spawn()
        .map(|child| debug!("Relaunched with pid {}", child.id()))
}

fn explain(error: &UpgradeError, staged: &Path) {
    eprintln!("{} {}", "Update failed:".red().bold(), error);
    match error {
        UpgradeError::TimedOut { target, .. } => {
            eprintln!("Close every program using {} and run 'ask update' again.", target.display());
            eprintln!("The downloaded version is still at {}", staged.display());
        }
        UpgradeError::InconsistentState { target, backup, .. } => {
            eprintln!("Move {} back to {} by hand.", backup.display(), target.display());
        }
        _ => eprintln!("Your previous version was left in place."),
    }
}
