use std::io::{BufRead, Write};
use std::path::Path;

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use tracing::debug;

use crate::config::Config;
use crate::upgrade::handoff::handoff;
use crate::upgrade::{
    BuildInfo, ReleaseDescriptor, ReleaseResolver, SelfUpdater, UpdateOutcome, VersionChecker,
    backup_path, restore_backup,
};
use crate::utils::{ProgressBar, is_progress_disabled};

/// Arguments of `ask update`.
///
/// ```bash
/// ask update            # check, confirm, install
/// ask update --check    # only report whether a newer release exists
/// ask update --yes      # install without asking
/// ask update --rollback # put the previous executable back
/// ```
#[derive(Args, Debug, Default)]
pub struct UpdateArgs {
    /// Only check whether a newer release exists
    #[arg(long, conflicts_with = "rollback")]
    pub check: bool,

    /// Install without asking for confirmation
    #[arg(short, long)]
    pub yes: bool,

    /// Restore the executable saved by the last update
    #[arg(long)]
    pub rollback: bool,

    /// Reinstall the latest release even when it is not newer
    #[arg(short, long, conflicts_with = "rollback")]
    pub force: bool,
}

pub async fn execute(args: UpdateArgs, build: BuildInfo, config: &Config, config_path: &Path) -> Result<()> {
    if args.rollback {
        let target = std::env::current_exe().context("Failed to locate the running executable")?;
        return rollback(&target);
    }

    let show_progress = !is_progress_disabled();
    let resolver = ReleaseResolver::new(build.clone())?;
    let updater = SelfUpdater::new(resolver)?
        .grace(config.upgrade.backup_grace())
        .show_progress(show_progress);

    let spinner = ProgressBar::spinner("Checking for updates...");
    let check = updater.check().await;
    spinner.finish_and_clear();
    let check = check?;
    let latest = &check.release;

    if !check.available && !args.force {
        println!(
            "{}",
            format!("You are on the latest version ({}).", build.tag()).green()
        );
        return Ok(());
    }

    print_release(&build, latest, check.available);
    if args.check {
        if check.available {
            println!("Run {} to install it.", "ask update".cyan().bold());
        }
        return Ok(());
    }

    if !args.yes && !confirm(&format!("Install {}?", latest.tag))? {
        println!("Update cancelled.");
        return Ok(());
    }

    match updater.update_to(latest).await? {
        UpdateOutcome::Installed { tag, reaper } => {
            println!(
                "{}",
                format!("Updated {} to {}.", updater.target().display(), tag).green().bold()
            );
            forget_notice(updater.resolver(), config, config_path).await;
            reaper.wait();
            Ok(())
        }
        UpdateOutcome::HandoffRequired(staged) => {
            forget_notice(updater.resolver(), config, config_path).await;
            match handoff(updater.resolver(), updater.target(), staged, show_progress).await? {}
        }
    }
}

fn rollback(target: &Path) -> Result<()> {
    println!("{}", "Rolling back to the previous version...".yellow());
    debug!("Restoring {} from {}", target.display(), backup_path(target).display());
    restore_backup(target).context("Rollback failed")?;
    println!("{}", "Restored the previous version.".green());
    Ok(())
}

fn print_release(build: &BuildInfo, release: &ReleaseDescriptor, newer: bool) {
    if newer {
        println!(
            "{}",
            format!("Update available: {} -> {}", build.tag(), release.tag).yellow().bold()
        );
    } else {
        println!("Latest release is {} (installed: {}).", release.tag, build.tag());
    }
    if let Some(published) = release.published_at {
        println!("Published {}", published.format("%Y-%m-%d"));
    }
    let notes = release.body.trim();
    if !notes.is_empty() {
        println!();
        for line in notes.lines().take(20) {
            println!("  {}", line.dimmed());
        }
        println!();
    }
}

pub(super) fn confirm(question: &str) -> Result<bool> {
    print!("{question} [y/N] ");
    std::io::stdout().flush().ok();

    let mut answer = String::new();
    std::io::stdin()
        .lock()
        .read_line(&mut answer)
        .context("Failed to read confirmation")?;
    Ok(is_yes(&answer))
}

pub(super) fn is_yes(answer: &str) -> bool {
    matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes")
}

/// Drop the cached startup notice so it is not shown for the version just installed.
async fn forget_notice(resolver: &ReleaseResolver, config: &Config, config_path: &Path) {
    let Some(cache_dir) = config_path.parent() else {
        return;
    };
    let checker = VersionChecker::new(resolver.clone(), config.upgrade.clone(), cache_dir);
    if let Err(e) = checker.clear_cache().await {
        debug!("Could not clear version cache: {}", e);
    }
}
