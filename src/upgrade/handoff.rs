//! Handing a locked update over to the `ask_updater` helper.
//!
//! When the running executable cannot be moved aside, `ask` prepares a
//! [`HandoffPlan`]: a helper binary, and the staged executable moved to a
//! temp path that outlives this process. It then starts
//! `ask_updater <target> <staged>` and exits, which releases the lock the
//! helper is waiting for.

use std::convert::Infallible;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};

use anyhow::{Context, Result};
use colored::Colorize;
use tracing::{debug, info, warn};

use crate::constants::{HELPER_BINARY_NAME, executable_file_name};
use crate::upgrade::archive::{extract, find_binary};
use crate::upgrade::assets::{AssetKind, SelectedAsset, select_asset};
use crate::upgrade::download::download_asset;
use crate::upgrade::installer::{RealFs, SwapFs};
use crate::upgrade::release::ReleaseResolver;
use crate::upgrade::self_updater::StagedBinary;
use crate::upgrade::UpgradeError;

/// Everything needed to start the helper.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandoffPlan {
    /// Helper executable
    pub helper: PathBuf,
    /// Live executable the helper replaces
    pub target: PathBuf,
    /// New executable, outside any scratch directory
    pub staged: PathBuf,
}

impl HandoffPlan {
    /// The helper invocation, with the terminal inherited.
    #[must_use]
    pub fn command(&self) -> Command {
        let mut command = Command::new(&self.helper);
        command
            .arg(&self.target)
            .arg(&self.staged)
            .stdin(Stdio::inherit())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit());
        command
    }

    /// Start the helper without waiting for it.
    ///
    /// # Errors
    ///
    /// Fails when the helper cannot be spawned.
    pub fn spawn(&self) -> Result<Child> {
        self.command()
            .spawn()
            .with_context(|| format!("Failed to start update helper {}", self.helper.display()))
    }
}

/// Look for an existing helper next to the executable, then in `temp_dir`.
#[must_use]
pub fn locate_helper(exe_dir: Option<&Path>, temp_dir: &Path) -> Option<PathBuf> {
    let name = executable_file_name(HELPER_BINARY_NAME);
    exe_dir
        .map(|dir| dir.join(&name))
        .into_iter()
        .chain(std::iter::once(temp_dir.join(&name)))
        .find(|candidate| candidate.is_file())
}

/// Return a usable helper, downloading it into `temp_dir` if none is present.
///
/// The helper comes from the release of the running version so that both
/// sides agree on the protocol; when that release does not exist the latest
/// release is used instead.
///
/// # Errors
///
/// Returns [`UpgradeError::Resolve`], [`UpgradeError::NotFound`],
/// [`UpgradeError::Download`] or [`UpgradeError::Extract`].
pub async fn ensure_helper(
    resolver: &ReleaseResolver,
    exe_dir: Option<&Path>,
    temp_dir: &Path,
    show_progress: bool,
) -> Result<PathBuf, UpgradeError> {
    if let Some(helper) = locate_helper(exe_dir, temp_dir) {
        debug!("Using helper {}", helper.display());
        return Ok(helper);
    }

    let build = resolver.build();
    let release = match resolver.fetch_release(&build.tag()).await {
        Ok(release) => release,
        Err(e) => {
            warn!("No release for {} ({}), using the latest helper", build.tag(), e);
            resolver.fetch_latest_release().await?
        }
    };
    let selected = select_asset(&release, &build.platform, HELPER_BINARY_NAME)?;
    info!("Downloading helper {} from {}", selected.asset.name, release.tag);

    let helper = temp_dir.join(executable_file_name(HELPER_BINARY_NAME));
    let partial = temp_dir.join(format!("{}.{}.part", selected.asset.name, uuid::Uuid::new_v4()));
    download_asset(resolver.client(), selected.url(), &partial, &selected.asset.name, show_progress)
        .await?;

    let placed = place_helper(&partial, &selected, temp_dir, &helper);
    let _ = std::fs::remove_file(&partial);
    placed?;
    if let Err(e) = RealFs.set_executable(&helper) {
        warn!("Could not mark helper {} executable: {}", helper.display(), e);
    }
    Ok(helper)
}

/// Move the downloaded helper, unpacking it first when it is a bundle.
fn place_helper(
    download: &Path,
    selected: &SelectedAsset,
    temp_dir: &Path,
    helper: &Path,
) -> Result<(), UpgradeError> {
    let cannot_place = |e: std::io::Error| UpgradeError::Download {
        url: selected.url().to_string(),
        reason: format!("cannot place helper at {}: {e}", helper.display()),
    };
    match selected.kind {
        AssetKind::Executable => RealFs.rename(download, helper).map_err(cannot_place),
        AssetKind::Archive => {
            let unpack_dir = temp_dir.join(format!("ask-helper-{}", uuid::Uuid::new_v4()));
            let placed = std::fs::create_dir_all(&unpack_dir)
                .map_err(|e| UpgradeError::Extract {
                    archive: download.to_path_buf(),
                    reason: e.to_string(),
                })
                .and_then(|()| extract(download, &unpack_dir))
                .and_then(|()| find_binary(&unpack_dir, HELPER_BINARY_NAME))
                .and_then(|source| RealFs.rename(&source, helper).map_err(cannot_place));
            let _ = std::fs::remove_dir_all(&unpack_dir);
            placed
        }
    }
}

/// Move `staged` to `<temp_dir>/ask-update-<uuid>[.exe]`.
///
/// # Errors
///
/// Returns [`UpgradeError::Install`] when the file cannot be moved.
pub fn relocate_staged(staged: &Path, target: &Path, temp_dir: &Path) -> Result<PathBuf, UpgradeError> {
    let name = executable_file_name(&format!("ask-update-{}", uuid::Uuid::new_v4()));
    let destination = temp_dir.join(name);
    RealFs.rename(staged, &destination).map_err(|e| UpgradeError::Install {
        target: target.to_path_buf(),
        reason: format!("cannot stage {} for the helper: {e}", staged.display()),
    })?;
    if let Err(e) = RealFs.set_executable(&destination) {
        debug!("Could not mark {} executable: {}", destination.display(), e);
    }
    Ok(destination)
}

/// Prepare the helper invocation for `staged`, consuming its scratch directory.
///
/// # Errors
///
/// See [`ensure_helper`] and [`relocate_staged`].
pub async fn prepare_handoff(
    resolver: &ReleaseResolver,
    target: &Path,
    staged: StagedBinary,
    temp_dir: &Path,
    show_progress: bool,
) -> Result<HandoffPlan, UpgradeError> {
    let exe_dir = target.parent();
    let helper = ensure_helper(resolver, exe_dir, temp_dir, show_progress).await?;
    let relocated = relocate_staged(&staged.binary, target, temp_dir)?;
    drop(staged);

    Ok(HandoffPlan {
        helper,
        target: target.to_path_buf(),
        staged: relocated,
    })
}

/// Start the helper for `staged` and exit this process with status 0.
///
/// Returns only on failure; the staged executable is left in the temp
/// directory in that case.
///
/// # Errors
///
/// Any failure preparing or spawning the helper.
pub async fn handoff(
    resolver: &ReleaseResolver,
    target: &Path,
    staged: StagedBinary,
    show_progress: bool,
) -> Result<Infallible> {
    let temp_dir = std::env::temp_dir();
    let plan = prepare_handoff(resolver, target, staged, &temp_dir, show_progress).await?;

    println!("{}", "The running executable is in use; finishing the update in a helper process.".yellow());
    println!("  Helper: {}", plan.helper.display());
    println!("  New binary: {}", plan.staged.display());

    let child = plan.spawn()?;
    debug!("Started helper with pid {}", child.id());
    println!("{}", "ask will now exit so the helper can replace it.".cyan());

    std::process::exit(0)
}
