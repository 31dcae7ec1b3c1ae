use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use tempfile::TempDir;
use tracing::{debug, info};

use crate::constants::{BINARY_NAME, DEFAULT_BACKUP_GRACE};
use crate::upgrade::archive::{extract, find_binary};
use crate::upgrade::assets::{AssetKind, PlatformKey, SelectedAsset, select_asset};
use crate::upgrade::download::download_asset;
use crate::upgrade::installer::{BackupReaper, RealFs, SwapFs, install};
use crate::upgrade::release::{ReleaseDescriptor, ReleaseResolver, UpdateCheck};
use crate::upgrade::UpgradeError;

/// Orchestrates one update of the running executable.
///
/// `SelfUpdater` drives the pipeline
///
/// ```text
/// check ──▶ select asset ──▶ stage (download, extract) ──▶ install
///                                                          │
///                                                          └─ locked ──▶ hand off
/// ```
///
/// and reports the result as an [`UpdateOutcome`]. It never exits the
/// process: when the executable is locked the staged binary is handed back
/// to the caller, which starts the helper via
/// [`handoff`](crate::upgrade::handoff::handoff).
///
/// # Examples
///
/// ```rust,no_run
/// use ask_cli::upgrade::{BuildInfo, ReleaseResolver, SelfUpdater, UpdateOutcome};
///
/// # async fn example() -> anyhow::Result<()> {
/// let resolver = ReleaseResolver::new(BuildInfo::current())?;
/// let updater = SelfUpdater::new(resolver)?;
///
/// let check = updater.check().await?;
/// if check.available {
///     match updater.update_to(&check.release).await? {
///         UpdateOutcome::Installed { reaper, .. } => reaper.wait(),
///         UpdateOutcome::HandoffRequired(_staged) => { /* start the helper */ }
///     }
/// }
/// # Ok(())
/// # }
/// ```
pub struct SelfUpdater {
    resolver: ReleaseResolver,
    platform: PlatformKey,
    target: PathBuf,
    grace: Duration,
    show_progress: bool,
}

/// A downloaded (and, for archives, extracted) executable ready to install.
#[derive(Debug)]
pub struct StagedBinary {
    /// Scratch directory owning the staged file; removed on drop
    pub scratch: TempDir,
    /// The executable to install
    pub binary: PathBuf,
    /// Tag of the release it came from
    pub tag: String,
}

/// How an update attempt ended.
#[derive(Debug)]
pub enum UpdateOutcome {
    /// The new executable is live.
    Installed {
        /// Tag that is now installed
        tag: String,
        /// Pending backup removal; wait on it before exiting
        reaper: BackupReaper,
    },
    /// The executable is locked; the helper must finish the swap.
    HandoffRequired(StagedBinary),
}

impl SelfUpdater {
    /// Updater replacing the currently running executable.
    ///
    /// # Errors
    ///
    /// Fails if the path of the running executable cannot be determined.
    pub fn new(resolver: ReleaseResolver) -> Result<Self> {
        let target = std::env::current_exe().context("Failed to locate the running executable")?;
        Ok(Self::with_target(resolver, target))
    }

    /// Updater replacing `target` instead of the running executable.
    pub fn with_target(resolver: ReleaseResolver, target: impl Into<PathBuf>) -> Self {
        let platform = resolver.build().platform.clone();
        Self {
            resolver,
            platform,
            target: target.into(),
            grace: DEFAULT_BACKUP_GRACE,
            show_progress: true,
        }
    }

    /// Override the platform used for asset selection.
    #[must_use]
    pub fn platform(mut self, platform: PlatformKey) -> Self {
        self.platform = platform;
        self
    }

    /// Override the grace delay before the backup is removed.
    #[must_use]
    pub const fn grace(mut self, grace: Duration) -> Self {
        self.grace = grace;
        self
    }

    /// Enable or disable the download progress bar.
    #[must_use]
    pub const fn show_progress(mut self, show: bool) -> Self {
        self.show_progress = show;
        self
    }

    /// Executable that will be replaced.
    pub fn target(&self) -> &Path {
        &self.target
    }

    /// The release resolver in use.
    pub const fn resolver(&self) -> &ReleaseResolver {
        &self.resolver
    }

    /// Compare the latest release with the running version.
    ///
    /// # Errors
    ///
    /// Returns [`UpgradeError::Resolve`] when the release feed is unreachable.
    pub async fn check(&self) -> Result<UpdateCheck, UpgradeError> {
        self.resolver.check_update().await
    }

    /// Select the asset for this platform from `release`.
    ///
    /// # Errors
    ///
    /// Returns [`UpgradeError::NotFound`] when the release has no build for
    /// this platform.
    pub fn select(&self, release: &ReleaseDescriptor) -> Result<SelectedAsset, UpgradeError> {
        select_asset(release, &self.platform, BINARY_NAME)
    }

    /// Download the selected asset and, for archives, extract the executable.
    ///
    /// # Errors
    ///
    /// Returns [`UpgradeError::Download`] or [`UpgradeError::Extract`]. The
    /// live executable is never touched.
    pub async fn stage(
        &self,
        release: &ReleaseDescriptor,
        selected: &SelectedAsset,
    ) -> Result<StagedBinary, UpgradeError> {
        let scratch = tempfile::Builder::new().prefix("ask-download-").tempdir().map_err(|e| {
            UpgradeError::Download {
                url: selected.url().to_string(),
                reason: format!("cannot create a scratch directory: {e}"),
            }
        })?;

        let download_path = scratch.path().join(&selected.asset.name);
        download_asset(
            self.resolver.client(),
            selected.url(),
            &download_path,
            &selected.asset.name,
            self.show_progress,
        )
        .await?;

        let binary = match selected.kind {
            AssetKind::Executable => download_path,
            AssetKind::Archive => {
                let unpack_dir = scratch.path().join("unpacked");
                std::fs::create_dir_all(&unpack_dir).map_err(|e| UpgradeError::Extract {
                    archive: download_path.clone(),
                    reason: e.to_string(),
                })?;
                extract(&download_path, &unpack_dir)?;
                find_binary(&unpack_dir, BINARY_NAME)?
            }
        };

        if let Err(e) = RealFs.set_executable(&binary) {
            debug!("Could not mark staged binary executable: {}", e);
        }
        debug!("Staged {} at {}", release.tag, binary.display());

        Ok(StagedBinary {
            scratch,
            binary,
            tag: release.tag.clone(),
        })
    }

    /// Select, stage and install `release`.
    ///
    /// A locked executable is not an error: the staged binary comes back as
    /// [`UpdateOutcome::HandoffRequired`].
    ///
    /// # Errors
    ///
    /// Any other [`UpgradeError`] from selection, staging or installation.
    pub async fn update_to(&self, release: &ReleaseDescriptor) -> Result<UpdateOutcome, UpgradeError> {
        let selected = self.select(release)?;
        info!("Updating {} to {} using {}", self.target.display(), release.tag, selected.asset.name);

        let staged = self.stage(release, &selected).await?;
        match install(&staged.binary, &self.target, self.grace) {
            Ok(reaper) => Ok(UpdateOutcome::Installed {
                tag: staged.tag,
                reaper,
            }),
            Err(UpgradeError::Locked { reason, .. }) => {
                info!("{} is locked ({}), handing off to the helper", self.target.display(), reason);
                Ok(UpdateOutcome::HandoffRequired(staged))
            }
            Err(e) => Err(e),
        }
    }
}
