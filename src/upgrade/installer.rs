//! Transactional replacement of the live executable.
//!
//! The swap is two renames with a single backup slot next to the target:
//!
//! ```text
//! target ──(1)──▶ target.backup        staged ──(2)──▶ target
//! ```
//!
//! If (1) fails the executable is locked and nothing has changed. If (2)
//! fails the backup is renamed back. At any instant exactly one of `target`
//! and `target.backup` holds the current executable. After a successful swap
//! the backup is deleted by a [`BackupReaper`] once the grace delay elapses.
//!
//! All file-system access goes through [`SwapFs`] so failures can be injected.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use anyhow::Result;
use tracing::{debug, info, warn};

use crate::constants::BACKUP_SUFFIX;
use crate::core::AskError;
use crate::upgrade::UpgradeError;

/// File-system operations used by the installer.
pub trait SwapFs {
    /// Move `from` to `to`, replacing nothing the caller has not cleared.
    fn rename(&self, from: &Path, to: &Path) -> io::Result<()>;
    /// Mark `path` executable (0755). A no-op where the concept does not exist.
    fn set_executable(&self, path: &Path) -> io::Result<()>;
    /// Delete a file.
    fn remove_file(&self, path: &Path) -> io::Result<()>;
    /// Whether `path` exists.
    fn exists(&self, path: &Path) -> bool;
}

/// The real file system.
///
/// Renames that cross devices (a staged file in a tmpfs `/tmp`, say) fall
/// back to copy and remove.
#[derive(Debug, Clone, Copy, Default)]
pub struct RealFs;

impl SwapFs for RealFs {
    fn rename(&self, from: &Path, to: &Path) -> io::Result<()> {
        match fs::rename(from, to) {
            Err(e) if e.kind() == io::ErrorKind::CrossesDevices => {
                debug!("{} and {} are on different devices, copying", from.display(), to.display());
                fs::copy(from, to)?;
                fs::remove_file(from)
            }
            other => other,
        }
    }

    #[cfg(unix)]
    fn set_executable(&self, path: &Path) -> io::Result<()> {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, fs::Permissions::from_mode(0o755))
    }

    #[cfg(not(unix))]
    fn set_executable(&self, _path: &Path) -> io::Result<()> {
        Ok(())
    }

    fn remove_file(&self, path: &Path) -> io::Result<()> {
        fs::remove_file(path)
    }

    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }
}

/// Backup slot for `target`: the same path with `.backup` appended.
#[must_use]
pub fn backup_path(target: &Path) -> PathBuf {
    let mut name = target.as_os_str().to_os_string();
    name.push(BACKUP_SUFFIX);
    PathBuf::from(name)
}

/// Lifecycle of an [`InstallTransaction`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstallState {
    /// Nothing has been touched yet
    Pending,
    /// The live executable sits in the backup slot
    BackedUp,
    /// The staged executable is live
    Installed,
    /// The swap failed and the backup was restored
    RolledBack,
}

/// One replacement of `target` by `staged`.
pub struct InstallTransaction<F: SwapFs = RealFs> {
    fs: F,
    target: PathBuf,
    backup: PathBuf,
    staged: PathBuf,
    state: InstallState,
}

impl InstallTransaction<RealFs> {
    /// Transaction on the real file system.
    ///
    /// # Errors
    ///
    /// See [`InstallTransaction::with_fs`].
    pub fn new(staged: impl Into<PathBuf>, target: impl Into<PathBuf>) -> Result<Self, UpgradeError> {
        Self::with_fs(RealFs, staged, target)
    }
}

impl<F: SwapFs> InstallTransaction<F> {
    /// Transaction using `fs` for every file-system operation.
    ///
    /// # Errors
    ///
    /// Returns [`UpgradeError::Install`] when `staged` and `target` are the
    /// same file.
    pub fn with_fs(
        fs: F,
        staged: impl Into<PathBuf>,
        target: impl Into<PathBuf>,
    ) -> Result<Self, UpgradeError> {
        let staged = staged.into();
        let target = target.into();
        if same_file(&staged, &target) {
            return Err(UpgradeError::Install {
                target,
                reason: format!("staged file {} is the live executable", staged.display()),
            });
        }
        Ok(Self {
            fs,
            backup: backup_path(&target),
            target,
            staged,
            state: InstallState::Pending,
        })
    }

    /// Current lifecycle state.
    #[must_use]
    pub const fn state(&self) -> InstallState {
        self.state
    }

    /// Live executable path.
    #[must_use]
    pub fn target(&self) -> &Path {
        &self.target
    }

    /// Backup slot path.
    #[must_use]
    pub fn backup(&self) -> &Path {
        &self.backup
    }

    /// Move the live executable into the backup slot.
    ///
    /// A stale backup from an earlier update is removed first, but only while
    /// the target still exists; otherwise the backup may be the only copy.
    /// Safe to call repeatedly until it succeeds.
    ///
    /// # Errors
    ///
    /// Returns [`UpgradeError::Locked`] when the rename fails. The target is
    /// untouched and the transaction stays `Pending`.
    pub fn back_up(&mut self) -> Result<(), UpgradeError> {
        debug_assert_eq!(self.state, InstallState::Pending);

        if self.fs.exists(&self.backup) && self.fs.exists(&self.target) {
            debug!("Removing stale backup {}", self.backup.display());
            if let Err(e) = self.fs.remove_file(&self.backup) {
                warn!("Could not remove stale backup {}: {}", self.backup.display(), e);
            }
        }

        self.fs.rename(&self.target, &self.backup).map_err(|e| UpgradeError::Locked {
            target: self.target.clone(),
            reason: e.to_string(),
        })?;
        debug!("Backed up {} to {}", self.target.display(), self.backup.display());
        self.state = InstallState::BackedUp;
        Ok(())
    }

    /// Move the staged executable into place, rolling back on failure.
    ///
    /// # Errors
    ///
    /// Returns [`UpgradeError::Install`] after a successful rollback (the
    /// staged file is left where it was), or
    /// [`UpgradeError::InconsistentState`] when the rollback fails too.
    pub fn swap(&mut self) -> Result<(), UpgradeError> {
        debug_assert_eq!(self.state, InstallState::BackedUp);

        let swap_error = match self.fs.rename(&self.staged, &self.target) {
            Ok(()) => {
                self.state = InstallState::Installed;
                info!("Installed {} to {}", self.staged.display(), self.target.display());
                return Ok(());
            }
            Err(e) => e,
        };

        warn!("Swap failed ({}), restoring {}", swap_error, self.target.display());
        match self.fs.rename(&self.backup, &self.target) {
            Ok(()) => {
                self.state = InstallState::RolledBack;
                Err(UpgradeError::Install {
                    target: self.target.clone(),
                    reason: format!("{swap_error}; the previous version was restored"),
                })
            }
            Err(rollback_error) => Err(UpgradeError::InconsistentState {
                target: self.target.clone(),
                backup: self.backup.clone(),
                reason: format!("install failed ({swap_error}) and rollback failed ({rollback_error})"),
            }),
        }
    }

    /// Mark the new executable runnable and schedule removal of the backup.
    ///
    /// Neither step can fail the update: a chmod failure is logged and the
    /// backup removal is best-effort.
    pub fn finalize(self, grace: Duration) -> BackupReaper
    where
        F: Send + 'static,
    {
        debug_assert_eq!(self.state, InstallState::Installed);

        if let Err(e) = self.fs.set_executable(&self.target) {
            warn!("Could not mark {} executable: {}", self.target.display(), e);
        }
        BackupReaper::spawn(self.fs, self.backup, grace)
    }
}

fn same_file(a: &Path, b: &Path) -> bool {
    if a == b {
        return true;
    }
    match (fs::canonicalize(a), fs::canonicalize(b)) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

/// Deletes the backup slot after the grace delay on a background thread.
#[derive(Debug)]
pub struct BackupReaper {
    handle: Option<JoinHandle<()>>,
}

impl BackupReaper {
    fn spawn<F: SwapFs + Send + 'static>(fs: F, backup: PathBuf, grace: Duration) -> Self {
        let spawned = thread::Builder::new().name("backup-reaper".into()).spawn(move || {
            thread::sleep(grace);
            if fs.exists(&backup) {
                match fs.remove_file(&backup) {
                    Ok(()) => debug!("Removed backup {}", backup.display()),
                    Err(e) => debug!("Could not remove backup {}: {}", backup.display(), e),
                }
            }
        });
        match spawned {
            Ok(handle) => Self {
                handle: Some(handle),
            },
            Err(e) => {
                debug!("Could not schedule backup removal: {}", e);
                Self {
                    handle: None,
                }
            }
        }
    }

    /// Block until the backup removal has run.
    pub fn wait(mut self) {
        self.join();
    }

    /// Like [`BackupReaper::wait`], for a reaper held inside another value.
    pub fn join(&mut self) {
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

/// Replace `target` with `staged` in one transaction.
///
/// # Errors
///
/// [`UpgradeError::Locked`] (nothing changed, hand off to the helper),
/// [`UpgradeError::Install`] (rolled back) or
/// [`UpgradeError::InconsistentState`].
pub fn install(staged: &Path, target: &Path, grace: Duration) -> Result<BackupReaper, UpgradeError> {
    install_with(RealFs, staged, target, grace)
}

/// [`install`] over an arbitrary [`SwapFs`].
///
/// # Errors
///
/// See [`install`].
pub fn install_with<F: SwapFs + Send + 'static>(
    fs: F,
    staged: &Path,
    target: &Path,
    grace: Duration,
) -> Result<BackupReaper, UpgradeError> {
    let mut tx = InstallTransaction::with_fs(fs, staged, target)?;
    tx.back_up()?;
    tx.swap()?;
    Ok(tx.finalize(grace))
}

/// Put the backup slot of `target` back in place.
///
/// # Errors
///
/// Fails with [`AskError::NoBackup`] when there is no backup, or with the
/// rename error when the target cannot be replaced (it is left as it was).
pub fn restore_backup(target: &Path) -> Result<()> {
    let fs = RealFs;
    let backup = backup_path(target);
    if !fs.exists(&backup) {
        return Err(AskError::NoBackup {
            path: backup.display().to_string(),
        }
        .into());
    }

    let mut discard = target.as_os_str().to_os_string();
    discard.push(".rollback");
    let discard = PathBuf::from(discard);

    let had_target = fs.exists(target);
    if had_target {
        fs.rename(target, &discard).map_err(|e| UpgradeError::Locked {
            target: target.to_path_buf(),
            reason: e.to_string(),
        })?;
    }

    if let Err(e) = fs.rename(&backup, target) {
        if had_target {
            let _ = fs.rename(&discard, target);
        }
        return Err(UpgradeError::Install {
            target: target.to_path_buf(),
            reason: format!("could not restore {}: {e}", backup.display()),
        }
        .into());
    }

    if had_target {
        if let Err(e) = fs.remove_file(&discard) {
            warn!("Could not remove {}: {}", discard.display(), e);
        }
    }
    info!("Restored {} from {}", target.display(), backup.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::{Arc, Mutex};
    use tempfile::TempDir;

    /// Real file system with renames that fail for chosen source paths.
    #[derive(Clone, Default)]
    struct FaultyFs {
        fail_rename_from: Arc<Mutex<HashSet<PathBuf>>>,
        fail_chmod: bool,
    }

    impl FaultyFs {
        fn failing(paths: &[&Path]) -> Self {
            let fs = Self::default();
            fs.fail_rename_from.lock().unwrap().extend(paths.iter().map(|p| p.to_path_buf()));
            fs
        }
    }

    impl SwapFs for FaultyFs {
        fn rename(&self, from: &Path, to: &Path) -> io::Result<()> {
            if self.fail_rename_from.lock().unwrap().contains(from) {
                return Err(io::Error::new(io::ErrorKind::PermissionDenied, "injected failure"));
            }
            RealFs.rename(from, to)
        }
        fn set_executable(&self, path: &Path) -> io::Result<()> {
            if self.fail_chmod {
                return Err(io::Error::other("injected chmod failure"));
            }
            RealFs.set_executable(path)
        }
        fn remove_file(&self, path: &Path) -> io::Result<()> {
            RealFs.remove_file(path)
        }
        fn exists(&self, path: &Path) -> bool {
            path.exists()
        }
    }

    struct Fixture {
        _temp: TempDir,
        target: PathBuf,
        staged: PathBuf,
        backup: PathBuf,
    }

    fn fixture() -> Fixture {
        let temp = TempDir::new().unwrap();
        let target = temp.path().join("ask");
        let staged = temp.path().join("ask-staged");
        fs::write(&target, b"old").unwrap();
        fs::write(&staged, b"new").unwrap();
        let backup = backup_path(&target);
        Fixture {
            _temp: temp,
            target,
            staged,
            backup,
        }
    }

    #[test]
    fn test_backup_path() {
        assert_eq!(backup_path(Path::new("/usr/bin/ask")), PathBuf::from("/usr/bin/ask.backup"));
        assert_eq!(backup_path(Path::new("C:/tools/ask.exe")), PathBuf::from("C:/tools/ask.exe.backup"));
    }

    #[test]
    fn test_successful_install() {
        let f = fixture();
        let reaper = install(&f.staged, &f.target, Duration::ZERO).unwrap();
        assert_eq!(fs::read(&f.target).unwrap(), b"new");
        assert!(!f.staged.exists());
        reaper.wait();
        assert!(!f.backup.exists());

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = fs::metadata(&f.target).unwrap().permissions().mode();
            assert_eq!(mode & 0o777, 0o755);
        }
    }

    #[test]
    fn test_backup_kept_during_grace() {
        let f = fixture();
        let reaper = install(&f.staged, &f.target, Duration::from_millis(300)).unwrap();
        assert_eq!(fs::read(&f.backup).unwrap(), b"old");
        reaper.wait();
        assert!(!f.backup.exists());
    }

    #[test]
    fn test_locked_target_leaves_everything() {
        let f = fixture();
        let err = install_with(FaultyFs::failing(&[f.target.as_path()]), &f.staged, &f.target, Duration::ZERO)
            .unwrap_err();
        assert!(matches!(err, UpgradeError::Locked { .. }));
        assert_eq!(fs::read(&f.target).unwrap(), b"old");
        assert_eq!(fs::read(&f.staged).unwrap(), b"new");
        assert!(!f.backup.exists());
    }

    #[test]
    fn test_swap_failure_rolls_back() {
        let f = fixture();
        let fs_impl = FaultyFs::failing(&[f.staged.as_path()]);
        let mut tx = InstallTransaction::with_fs(fs_impl, &f.staged, &f.target).unwrap();
        tx.back_up().unwrap();
        assert_eq!(tx.state(), InstallState::BackedUp);

        let err = tx.swap().unwrap_err();
        assert!(matches!(err, UpgradeError::Install { .. }));
        assert_eq!(tx.state(), InstallState::RolledBack);
        assert_eq!(fs::read(&f.target).unwrap(), b"old");
        assert_eq!(fs::read(&f.staged).unwrap(), b"new");
        assert!(!f.backup.exists());
    }

    #[test]
    fn test_failed_rollback_is_inconsistent() {
        let f = fixture();
        let fs_impl = FaultyFs::failing(&[f.staged.as_path(), f.backup.as_path()]);
        let err = install_with(fs_impl, &f.staged, &f.target, Duration::ZERO).unwrap_err();

        match err {
            UpgradeError::InconsistentState {
                ref target,
                ref backup,
                ..
            } => {
                assert_eq!(target, &f.target);
                assert_eq!(backup, &f.backup);
            }
            other => panic!("expected InconsistentState, got {other:?}"),
        }
        // The previous executable survives in the backup slot.
        assert_eq!(fs::read(&f.backup).unwrap(), b"old");
        assert!(!f.target.exists());
    }

    #[test]
    fn test_chmod_failure_is_not_fatal() {
        let f = fixture();
        let fs_impl = FaultyFs {
            fail_chmod: true,
            ..FaultyFs::default()
        };
        let reaper = install_with(fs_impl, &f.staged, &f.target, Duration::ZERO).unwrap();
        reaper.wait();
        assert_eq!(fs::read(&f.target).unwrap(), b"new");
    }

    #[test]
    fn test_stale_backup_is_replaced() {
        let f = fixture();
        fs::write(&f.backup, b"ancient").unwrap();
        let mut tx = InstallTransaction::new(&f.staged, &f.target).unwrap();
        tx.back_up().unwrap();
        assert_eq!(fs::read(&f.backup).unwrap(), b"old");
    }

    #[test]
    fn test_backup_is_never_removed_without_target() {
        let f = fixture();
        fs::remove_file(&f.target).unwrap();
        fs::write(&f.backup, b"only copy").unwrap();
        let mut tx = InstallTransaction::new(&f.staged, &f.target).unwrap();
        assert!(tx.back_up().is_err());
        assert_eq!(fs::read(&f.backup).unwrap(), b"only copy");
    }

    #[test]
    fn test_staged_equal_to_target_is_rejected() {
        let f = fixture();
        let err = install(&f.target, &f.target, Duration::ZERO).unwrap_err();
        assert!(matches!(err, UpgradeError::Install { .. }));
        assert_eq!(fs::read(&f.target).unwrap(), b"old");
    }

    #[test]
    fn test_restore_backup() {
        let f = fixture();
        fs::write(&f.backup, b"previous").unwrap();
        restore_backup(&f.target).unwrap();
        assert_eq!(fs::read(&f.target).unwrap(), b"previous");
        assert!(!f.backup.exists());
    }

    #[test]
    fn test_restore_without_backup() {
        let f = fixture();
        let err = restore_backup(&f.target).unwrap_err();
        assert!(err.to_string().contains("No backup found"));
        assert_eq!(fs::read(&f.target).unwrap(), b"old");
    }
}
