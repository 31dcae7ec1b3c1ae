//! Lock-release waiting for the `ask_updater` helper.
//!
//! The helper is started by an `ask` process that could not move its own
//! executable aside. It polls the backup rename until the parent has exited
//! and released the file, then finishes the same transaction the installer
//! runs in-process and relaunches the new executable:
//!
//! ```text
//! WaitingForLock ──▶ BackedUp ──▶ Installed ──▶ Relaunched
//!       │                │             │
//!       ▼                ▼             ▼
//!   TimedOut           Failed        Failed (relaunch)
//! ```
//!
//! Waiting is single-threaded and driven by a [`Clock`], so tests can run
//! the whole budget in simulated time.

use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::constants::{DEFAULT_BACKUP_GRACE, DEFAULT_LOCK_POLL_INTERVAL, DEFAULT_LOCK_WAIT_BUDGET};
use crate::upgrade::UpgradeError;
use crate::upgrade::installer::{BackupReaper, InstallTransaction, RealFs, SwapFs};

/// Exit code for a usage error (wrong argument count).
pub const EXIT_USAGE: i32 = 64;

/// Time source for the wait loop.
pub trait Clock {
    /// Current instant.
    fn now(&self) -> Instant;
    /// Block for `duration`.
    fn sleep(&self, duration: Duration);
}

/// Wall-clock time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// States of the helper protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HelperState {
    /// Polling until the old executable can be moved aside
    WaitingForLock,
    /// The old executable sits in the backup slot
    BackedUp,
    /// The new executable is in place
    Installed,
    /// The new executable was started
    Relaunched,
    /// The lock was never released; nothing was changed
    TimedOut,
    /// The swap or the relaunch failed
    Failed,
}

/// How a helper run ended.
#[derive(Debug)]
pub enum HelperOutcome {
    /// Installed and relaunched
    Relaunched {
        /// Pending backup removal
        reaper: BackupReaper,
    },
    /// Installed, but the new executable could not be started
    RelaunchFailed {
        /// Pending backup removal
        reaper: BackupReaper,
        /// Installed executable the user should start by hand
        target: PathBuf,
        /// Spawn error
        reason: String,
    },
    /// Timed out, or the swap failed
    Failed(UpgradeError),
}

impl HelperOutcome {
    /// Terminal protocol state.
    #[must_use]
    pub const fn state(&self) -> HelperState {
        match self {
            Self::Relaunched { .. } => HelperState::Relaunched,
            Self::Failed(UpgradeError::TimedOut { .. }) => HelperState::TimedOut,
            Self::RelaunchFailed { .. } | Self::Failed(_) => HelperState::Failed,
        }
    }

    /// Process exit code: 0 success, 1 timeout or failure, 2 inconsistent state.
    #[must_use]
    pub const fn exit_code(&self) -> i32 {
        match self {
            Self::Relaunched { .. } => 0,
            Self::Failed(UpgradeError::InconsistentState { .. }) => 2,
            Self::RelaunchFailed { .. } | Self::Failed(_) => 1,
        }
    }

    /// Wait for the pending backup removal, if any.
    pub fn wait_for_cleanup(&mut self) {
        match self {
            Self::Relaunched { reaper } | Self::RelaunchFailed { reaper, .. } => reaper.join(),
            Self::Failed(_) => {}
        }
    }
}

/// Drives the helper protocol for one `(target, staged)` pair.
pub struct LockWaiter<C: Clock = SystemClock, F: SwapFs = RealFs> {
    clock: C,
    fs: F,
    poll_interval: Duration,
    budget: Duration,
    grace: Duration,
}

impl LockWaiter<SystemClock, RealFs> {
    /// Waiter on wall-clock time and the real file system, with default timing.
    #[must_use]
    pub fn new() -> Self {
        Self::with_parts(SystemClock, RealFs)
    }
}

impl Default for LockWaiter<SystemClock, RealFs> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: Clock, F: SwapFs + Clone + Send + 'static> LockWaiter<C, F> {
    /// Waiter with an explicit clock and file system.
    #[must_use]
    pub fn with_parts(clock: C, fs: F) -> Self {
        Self {
            clock,
            fs,
            poll_interval: DEFAULT_LOCK_POLL_INTERVAL,
            budget: DEFAULT_LOCK_WAIT_BUDGET,
            grace: DEFAULT_BACKUP_GRACE,
        }
    }

    /// Override the poll interval, wait budget and backup grace delay.
    #[must_use]
    pub fn with_timing(mut self, poll_interval: Duration, budget: Duration, grace: Duration) -> Self {
        self.poll_interval = poll_interval;
        self.budget = budget;
        self.grace = grace;
        self
    }

    /// Run the protocol to completion.
    ///
    /// `observe` is called on every state entered. `relaunch` starts the new
    /// executable and must not wait for it.
    pub fn run(
        &self,
        staged: &Path,
        target: &Path,
        mut observe: impl FnMut(HelperState),
        relaunch: impl FnOnce(&Path) -> io::Result<()>,
    ) -> HelperOutcome {
        let mut tx = match InstallTransaction::with_fs(self.fs.clone(), staged, target) {
            Ok(tx) => tx,
            Err(e) => {
                observe(HelperState::Failed);
                return HelperOutcome::Failed(e);
            }
        };

        observe(HelperState::WaitingForLock);
        let started = self.clock.now();
        let mut attempts = 0u32;
        loop {
            attempts += 1;
            match tx.back_up() {
                Ok(()) => break,
                Err(e) => {
                    let waited = self.clock.now().saturating_duration_since(started);
                    if waited >= self.budget {
                        warn!("Gave up after {} attempt(s): {}", attempts, e);
                        observe(HelperState::TimedOut);
                        return HelperOutcome::Failed(UpgradeError::TimedOut {
                            target: target.to_path_buf(),
                            waited_secs: waited.as_secs(),
                        });
                    }
                    debug!("{} still locked after {:?}: {}", target.display(), waited, e);
                    self.clock.sleep(self.poll_interval);
                }
            }
        }
        observe(HelperState::BackedUp);

        if let Err(e) = tx.swap() {
            observe(HelperState::Failed);
            return HelperOutcome::Failed(e);
        }
        observe(HelperState::Installed);

        let reaper = tx.finalize(self.grace);
        match relaunch(target) {
            Ok(()) => {
                info!("Relaunched {}", target.display());
                observe(HelperState::Relaunched);
                HelperOutcome::Relaunched {
                    reaper,
                }
            }
            Err(e) => {
                observe(HelperState::Failed);
                HelperOutcome::RelaunchFailed {
                    reaper,
                    target: target.to_path_buf(),
                    reason: e.to_string(),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::SimulatedClock;
    use std::fs;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;
    use tempfile::TempDir;

    /// Fails renames of `locked` until `unlock_after` attempts have been made.
    #[derive(Clone)]
    struct LockedFs {
        locked: PathBuf,
        attempts: Arc<AtomicU32>,
        unlock_after: u32,
    }

    impl SwapFs for LockedFs {
        fn rename(&self, from: &Path, to: &Path) -> io::Result<()> {
            if from == self.locked {
                let n = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
                if n <= self.unlock_after {
                    return Err(io::Error::new(io::ErrorKind::PermissionDenied, "file in use"));
                }
            }
            RealFs.rename(from, to)
        }
        fn set_executable(&self, path: &Path) -> io::Result<()> {
            RealFs.set_executable(path)
        }
        fn remove_file(&self, path: &Path) -> io::Result<()> {
            RealFs.remove_file(path)
        }
        fn exists(&self, path: &Path) -> bool {
            path.exists()
        }
    }

    fn setup() -> (TempDir, PathBuf, PathBuf) {
        let temp = TempDir::new().unwrap();
        let target = temp.path().join("ask");
        let staged = temp.path().join("ask-update-1");
        fs::write(&target, b"old").unwrap();
        fs::write(&staged, b"new").unwrap();
        (temp, target, staged)
    }

    fn locked_fs(target: &Path, unlock_after: u32) -> LockedFs {
        LockedFs {
            locked: target.to_path_buf(),
            attempts: Arc::new(AtomicU32::new(0)),
            unlock_after,
        }
    }

    #[test]
    fn test_installs_once_lock_is_released() {
        let (_temp, target, staged) = setup();
        let clock = SimulatedClock::new();
        let fs_impl = locked_fs(&target, 4);
        let waiter = LockWaiter::with_parts(clock.clone(), fs_impl.clone()).with_timing(
            Duration::from_millis(500),
            Duration::from_secs(30),
            Duration::ZERO,
        );

        let mut states = Vec::new();
        let mut relaunched = None;
        let mut outcome = waiter.run(
            &staged,
            &target,
            |s| states.push(s),
            |path| {
                relaunched = Some(path.to_path_buf());
                Ok(())
            },
        );

        assert_eq!(outcome.exit_code(), 0);
        assert_eq!(
            states,
            vec![
                HelperState::WaitingForLock,
                HelperState::BackedUp,
                HelperState::Installed,
                HelperState::Relaunched
            ]
        );
        assert_eq!(relaunched.as_deref(), Some(target.as_path()));
        assert_eq!(fs_impl.attempts.load(Ordering::SeqCst), 5);
        assert_eq!(clock.elapsed(), Duration::from_secs(2));
        assert_eq!(fs::read(&target).unwrap(), b"new");
        outcome.wait_for_cleanup();
        assert!(!crate::upgrade::installer::backup_path(&target).exists());
    }

    #[test]
    fn test_times_out_without_touching_target() {
        let (_temp, target, staged) = setup();
        let clock = SimulatedClock::new();
        let waiter = LockWaiter::with_parts(clock.clone(), locked_fs(&target, u32::MAX));

        let mut states = Vec::new();
        let outcome = waiter.run(&staged, &target, |s| states.push(s), |_| Ok(()));

        assert_eq!(outcome.state(), HelperState::TimedOut);
        assert_eq!(outcome.exit_code(), 1);
        assert!(matches!(outcome, HelperOutcome::Failed(UpgradeError::TimedOut { waited_secs: 30, .. })));
        assert_eq!(states, vec![HelperState::WaitingForLock, HelperState::TimedOut]);
        assert!(clock.elapsed() >= Duration::from_secs(30));
        assert!(clock.elapsed() <= Duration::from_secs(31));
        assert_eq!(fs::read(&target).unwrap(), b"old");
        assert_eq!(fs::read(&staged).unwrap(), b"new");
    }

    #[test]
    fn test_relaunch_failure_reports_target() {
        let (_temp, target, staged) = setup();
        let waiter = LockWaiter::with_parts(SimulatedClock::new(), RealFs).with_timing(
            Duration::from_millis(500),
            Duration::from_secs(30),
            Duration::ZERO,
        );

        let outcome = waiter.run(&staged, &target, |_| {}, |_| {
            Err(io::Error::new(io::ErrorKind::NotFound, "exec format error"))
        });

        assert_eq!(outcome.state(), HelperState::Failed);
        assert_eq!(outcome.exit_code(), 1);
        match &outcome {
            HelperOutcome::RelaunchFailed { target: t, reason, .. } => {
                assert_eq!(t, &target);
                assert!(reason.contains("exec format error"));
            }
            other => panic!("unexpected outcome {other:?}"),
        }
        assert_eq!(fs::read(&target).unwrap(), b"new");
    }

    #[test]
    fn test_swap_failure_after_backup() {
        let (_temp, target, staged) = setup();
        fs::remove_file(&staged).unwrap();
        let waiter = LockWaiter::with_parts(SimulatedClock::new(), RealFs);

        let mut states = Vec::new();
        let outcome = waiter.run(&staged, &target, |s| states.push(s), |_| Ok(()));

        assert!(matches!(outcome, HelperOutcome::Failed(UpgradeError::Install { .. })));
        assert_eq!(outcome.exit_code(), 1);
        assert_eq!(states.last(), Some(&HelperState::Failed));
        assert_eq!(fs::read(&target).unwrap(), b"old");
    }
}
