use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::constants::{
    DEFAULT_BACKUP_GRACE, DEFAULT_CHECK_INTERVAL_SECS, DEFAULT_LOCK_POLL_INTERVAL,
    DEFAULT_LOCK_WAIT_BUDGET,
};

/// Settings that control update checks and the replacement of the executable.
///
/// Stored under the `upgrade` key of `config.json`. Every field is optional
/// in the file and falls back to its default.
///
/// # Default Behavior
///
/// - No update check on startup (avoids a network round trip per invocation)
/// - 24-hour interval between background checks when enabled
/// - The previous executable is kept for 5 seconds after a swap
/// - The helper waits up to 30 seconds for the old process to exit, polling
///   every 500 milliseconds
///
/// # Examples
///
/// ```rust,no_run
/// use ask_cli::upgrade::config::UpgradeConfig;
///
/// let config = UpgradeConfig::default();
/// assert!(!config.check_on_startup);
/// assert_eq!(config.check_interval, 86_400);
/// ```
///
/// ## JSON Example
/// ```json
/// {
///   "upgrade": {
///     "check_on_startup": true,
///     "check_interval": 3600,
///     "backup_grace_secs": 5
///   }
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpgradeConfig {
    /// Whether to look for a newer release when `ask` starts.
    ///
    /// The check runs at most once per [`check_interval`](Self::check_interval)
    /// and its result is cached, so enabling it costs one request per day by
    /// default. `ask update --check` always checks regardless of this flag.
    #[serde(default)]
    pub check_on_startup: bool,

    /// Seconds between startup checks. `0` checks on every start.
    #[serde(default = "default_check_interval")]
    pub check_interval: u64,

    /// Seconds the previous executable is kept after a successful swap.
    #[serde(default = "default_backup_grace_secs")]
    pub backup_grace_secs: u64,

    /// Seconds the helper waits for the old process to release the executable.
    #[serde(default = "default_lock_wait_secs")]
    pub lock_wait_secs: u64,

    /// Milliseconds between lock-release attempts.
    #[serde(default = "default_lock_poll_millis")]
    pub lock_poll_millis: u64,
}

impl Default for UpgradeConfig {
    fn default() -> Self {
        Self {
            check_on_startup: false,
            check_interval: default_check_interval(),
            backup_grace_secs: default_backup_grace_secs(),
            lock_wait_secs: default_lock_wait_secs(),
            lock_poll_millis: default_lock_poll_millis(),
        }
    }
}

impl UpgradeConfig {
    /// Grace delay before the backup is deleted.
    #[must_use]
    pub const fn backup_grace(&self) -> Duration {
        Duration::from_secs(self.backup_grace_secs)
    }

    /// Total time the helper waits for the lock.
    #[must_use]
    pub const fn lock_wait(&self) -> Duration {
        Duration::from_secs(self.lock_wait_secs)
    }

    /// Interval between lock-release attempts, never below 10ms.
    #[must_use]
    pub fn lock_poll(&self) -> Duration {
        Duration::from_millis(self.lock_poll_millis.max(10))
    }
}

const fn default_check_interval() -> u64 {
    DEFAULT_CHECK_INTERVAL_SECS
}

const fn default_backup_grace_secs() -> u64 {
    DEFAULT_BACKUP_GRACE.as_secs()
}

const fn default_lock_wait_secs() -> u64 {
    DEFAULT_LOCK_WAIT_BUDGET.as_secs()
}

const fn default_lock_poll_millis() -> u64 {
    DEFAULT_LOCK_POLL_INTERVAL.as_millis() as u64
}
