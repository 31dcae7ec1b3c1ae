//! Global constants used throughout the ask codebase.
//!
//! This module contains timeout durations, retry parameters, file naming
//! conventions and endpoint locations that are shared by the update engine,
//! the helper binary and the CLI. Defining them centrally makes the magic
//! numbers of the update protocol discoverable in one place.

use std::time::Duration;

/// Name of the main executable (without platform suffix).
pub const BINARY_NAME: &str = "ask";

/// Name of the helper executable that finishes a handed-off update.
pub const HELPER_BINARY_NAME: &str = "ask_updater";

/// Suffix appended to the live executable path to form the backup slot.
pub const BACKUP_SUFFIX: &str = ".backup";

/// Base URL of the release feed API for this project.
pub const RELEASES_API_BASE: &str = "https://api.github.com/repos/oAo-lab/Qwen-cli/releases";

/// Media type requested from the release feed API.
pub const RELEASES_ACCEPT: &str = "application/vnd.github.v3+json";

/// Header carrying the rate-limit reset time on a 403 response.
pub const RATE_LIMIT_RESET_HEADER: &str = "x-ratelimit-reset";

/// Maximum number of release metadata requests per resolve.
pub const RESOLVE_MAX_ATTEMPTS: u32 = 3;

/// Exponential backoff base between release metadata attempts, in milliseconds.
///
/// Combined with [`RESOLVE_BACKOFF_FACTOR`] the waits are 2s, 4s, 8s, ...
pub const RESOLVE_BACKOFF_BASE_MS: u64 = 2;

/// Multiplier applied to each backoff step.
pub const RESOLVE_BACKOFF_FACTOR: u64 = 1000;

/// Per-request timeout for release metadata requests.
pub const HTTP_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Extension of the archived bundle fallback.
pub const ARCHIVE_EXTENSION: &str = ".tar.gz";

/// Default grace delay before the backup of a replaced executable is deleted.
pub const DEFAULT_BACKUP_GRACE: Duration = Duration::from_secs(5);

/// Default interval between lock-release attempts in the helper.
pub const DEFAULT_LOCK_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Default wall-clock budget the helper waits for the lock to clear.
pub const DEFAULT_LOCK_WAIT_BUDGET: Duration = Duration::from_secs(30);

/// Default interval between background update checks (24 hours).
pub const DEFAULT_CHECK_INTERVAL_SECS: u64 = 86_400;

/// Environment variable that disables progress bars when set.
pub const NO_PROGRESS_ENV: &str = "ASK_NO_PROGRESS";

/// Environment variable overriding the config file location.
pub const CONFIG_PATH_ENV: &str = "ASK_CONFIG";

/// Environment variable overriding the chat API URL.
pub const API_URL_ENV: &str = "ASK_API_URL";

/// Environment variable overriding the chat API key.
pub const API_KEY_ENV: &str = "ASK_API_KEY";

/// Returns the platform-specific file name of an executable.
///
/// Appends `.exe` on Windows and leaves the name untouched elsewhere.
#[must_use]
pub fn executable_file_name(name: &str) -> String {
    if cfg!(windows) { format!("{name}.exe") } else { name.to_string() }
}
