//! Error taxonomy of the self-update engine.
//!
//! Every stage of an update reports failures through [`UpgradeError`]. The
//! variants map one-to-one onto how a caller must react:
//!
//! | Variant               | Executable state       | Caller reaction                        |
//! |-----------------------|------------------------|----------------------------------------|
//! | `Resolve`             | untouched              | report, user may retry later           |
//! | `NotFound`            | untouched              | report, never retry                    |
//! | `Download`            | untouched              | report, user may retry later           |
//! | `Extract`             | untouched              | report                                 |
//! | `Locked`              | untouched              | hand the swap off to the helper        |
//! | `Install`             | restored from backup   | report                                 |
//! | `TimedOut`            | untouched              | report with manual instructions        |
//! | `InconsistentState`   | needs manual recovery  | report verbatim, never retry           |

use std::path::PathBuf;
use thiserror::Error;

/// Failure of one step of the update pipeline.
#[derive(Error, Debug)]
pub enum UpgradeError {
    /// Release metadata could not be fetched or parsed after all retries.
    #[error("Failed to resolve release metadata after {attempts} attempt(s): {reason}")]
    Resolve {
        /// Number of requests issued before giving up
        attempts: u32,
        /// Last underlying cause
        reason: String,
    },

    /// The release ships no build for this platform.
    #[error("Release {tag} has no build for {os}/{arch}")]
    NotFound {
        /// Release tag that was searched
        tag: String,
        /// Operating-system token
        os: String,
        /// Architecture token
        arch: String,
    },

    /// The selected asset could not be downloaded.
    #[error("Failed to download {url}: {reason}")]
    Download {
        /// Asset URL
        url: String,
        /// Underlying cause
        reason: String,
    },

    /// The archive could not be unpacked or does not contain the binary.
    #[error("Failed to extract update bundle {}: {reason}", archive.display())]
    Extract {
        /// Archive being extracted
        archive: PathBuf,
        /// Underlying cause
        reason: String,
    },

    /// The live executable cannot be moved aside because it is in use.
    #[error("Executable {} is locked: {reason}", target.display())]
    Locked {
        /// Live executable path
        target: PathBuf,
        /// OS error reported by the rename
        reason: String,
    },

    /// The staged executable could not be moved into place; the original was restored.
    #[error("Failed to install update to {}: {reason}", target.display())]
    Install {
        /// Live executable path
        target: PathBuf,
        /// Underlying cause
        reason: String,
    },

    /// The running executable never released its lock within the wait budget.
    #[error(
        "Timed out after {waited_secs}s waiting for {} to be released; close the program manually and run the update again",
        target.display()
    )]
    TimedOut {
        /// Live executable path
        target: PathBuf,
        /// Seconds spent waiting
        waited_secs: u64,
    },

    /// Both the swap and its rollback failed; manual recovery is required.
    #[error(
        "Update left {} in an inconsistent state: {reason}. The previous executable is preserved at {}; rename it back to {} to recover",
        target.display(),
        backup.display(),
        target.display()
    )]
    InconsistentState {
        /// Live executable path
        target: PathBuf,
        /// Backup slot holding the previous executable
        backup: PathBuf,
        /// Failures of the swap and the rollback
        reason: String,
    },
}

impl UpgradeError {
    /// Whether the pre-update executable is guaranteed to be untouched.
    #[must_use]
    pub const fn leaves_executable_untouched(&self) -> bool {
        matches!(
            self,
            Self::Resolve { .. }
                | Self::NotFound { .. }
                | Self::Download { .. }
                | Self::Extract { .. }
                | Self::Locked { .. }
                | Self::TimedOut { .. }
        )
    }

    /// Whether the user has to finish the update by hand.
    #[must_use]
    pub const fn requires_manual_recovery(&self) -> bool {
        matches!(self, Self::TimedOut { .. } | Self::InconsistentState { .. })
    }
}
