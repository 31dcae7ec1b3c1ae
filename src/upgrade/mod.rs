//! Self-update engine for the `ask` binary.
//!
//! This module replaces the running executable with a newer release from
//! GitHub Releases. A running executable may be locked by the operating
//! system (Windows refuses to move it), so an update is either completed
//! in-process or handed to the `ask_updater` helper once `ask` has exited.
//!
//! # Architecture Overview
//!
//! Leaf-first:
//!
//! - [`version`]: [`BuildInfo`] and the dotted-numeric comparator [`is_newer`]
//! - [`release`]: [`ReleaseResolver`], release metadata with retry and
//!   rate-limit handling
//! - [`assets`]: [`PlatformKey`] and [`select_asset`]
//! - [`download`] and [`archive`]: staging of the selected asset
//! - [`installer`]: the backup/swap/rollback transaction
//! - [`waiter`]: the helper's lock-release state machine
//! - [`handoff`]: starting the helper from a locked `ask`
//! - [`self_updater`]: [`SelfUpdater`], the orchestration of all of the above
//! - [`version_check`]: cached startup update notices
//!
//! ## Update Process Flow
//!
//! ```text
//! 1. Resolve
//!    └── GET releases/latest (3 attempts, 2s/4s backoff, 403 waits for reset)
//!
//! 2. Compare
//!    └── is_newer(release.tag, running version)
//!
//! 3. Stage
//!    ├── Pick <bin>_<ver>_<os>_<arch>[.exe], else a matching .tar.gz
//!    ├── Download to a scratch directory
//!    └── Extract the executable when an archive was picked
//!
//! 4. Install
//!    ├── target ──▶ target.backup          (fails: locked, go to 5)
//!    ├── staged ──▶ target                 (fails: restore backup)
//!    ├── chmod 0755
//!    └── remove target.backup after the grace delay
//!
//! 5. Hand off (locked executable only)
//!    ├── Find or download ask_updater
//!    ├── Move the staged binary to <tmp>/ask-update-<uuid>
//!    ├── Start ask_updater <target> <staged>, exit 0
//!    └── Helper retries step 4 every 500ms for up to 30s, then relaunches
//! ```
//!
//! # Error Handling
//!
//! Every stage reports an [`UpgradeError`]. Only the install stage can
//! change the executable, and it restores the backup on failure; when the
//! restore itself fails the error is [`UpgradeError::InconsistentState`] and
//! names the backup path for manual recovery.
//!
//! # Module Structure
//!
//! - [`error`] - The [`UpgradeError`] taxonomy
//! - [`config`] - [`config::UpgradeConfig`] settings
//! - `tests` - Cross-module tests of the pipeline

pub mod archive;
pub mod assets;
pub mod config;
pub mod download;
pub mod error;
pub mod handoff;
pub mod installer;
pub mod release;
pub mod self_updater;
pub mod version;
pub mod version_check;
pub mod waiter;


pub use assets::{AssetKind, PlatformKey, SelectedAsset, select_asset};
pub use error::UpgradeError;
pub use installer::{BackupReaper, InstallTransaction, backup_path, install, restore_backup};
pub use release::{AssetDescriptor, ReleaseDescriptor, ReleaseResolver, UpdateCheck};
pub use self_updater::{SelfUpdater, StagedBinary, UpdateOutcome};
pub use version::{BuildInfo, VersionNumber, is_newer};
pub use version_check::VersionChecker;
