//! ask - a command-line assistant with transactional self-update
//!
//! `ask` streams answers from an OpenAI-compatible chat-completion endpoint
//! and can replace its own executable with a newer GitHub release.
//!
//! # Architecture Overview
//!
//! The interesting part of the crate is the self-update engine in
//! [`upgrade`]. An update resolves the latest release, picks the asset for
//! the running platform, stages it in a scratch directory and swaps it in
//! with a backup/rollback transaction. When the running executable is locked
//! by the operating system, the swap is handed to the `ask_updater` helper,
//! which waits for `ask` to exit and finishes the job.
//!
//! # Core Modules
//!
//! - [`upgrade`] - Release resolution, asset selection, staging, installation and handoff
//! - [`client`] - Streaming chat-completion client
//! - [`cli`] - Command-line interface
//! - [`config`] - `config.json` loading, defaults and env overrides
//! - [`core`] - Application error type and user-facing error reporting
//! - [`constants`] - Timeouts, retry parameters and file naming
//! - [`utils`] - Progress indicators
//!
//! # Binaries
//!
//! - `ask` - The assistant itself
//! - `ask_updater <target> <staged>` - Completes a handed-off update
//!
//! # Example
//!
//! ```rust,no_run
//! use ask_cli::upgrade::{BuildInfo, ReleaseResolver};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let resolver = ReleaseResolver::new(BuildInfo::current())?;
//! let check = resolver.check_update().await?;
//! if check.available {
//!     println!("{} is available", check.release.tag);
//! }
//! # Ok(())
//! # }
//! ```

pub mod cli;
pub mod client;
pub mod config;
pub mod constants;
pub mod core;
pub mod upgrade;
pub mod utils;

// test_utils module is available for both unit tests and integration tests
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
