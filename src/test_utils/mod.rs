//! Test utilities for ask
//!
//! Helpers shared by unit tests and the integration suite (enable the
//! `test-utils` feature to use them from `tests/`):
//!
//! - [`init_test_logging`] - Route `tracing` output through the test writer
//! - [`TarballBuilder`] - Build `.tar.gz` bundles with chosen modes and entry types
//! - [`ReleaseBuilder`] - Build release metadata as the release API returns it
//! - [`SimulatedClock`] - A [`Clock`](crate::upgrade::waiter::Clock) whose sleeps advance instantly
//! - [`RecordingSleep`] - A resolver sleep that records delays without waiting
//!
//! # Example
//!
//! ```rust,no_run
//! use ask_cli::test_utils::{ReleaseBuilder, init_test_logging};
//!
//! init_test_logging(None);
//! let release = ReleaseBuilder::new("v1.3.0")
//!     .asset("ask_1.3.0_linux_amd64", "https://example.com/ask")
//!     .to_json();
//! assert_eq!(release["tag_name"], "v1.3.0");
//! ```

pub mod fixtures;
pub mod time;

pub use fixtures::{ReleaseBuilder, TarballBuilder};
pub use time::{RecordingSleep, SimulatedClock};

use std::sync::Once;
use tracing::Level;
use tracing_subscriber::EnvFilter;

/// Global flag to ensure logging is only initialized once in tests
static INIT_LOGGING: Once = Once::new();

/// Initialize logging for tests.
///
/// Initializes the tracing subscriber once per process, no matter how many
/// tests call it. Uses `level` when given, otherwise `RUST_LOG`; with
/// neither, logging stays off.
///
/// ```bash
/// RUST_LOG=ask_cli=debug cargo test
/// ```
pub fn init_test_logging(level: Option<Level>) {
    INIT_LOGGING.call_once(|| {
        let filter = if let Some(level) = level {
            EnvFilter::new(level.to_string())
        } else if std::env::var("RUST_LOG").is_ok() {
            EnvFilter::from_default_env()
        } else {
            return;
        };

        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .with_target(true)
            .with_thread_ids(false)
            .with_ansi(true)
            .try_init();
    });
}
