//! Shared utilities
//!
//! - [`progress`] - Progress bars and spinners for downloads and waits

pub mod progress;

pub use progress::{ProgressBar, is_progress_disabled};
