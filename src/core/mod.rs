//! Core types shared across ask.
//!
//! Currently this is the error layer: [`AskError`] for application failures,
//! [`ErrorContext`] for rendering errors to users, and [`user_friendly_error`]
//! which the CLI entry point uses to turn any `anyhow::Error` into readable
//! output with suggestions.

pub mod error;

pub use error::{AskError, ErrorContext, user_friendly_error};
