//! Integration test suite for ask
//!
//! End-to-end tests that drive the public API against a mock release feed
//! and run the built `ask` and `ask_updater` binaries.
//!
//! # Running Integration Tests
//!
//! ```bash
//! cargo test --test integration
//! ```
//!
//! # Test Organization
//!
//! - **cli**: `ask` subcommands through the real binary
//! - **helper**: the `ask_updater` handoff protocol through the real binary
//! - **self_update**: the update pipeline against a `wiremock` release feed

mod cli;
mod helper;
mod self_update;
