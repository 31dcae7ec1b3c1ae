//! Error handling for ask
//!
//! This module provides the application-level error type and user-friendly
//! error reporting for the CLI. The error system follows two principles:
//! 1. **Strongly-typed errors** for precise handling in code ([`AskError`],
//!    plus [`UpgradeError`](crate::upgrade::UpgradeError) for the update engine)
//! 2. **User-friendly messages** with actionable suggestions for CLI users
//!    ([`ErrorContext`])
//!
//! Use [`user_friendly_error`] at the top of the CLI to turn any
//! `anyhow::Error` into an [`ErrorContext`] ready for display.
//!
//! # Examples
//!
//! ```rust,no_run
//! use ask_cli::core::{AskError, ErrorContext};
//!
//! let context = ErrorContext::new(AskError::ApiKeyMissing)
//!     .with_suggestion("Set ASK_API_KEY or run 'ask init' and edit the config file");
//! context.display();
//! ```

use crate::upgrade::UpgradeError;
use colored::Colorize;
use std::fmt;
use thiserror::Error;

/// The main error type for ask operations outside the update engine.
#[derive(Error, Debug, Clone)]
pub enum AskError {
    /// The configuration file could not be parsed.
    #[error("Invalid configuration file {path}: {reason}")]
    ConfigParseError {
        /// Path of the config file
        path: String,
        /// Parser message
        reason: String,
    },

    /// `ask init` was run while a configuration file already exists.
    #[error("Configuration file already exists at {path}")]
    ConfigAlreadyExists {
        /// Path of the existing config file
        path: String,
    },

    /// No API key is configured for the chat endpoint.
    #[error("No API key configured")]
    ApiKeyMissing,

    /// The requested model alias is not defined in the configuration.
    #[error("Unknown model '{name}'")]
    UnknownModel {
        /// Alias that was requested
        name: String,
    },

    /// The chat endpoint answered with a non-success status.
    #[error("API error (status {status}): {body}")]
    ApiError {
        /// HTTP status code
        status: u16,
        /// Response body as returned by the server
        body: String,
    },

    /// A network operation failed.
    #[error("Network error during {operation}: {reason}")]
    NetworkError {
        /// What was being attempted
        operation: String,
        /// Underlying cause
        reason: String,
    },

    /// No backup exists to roll back to.
    #[error("No backup found at {path}")]
    NoBackup {
        /// Expected backup location
        path: String,
    },

    /// Anything else.
    #[error("{message}")]
    Other {
        /// Error message
        message: String,
    },
}

/// An error paired with optional details and a suggestion for the user.
#[derive(Debug)]
pub struct ErrorContext {
    /// The error message shown first
    pub message: String,
    /// Optional suggestion for resolving the error
    pub suggestion: Option<String>,
    /// Optional additional details about the error
    pub details: Option<String>,
}

impl ErrorContext {
    /// Create a new error context from any displayable error.
    pub fn new(error: impl fmt::Display) -> Self {
        Self {
            message: error.to_string(),
            suggestion: None,
            details: None,
        }
    }

    /// Add a suggestion for resolving the error.
    ///
    /// Suggestions are displayed in green to draw attention.
    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }

    /// Add additional details explaining the error.
    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    /// Print the error context to stderr with terminal colors.
    ///
    /// - Error message: red and bold
    /// - Details: yellow
    /// - Suggestion: green
    pub fn display(&self) {
        eprintln!("{}: {}", "error".red().bold(), self.message);

        if let Some(details) = &self.details {
            eprintln!("{}: {}", "details".yellow(), details);
        }

        if let Some(suggestion) = &self.suggestion {
            eprintln!("{}: {}", "suggestion".green(), suggestion);
        }
    }
}

impl fmt::Display for ErrorContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)?;

        if let Some(details) = &self.details {
            write!(f, "\nDetails: {details}")?;
        }

        if let Some(suggestion) = &self.suggestion {
            write!(f, "\nSuggestion: {suggestion}")?;
        }

        Ok(())
    }
}

/// Convert any error into an [`ErrorContext`] with suggestions.
///
/// Walks the error chain looking for [`UpgradeError`] and [`AskError`] so
/// that errors wrapped with `anyhow::Context` still get tailored advice.
/// The outermost message is kept as the headline; the typed error supplies
/// details and suggestion.
#[must_use]
pub fn user_friendly_error(error: anyhow::Error) -> ErrorContext {
    let headline = format!("{error:#}");

    for cause in error.chain() {
        if let Some(upgrade_error) = cause.downcast_ref::<UpgradeError>() {
            return upgrade_error_context(headline, upgrade_error);
        }
        if let Some(ask_error) = cause.downcast_ref::<AskError>() {
            return ask_error_context(headline, ask_error);
        }
        let denied = cause
            .downcast_ref::<std::io::Error>()
            .is_some_and(|e| e.kind() == std::io::ErrorKind::PermissionDenied);
        if denied {
            return ErrorContext::new(headline)
                .with_suggestion("Check file ownership or re-run with elevated permissions");
        }
    }

    ErrorContext::new(headline)
}

fn upgrade_error_context(headline: String, error: &UpgradeError) -> ErrorContext {
    let ctx = ErrorContext::new(headline);
    match error {
        UpgradeError::Resolve { .. } => ctx
            .with_details("The release feed could not be reached or returned an unexpected response")
            .with_suggestion("Check your network connection and try again in a few minutes"),
        UpgradeError::NotFound { os, arch, .. } => ctx
            .with_details(format!("No executable or archive matching {os}/{arch} was published"))
            .with_suggestion("Download a build for your platform manually from the releases page"),
        UpgradeError::Download { .. } => ctx
            .with_details("Your current installation was not modified")
            .with_suggestion("Retry 'ask update' once the network is stable"),
        UpgradeError::Extract { .. } => ctx
            .with_details("The downloaded bundle is damaged or has an unexpected layout")
            .with_suggestion("Retry the update; report the release if the problem persists"),
        UpgradeError::Locked { .. } => ctx
            .with_suggestion("Close other running copies of ask and run 'ask update' again"),
        UpgradeError::Install { .. } => ctx
            .with_details("The previous version was restored")
            .with_suggestion("Make sure you can write to the installation directory"),
        UpgradeError::TimedOut { target, .. } => ctx.with_suggestion(format!(
            "Close every program using {} and run 'ask update' again",
            target.display()
        )),
        UpgradeError::InconsistentState { target, backup, .. } => ctx
            .with_details("Automatic rollback failed; the update was not retried")
            .with_suggestion(format!(
                "Move {} back to {} by hand, or run 'ask update --rollback'",
                backup.display(),
                target.display()
            )),
    }
}

fn ask_error_context(headline: String, error: &AskError) -> ErrorContext {
    let ctx = ErrorContext::new(headline);
    match error {
        AskError::ConfigParseError { .. } => {
            ctx.with_suggestion("Fix the JSON syntax or delete the file and run 'ask init'")
        }
        AskError::ConfigAlreadyExists { .. } => {
            ctx.with_suggestion("Edit the existing file or remove it before running 'ask init'")
        }
        AskError::ApiKeyMissing => ctx
            .with_suggestion("Set ASK_API_KEY or add \"api_key\" to the configuration file"),
        AskError::UnknownModel { .. } => {
            ctx.with_suggestion("Run 'ask config' to list the configured models")
        }
        AskError::ApiError { status, .. } if *status == 401 || *status == 403 => {
            ctx.with_suggestion("Check that your API key is valid")
        }
        AskError::NetworkError { .. } => {
            ctx.with_suggestion("Check your network connection and the configured api_url")
        }
        AskError::NoBackup { .. } => {
            ctx.with_details("Backups only exist briefly after an update")
        }
        _ => ctx,
    }
}
