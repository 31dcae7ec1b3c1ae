//! Cached background update notices.
//!
//! When `upgrade.check_on_startup` is enabled, `ask` asks the release feed
//! at most once per `check_interval` and remembers the answer in a small JSON
//! file next to the configuration. A notice is shown the first time a newer
//! release is seen and then again with growing gaps (24h, 48h, 96h, 192h).

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info};

use crate::upgrade::config::UpgradeConfig;
use crate::upgrade::{ReleaseResolver, is_newer};

/// File name of the cache inside the configuration directory.
pub const VERSION_CACHE_FILE: &str = ".version_cache";

/// Result of the last update check.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VersionCheckCache {
    /// Latest release tag seen
    pub latest_version: String,
    /// Version that was running when the check happened
    pub current_version: String,
    /// When the release feed was last asked
    pub checked_at: DateTime<Utc>,
    /// Whether `latest_version` is newer than `current_version`
    pub update_available: bool,
    /// Whether a notice has been shown for `latest_version`
    pub notified: bool,
    /// How many notices have been shown for `latest_version`
    #[serde(default)]
    pub notification_count: u32,
}

impl VersionCheckCache {
    /// A fresh cache entry stamped with the current time.
    pub fn new(current_version: String, latest_version: String) -> Self {
        Self {
            update_available: is_newer(&latest_version, &current_version),
            latest_version,
            current_version,
            checked_at: Utc::now(),
            notified: false,
            notification_count: 0,
        }
    }

    /// Whether the entry is younger than `interval_seconds`.
    pub fn is_valid(&self, interval_seconds: u64) -> bool {
        let age = Utc::now() - self.checked_at;
        age.num_seconds() < i64::try_from(interval_seconds).unwrap_or(i64::MAX)
    }

    /// Record that a notice was shown.
    pub fn mark_notified(&mut self) {
        self.notified = true;
        self.notification_count += 1;
    }

    /// Whether a (repeat) notice is due.
    pub fn should_notify(&self) -> bool {
        if !self.update_available {
            return false;
        }
        if !self.notified {
            return true;
        }
        let hours_since_check = (Utc::now() - self.checked_at).num_hours();
        let backoff_hours = 24 * (1i64 << self.notification_count.min(3));
        hours_since_check >= backoff_hours
    }
}

/// Startup update checks backed by [`VersionCheckCache`].
pub struct VersionChecker {
    cache_path: PathBuf,
    resolver: ReleaseResolver,
    config: UpgradeConfig,
}

impl VersionChecker {
    /// Checker storing its cache in `cache_dir`.
    pub fn new(resolver: ReleaseResolver, config: UpgradeConfig, cache_dir: &Path) -> Self {
        Self {
            cache_path: cache_dir.join(VERSION_CACHE_FILE),
            resolver,
            config,
        }
    }

    fn current_version(&self) -> &str {
        &self.resolver.build().version
    }

    /// Check for a newer release if startup checks are enabled and the
    /// cache has expired. Returns the tag to announce, if any.
    ///
    /// Network failures are logged and swallowed; a startup notice must never
    /// fail the command the user actually ran.
    pub async fn check_for_updates_if_needed(&self) -> Result<Option<String>> {
        if !self.config.check_on_startup {
            debug!("Startup update checks are disabled");
            return Ok(None);
        }

        let mut cache = self.load_cache().await?;
        let should_check = match &cache {
            None => true,
            Some(c) => {
                !c.is_valid(self.config.check_interval) || c.current_version != self.current_version()
            }
        };

        if should_check {
            debug!("Performing automatic update check");
            let check = match self.resolver.check_update().await {
                Ok(check) => check,
                Err(e) => {
                    debug!("Update check failed: {}", e);
                    return Ok(None);
                }
            };

            let mut fresh =
                VersionCheckCache::new(self.current_version().to_string(), check.release.tag.clone());
            let announce = check.available
                && match &cache {
                    None => true,
                    Some(old) => old.latest_version != check.release.tag || !old.notified,
                };

            if announce {
                fresh.mark_notified();
            } else if let Some(old) =
                cache.as_ref().filter(|old| old.latest_version == fresh.latest_version)
            {
                fresh.notified = old.notified;
                fresh.notification_count = old.notification_count;
            }
            self.save_cache(&fresh).await?;

            if announce {
                info!("Update available: {} -> {}", self.current_version(), check.release.tag);
                return Ok(Some(check.release.tag));
            }
        } else if let Some(c) = cache.as_mut() {
            if c.should_notify() {
                c.mark_notified();
                self.save_cache(c).await?;
                info!("Update available (reminder): {} -> {}", c.current_version, c.latest_version);
                return Ok(Some(c.latest_version.clone()));
            }
        }

        Ok(None)
    }

    async fn load_cache(&self) -> Result<Option<VersionCheckCache>> {
        if !self.cache_path.exists() {
            debug!("No version cache found");
            return Ok(None);
        }

        let content =
            fs::read_to_string(&self.cache_path).await.context("Failed to read version cache")?;
        match serde_json::from_str(&content) {
            Ok(cache) => Ok(Some(cache)),
            Err(e) => {
                debug!("Ignoring unreadable version cache: {}", e);
                Ok(None)
            }
        }
    }

    async fn save_cache(&self, cache: &VersionCheckCache) -> Result<()> {
        let content =
            serde_json::to_string_pretty(cache).context("Failed to serialize version cache")?;

        if let Some(parent) = self.cache_path.parent() {
            fs::create_dir_all(parent).await.context("Failed to create cache directory")?;
        }
        fs::write(&self.cache_path, content).await.context("Failed to write version cache")?;

        debug!("Saved version check to cache");
        Ok(())
    }

    /// Remove the cache file.
    pub async fn clear_cache(&self) -> Result<()> {
        if self.cache_path.exists() {
            fs::remove_file(&self.cache_path).await.context("Failed to remove version cache")?;
            debug!("Cleared version cache");
        }
        Ok(())
    }

    /// Print the update notice to stderr.
    pub fn display_update_notification(current: &str, latest: &str) {
        use colored::Colorize;

        let rule = "━".repeat(52);
        eprintln!();
        eprintln!("{}", rule.bright_cyan());
        eprintln!("{} A new version of ask is available!", "📦".bright_cyan());
        eprintln!();
        eprintln!("  Current version: {}", current.yellow());
        eprintln!("  Latest version:  {}", latest.green().bold());
        eprintln!();
        eprintln!("  Run {} to upgrade", "ask update".cyan().bold());
        eprintln!();
        eprintln!("  To disable these checks, set {} in config.json", "upgrade.check_on_startup = false".dimmed());
        eprintln!("{}", rule.bright_cyan());
        eprintln!();
    }
}
