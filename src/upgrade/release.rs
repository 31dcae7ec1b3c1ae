//! Release metadata resolution against the GitHub Releases API.
//!
//! [`ReleaseResolver`] issues one metadata request per attempt and retries
//! with a bounded exponential backoff (2s, 4s, ...). A `403` is treated as
//! rate limiting: when the `X-RateLimit-Reset` header can be read, the next
//! wait is the time until the limit resets instead of the backoff default.
//!
//! The sleep between attempts is injectable so tests can observe the delays
//! without waiting for them.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use reqwest::StatusCode;
use reqwest::header::{ACCEPT, HeaderMap, HeaderValue};
use serde::{Deserialize, Deserializer};
use tracing::{debug, info, warn};

use crate::constants::{
    HTTP_REQUEST_TIMEOUT, RATE_LIMIT_RESET_HEADER, RELEASES_ACCEPT, RELEASES_API_BASE,
    RESOLVE_BACKOFF_BASE_MS, RESOLVE_BACKOFF_FACTOR, RESOLVE_MAX_ATTEMPTS,
};
use crate::upgrade::{BuildInfo, UpgradeError, is_newer};
use tokio_retry::strategy::ExponentialBackoff;

/// A published release as reported by the release feed.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ReleaseDescriptor {
    /// Release tag, e.g. `v1.3.0`
    #[serde(rename = "tag_name")]
    pub tag: String,
    /// Human readable title
    #[serde(rename = "name", default, deserialize_with = "null_as_empty")]
    pub title: String,
    /// Markdown release notes
    #[serde(default, deserialize_with = "null_as_empty")]
    pub body: String,
    /// Publication timestamp
    #[serde(default)]
    pub published_at: Option<DateTime<Utc>>,
    /// Downloadable files, in feed order
    #[serde(default)]
    pub assets: Vec<AssetDescriptor>,
}

/// A downloadable file attached to a release.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct AssetDescriptor {
    /// File name
    pub name: String,
    /// Direct download URL
    #[serde(rename = "browser_download_url")]
    pub url: String,
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

/// Result of comparing the latest release with the running build.
#[derive(Debug, Clone)]
pub struct UpdateCheck {
    /// Whether the release is strictly newer than the running version
    pub available: bool,
    /// The latest release
    pub release: ReleaseDescriptor,
}

/// Async sleep used between attempts.
pub type SleepFn = Arc<dyn Fn(Duration) -> BoxFuture<'static, ()> + Send + Sync>;

fn tokio_sleep() -> SleepFn {
    Arc::new(|delay| Box::pin(tokio::time::sleep(delay)))
}

/// Why a single metadata request failed.
#[derive(Debug, thiserror::Error)]
enum AttemptFailure {
    #[error("request failed: {0}")]
    Transport(String),
    #[error("rate limited (HTTP 403)")]
    RateLimited { reset_in: Option<Duration> },
    #[error("unexpected HTTP status {0}")]
    Status(StatusCode),
    #[error("malformed release metadata: {0}")]
    Malformed(String),
}

/// Fetches release metadata with retry, backoff and rate-limit handling.
#[derive(Clone)]
pub struct ReleaseResolver {
    client: reqwest::Client,
    build: BuildInfo,
    api_base: String,
    max_attempts: u32,
    sleep: SleepFn,
}

impl ReleaseResolver {
    /// Create a resolver for the project's release feed.
    ///
    /// # Errors
    ///
    /// Fails only if the HTTP client cannot be constructed (e.g. no TLS backend).
    pub fn new(build: BuildInfo) -> anyhow::Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static(RELEASES_ACCEPT));

        let client = reqwest::Client::builder()
            .user_agent(build.user_agent())
            .default_headers(headers)
            .timeout(HTTP_REQUEST_TIMEOUT)
            .build()
            .map_err(|e| anyhow::anyhow!("Failed to create HTTP client: {e}"))?;

        Ok(Self {
            client,
            build,
            api_base: RELEASES_API_BASE.to_string(),
            max_attempts: RESOLVE_MAX_ATTEMPTS,
            sleep: tokio_sleep(),
        })
    }

    /// Point the resolver at another releases endpoint (`.../releases`).
    #[must_use]
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into().trim_end_matches('/').to_string();
        self
    }

    /// Replace the sleep used between attempts.
    #[must_use]
    pub fn with_sleep(mut self, sleep: SleepFn) -> Self {
        self.sleep = sleep;
        self
    }

    /// Build information of the running binary.
    #[must_use]
    pub const fn build(&self) -> &BuildInfo {
        &self.build
    }

    /// The shared HTTP client, reused for asset downloads.
    #[must_use]
    pub const fn client(&self) -> &reqwest::Client {
        &self.client
    }

    /// Fetch the latest published release.
    ///
    /// # Errors
    ///
    /// Returns [`UpgradeError::Resolve`] with the attempt count and the last
    /// cause once every attempt has failed.
    pub async fn fetch_latest_release(&self) -> Result<ReleaseDescriptor, UpgradeError> {
        let url = format!("{}/latest", self.api_base);
        self.fetch_with_retry(&url).await
    }

    /// Fetch the release published under `tag`.
    ///
    /// # Errors
    ///
    /// Same as [`ReleaseResolver::fetch_latest_release`].
    pub async fn fetch_release(&self, tag: &str) -> Result<ReleaseDescriptor, UpgradeError> {
        let url = format!("{}/tags/{}", self.api_base, tag);
        self.fetch_with_retry(&url).await
    }

    /// Fetch the latest release and compare it with the running version.
    ///
    /// # Errors
    ///
    /// Propagates [`UpgradeError::Resolve`].
    pub async fn check_update(&self) -> Result<UpdateCheck, UpgradeError> {
        let release = self.fetch_latest_release().await?;
        let available = is_newer(&release.tag, &self.build.version);
        if available {
            info!("Update available: {} -> {}", self.build.tag(), release.tag);
        } else {
            debug!("{} is up to date (latest {})", self.build.tag(), release.tag);
        }
        Ok(UpdateCheck {
            available,
            release,
        })
    }

    async fn fetch_with_retry(&self, url: &str) -> Result<ReleaseDescriptor, UpgradeError> {
        let mut delays = retry_schedule(self.max_attempts);
        let mut attempt = 0;

        let failure = loop {
            attempt += 1;
            debug!("Fetching {} (attempt {}/{})", url, attempt, self.max_attempts);

            let failure = match self.fetch_once(url).await {
                Ok(release) => return Ok(release),
                Err(failure) => failure,
            };
            warn!("Release metadata attempt {} failed: {}", attempt, failure);

            let Some(scheduled) = delays.next() else {
                break failure;
            };
            let delay = match &failure {
                AttemptFailure::RateLimited {
                    reset_in: Some(reset_in),
                } => *reset_in,
                _ => scheduled,
            };
            debug!("Retrying in {:?}", delay);
            (self.sleep)(delay).await;
        };

        let reason = match failure {
            AttemptFailure::RateLimited { .. } => {
                "rate limited by the release API; try again after the limit resets".to_string()
            }
            failure => failure.to_string(),
        };
        Err(UpgradeError::Resolve {
            attempts: attempt,
            reason,
        })
    }

    async fn fetch_once(&self, url: &str) -> Result<ReleaseDescriptor, AttemptFailure> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| AttemptFailure::Transport(e.to_string()))?;

        let status = response.status();
        if status == StatusCode::FORBIDDEN {
            let reset_in = response
                .headers()
                .get(RATE_LIMIT_RESET_HEADER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| rate_limit_delay(v, Utc::now()));
            return Err(AttemptFailure::RateLimited {
                reset_in,
            });
        }
        if !status.is_success() {
            return Err(AttemptFailure::Status(status));
        }

        let body = response.text().await.map_err(|e| AttemptFailure::Transport(e.to_string()))?;
        serde_json::from_str(&body).map_err(|e| AttemptFailure::Malformed(e.to_string()))
    }
}

/// Waits between attempts: one fewer than `max_attempts`, doubling from 2s.
fn retry_schedule(max_attempts: u32) -> impl Iterator<Item = Duration> {
    ExponentialBackoff::from_millis(RESOLVE_BACKOFF_BASE_MS)
        .factor(RESOLVE_BACKOFF_FACTOR)
        .take(max_attempts.saturating_sub(1) as usize)
}

/// Time from `now` until the reset given by an `X-RateLimit-Reset` value.
///
/// Accepts Unix epoch seconds (what GitHub sends) and RFC 3339 timestamps.
/// A reset in the past yields a zero delay; an unreadable value yields `None`.
pub(crate) fn rate_limit_delay(value: &str, now: DateTime<Utc>) -> Option<Duration> {
    let value = value.trim();
    let reset = match value.parse::<i64>() {
        Ok(epoch) => DateTime::<Utc>::from_timestamp(epoch, 0)?,
        Err(_) => DateTime::parse_from_rfc3339(value).ok()?.with_timezone(&Utc),
    };
    Some((reset - now).to_std().unwrap_or(Duration::ZERO))
}
