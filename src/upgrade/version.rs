//! Build information and version comparison.
//!
//! Release tags are compared as dotted sequences of non-negative integers
//! rather than strict semantic versions: the release feed has historically
//! used tags such as `v0.1.22`, and a malformed tag must never abort an
//! update check. Any segment that does not start with a digit counts as `0`.

use serde::Serialize;
use std::cmp::Ordering;
use std::fmt;

use crate::upgrade::PlatformKey;

/// Immutable description of the running build.
///
/// Constructed once at process start with [`BuildInfo::current`] and passed
/// explicitly to the resolver (for the `User-Agent`) and the comparator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BuildInfo {
    /// Package version, without a `v` prefix (e.g. `0.1.0`)
    pub version: String,
    /// Build date injected via `ASK_BUILD_DATE`, or `unknown`
    pub build_date: String,
    /// Git commit injected via `ASK_GIT_COMMIT`, or `unknown`
    pub commit: String,
    /// Platform the binary was compiled for
    pub platform: PlatformKey,
}

impl BuildInfo {
    /// Build information for the running binary.
    #[must_use]
    pub fn current() -> Self {
        Self {
            version: env!("CARGO_PKG_VERSION").to_string(),
            build_date: option_env!("ASK_BUILD_DATE").unwrap_or("unknown").to_string(),
            commit: option_env!("ASK_GIT_COMMIT").unwrap_or("unknown").to_string(),
            platform: PlatformKey::current(),
        }
    }

    /// Build information with an explicit version, for tests and tooling.
    #[must_use]
    pub fn with_version(version: impl Into<String>) -> Self {
        Self {
            version: version.into().trim_start_matches(['v', 'V']).to_string(),
            ..Self::current()
        }
    }

    /// Release tag corresponding to this version (`v` + version).
    #[must_use]
    pub fn tag(&self) -> String {
        format!("v{}", self.version)
    }

    /// Value for the `User-Agent` header of outgoing requests.
    #[must_use]
    pub fn user_agent(&self) -> String {
        format!("ask/{}", self.version)
    }

    /// Multi-line description used by `ask version`.
    #[must_use]
    pub fn long_version(&self) -> String {
        format!(
            "ask {}\nBuild date: {}\nGit commit: {}\nPlatform:   {}/{}",
            self.tag(),
            self.build_date,
            self.commit,
            self.platform.os,
            self.platform.arch
        )
    }
}

/// A dotted version such as `1.2.9`, compared component-wise.
#[derive(Debug, Clone, Eq)]
pub struct VersionNumber(Vec<u64>);

impl VersionNumber {
    /// Parse a version string, stripping a leading `v`.
    ///
    /// Never fails: unparseable segments become `0`, so `"1.x.3"` parses as
    /// `1.0.3` and `"garbage"` as `0`.
    #[must_use]
    pub fn parse(input: &str) -> Self {
        let trimmed = input.trim().trim_start_matches(['v', 'V']);
        let components = trimmed.split('.').map(parse_segment).collect();
        Self(components)
    }

    /// The numeric components.
    #[must_use]
    pub fn components(&self) -> &[u64] {
        &self.0
    }
}

fn parse_segment(segment: &str) -> u64 {
    let digits: String = segment.chars().take_while(char::is_ascii_digit).collect();
    digits.parse().unwrap_or(0)
}

impl Ord for VersionNumber {
    fn cmp(&self, other: &Self) -> Ordering {
        let len = self.0.len().max(other.0.len());
        for i in 0..len {
            let a = self.0.get(i).copied().unwrap_or(0);
            let b = other.0.get(i).copied().unwrap_or(0);
            match a.cmp(&b) {
                Ordering::Equal => {}
                decided => return decided,
            }
        }
        Ordering::Equal
    }
}

impl PartialOrd for VersionNumber {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

// Equality must agree with `Ord`, where `1.2` == `1.2.0`.
impl PartialEq for VersionNumber {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl fmt::Display for VersionNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.0.iter().map(u64::to_string).collect();
        write!(f, "{}", parts.join("."))
    }
}

/// Whether `candidate` is strictly newer than `current`.
///
/// This is the only place that decides whether an update is available.
#[must_use]
pub fn is_newer(candidate: &str, current: &str) -> bool {
    VersionNumber::parse(candidate) > VersionNumber::parse(current)
}
