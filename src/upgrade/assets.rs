//! Platform detection and release asset selection.
//!
//! Release assets follow the `<binary>_<version>_<os>_<arch>[.ext]` naming
//! convention, with Go-style platform tokens (`linux`, `darwin`, `windows`,
//! `amd64`, `arm64`, ...). Naming has varied between releases (bare binaries
//! in some, `.tar.gz` bundles in others), so selection is token based rather
//! than an exact file-name template:
//!
//! 1. assets named `<binary>_...` whose remaining tokens are only a version,
//!    the os and the arch are candidates
//! 2. among those, the native executable wins (`.exe` on Windows, no
//!    extension elsewhere)
//! 3. otherwise a `.tar.gz` named `<binary>_...` for this platform
//! 4. otherwise the first `.tar.gz` carrying both the os and arch tokens,
//!    treated as a bundle that may hold several executables
//! 5. otherwise the release has no build for this platform

use serde::Serialize;
use tracing::debug;

use crate::constants::ARCHIVE_EXTENSION;
use crate::upgrade::UpgradeError;
use crate::upgrade::release::{AssetDescriptor, ReleaseDescriptor};

/// Extensions that mark an asset as something other than a bare executable.
const NON_EXECUTABLE_EXTENSIONS: &[&str] = &[
    ".tar.gz", ".tgz", ".zip", ".sha256", ".sig", ".asc", ".txt", ".json", ".deb", ".rpm", ".msi",
];

/// Operating-system and architecture tokens used in asset names.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct PlatformKey {
    /// Operating-system token (`linux`, `darwin`, `windows`, ...)
    pub os: String,
    /// Architecture token (`amd64`, `arm64`, `386`, `arm`, ...)
    pub arch: String,
}

impl PlatformKey {
    /// Platform of the running binary, derived from its build target.
    #[must_use]
    pub fn current() -> Self {
        Self::from_rust(std::env::consts::OS, std::env::consts::ARCH)
    }

    /// Map Rust target names onto release naming tokens.
    #[must_use]
    pub fn from_rust(os: &str, arch: &str) -> Self {
        let os = match os {
            "macos" => "darwin",
            other => other,
        };
        let arch = match arch {
            "x86_64" => "amd64",
            "aarch64" => "arm64",
            "x86" => "386",
            "powerpc64" => "ppc64",
            other => other,
        };
        Self::new(os, arch)
    }

    /// Construct a key from release naming tokens directly.
    #[must_use]
    pub fn new(os: impl Into<String>, arch: impl Into<String>) -> Self {
        Self {
            os: os.into(),
            arch: arch.into(),
        }
    }

    /// Whether this is the Windows-like platform (`.exe` executables).
    #[must_use]
    pub fn is_windows(&self) -> bool {
        self.os == "windows"
    }

    /// File name of `binary` on this platform.
    #[must_use]
    pub fn executable_name(&self, binary: &str) -> String {
        if self.is_windows() { format!("{binary}.exe") } else { binary.to_string() }
    }
}

/// What kind of file a selected asset is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssetKind {
    /// A bare executable that can be installed as-is
    Executable,
    /// A `.tar.gz` bundle that must be extracted first
    Archive,
}

/// The asset chosen for this platform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectedAsset {
    /// The chosen asset
    pub asset: AssetDescriptor,
    /// How the asset must be staged
    pub kind: AssetKind,
}

impl SelectedAsset {
    /// Download URL of the selected asset.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.asset.url
    }
}

/// Pick the asset of `release` that provides `binary` for `platform`.
///
/// # Errors
///
/// Returns [`UpgradeError::NotFound`] when neither an executable nor an
/// archive matches. This is terminal: retrying will not produce a build.
pub fn select_asset(
    release: &ReleaseDescriptor,
    platform: &PlatformKey,
    binary: &str,
) -> Result<SelectedAsset, UpgradeError> {
    debug!(
        "Selecting {} asset for {}/{} among {} asset(s) of {}",
        binary,
        platform.os,
        platform.arch,
        release.assets.len(),
        release.tag
    );

    let prefix = format!("{binary}_");
    let executable = release.assets.iter().find(|asset| {
        asset.name.starts_with(&prefix)
            && is_native_executable(&asset.name, platform)
            && tokens_match_platform(&asset.name[prefix.len()..], platform)
    });

    if let Some(asset) = executable {
        debug!("Selected executable asset {}", asset.name);
        return Ok(SelectedAsset {
            asset: asset.clone(),
            kind: AssetKind::Executable,
        });
    }

    let archives = || release.assets.iter().filter(|asset| asset.name.ends_with(ARCHIVE_EXTENSION));
    let archive = archives()
        .find(|asset| {
            asset.name.starts_with(&prefix) && tokens_match_platform(&asset.name[prefix.len()..], platform)
        })
        .or_else(|| {
            archives().find(|asset| {
                let tokens = tokens(&asset.name);
                tokens.contains(&platform.os.as_str()) && tokens.contains(&platform.arch.as_str())
            })
        });

    if let Some(asset) = archive {
        debug!("No bare executable, falling back to archive {}", asset.name);
        return Ok(SelectedAsset {
            asset: asset.clone(),
            kind: AssetKind::Archive,
        });
    }

    Err(UpgradeError::NotFound {
        tag: release.tag.clone(),
        os: platform.os.clone(),
        arch: platform.arch.clone(),
    })
}

fn is_native_executable(name: &str, platform: &PlatformKey) -> bool {
    if platform.is_windows() {
        name.ends_with(".exe")
    } else {
        !name.ends_with(".exe") && !NON_EXECUTABLE_EXTENSIONS.iter().any(|ext| name.ends_with(ext))
    }
}

/// Every token after the binary prefix must be a version, the os or the arch,
/// and both platform tokens must be present. This keeps `ask_updater_*`
/// assets from being mistaken for `ask_*` ones.
fn tokens_match_platform(rest: &str, platform: &PlatformKey) -> bool {
    let tokens = tokens(rest);
    let has_os = tokens.contains(&platform.os.as_str());
    let has_arch = tokens.contains(&platform.arch.as_str());
    let only_known = tokens
        .iter()
        .all(|t| *t == platform.os || *t == platform.arch || is_version_token(t));
    has_os && has_arch && only_known
}

fn is_version_token(token: &str) -> bool {
    token.trim_start_matches(['v', 'V']).starts_with(|c: char| c.is_ascii_digit())
}

fn tokens(name: &str) -> Vec<&str> {
    let stem = strip_extension(name);
    stem.split(['_', '-']).filter(|t| !t.is_empty()).collect()
}

fn strip_extension(name: &str) -> &str {
    if let Some(stem) = name.strip_suffix(".exe") {
        return stem;
    }
    for ext in NON_EXECUTABLE_EXTENSIONS {
        if let Some(stem) = name.strip_suffix(ext) {
            return stem;
        }
    }
    name
}
