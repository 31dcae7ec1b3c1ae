//! Extraction of `.tar.gz` update bundles.
//!
//! The bundle is streamed through gzip and tar one entry at a time. Only
//! directories and regular files are materialised, with their recorded mode
//! bits; links, devices and other special entries are skipped. Entries that
//! would land outside the destination are rejected.

use std::fs::{self, File};
use std::io;
use std::path::{Component, Path, PathBuf};

use flate2::read::GzDecoder;
use tar::{Archive, EntryType};
use tracing::debug;

use crate::upgrade::UpgradeError;

/// Unpack `archive_path` into `dest_dir`.
///
/// # Errors
///
/// Returns [`UpgradeError::Extract`] for the first I/O or decompression
/// failure, and for entries with absolute paths or `..` components.
pub fn extract(archive_path: &Path, dest_dir: &Path) -> Result<(), UpgradeError> {
    let fail = |reason: String| UpgradeError::Extract {
        archive: archive_path.to_path_buf(),
        reason,
    };

    debug!("Extracting {} into {}", archive_path.display(), dest_dir.display());
    let file = File::open(archive_path).map_err(|e| fail(format!("cannot open archive: {e}")))?;
    let mut archive = Archive::new(GzDecoder::new(file));
    let entries = archive.entries().map_err(|e| fail(e.to_string()))?;

    for entry in entries {
        let mut entry = entry.map_err(|e| fail(e.to_string()))?;
        let relative = entry.path().map_err(|e| fail(e.to_string()))?.into_owned();
        let entry_type = entry.header().entry_type();

        if !matches!(entry_type, EntryType::Directory | EntryType::Regular) {
            debug!("Skipping {:?} entry {}", entry_type, relative.display());
            continue;
        }

        let out = contained_path(dest_dir, &relative).ok_or_else(|| {
            fail(format!("entry {} escapes the extraction directory", relative.display()))
        })?;
        let mode = entry.header().mode().ok();

        if entry_type == EntryType::Directory {
            fs::create_dir_all(&out)
                .map_err(|e| fail(format!("cannot create {}: {e}", out.display())))?;
        } else {
            if let Some(parent) = out.parent() {
                fs::create_dir_all(parent)
                    .map_err(|e| fail(format!("cannot create {}: {e}", parent.display())))?;
            }
            let mut target = File::create(&out)
                .map_err(|e| fail(format!("cannot create {}: {e}", out.display())))?;
            io::copy(&mut entry, &mut target)
                .map_err(|e| fail(format!("cannot write {}: {e}", out.display())))?;
        }

        if let Some(mode) = mode {
            apply_mode(&out, mode).map_err(|e| fail(format!("cannot set mode on {}: {e}", out.display())))?;
        }
    }

    Ok(())
}

/// Locate `binary` (with `.exe` on Windows) at the top level of `dir`.
///
/// # Errors
///
/// Returns [`UpgradeError::Extract`] when the bundle does not contain it.
pub fn find_binary(dir: &Path, binary: &str) -> Result<PathBuf, UpgradeError> {
    let candidate = dir.join(crate::constants::executable_file_name(binary));
    if candidate.is_file() {
        debug!("Found {} in bundle", candidate.display());
        return Ok(candidate);
    }
    Err(UpgradeError::Extract {
        archive: dir.to_path_buf(),
        reason: format!("binary not found in bundle: {}", candidate.display()),
    })
}

/// Join `relative` onto `root` if it stays inside `root`.
fn contained_path(root: &Path, relative: &Path) -> Option<PathBuf> {
    let mut out = root.to_path_buf();
    for component in relative.components() {
        match component {
            Component::Normal(part) => out.push(part),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => return None,
        }
    }
    Some(out)
}

#[cfg(unix)]
fn apply_mode(path: &Path, mode: u32) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(mode & 0o7777))
}

#[cfg(not(unix))]
fn apply_mode(_path: &Path, _mode: u32) -> io::Result<()> {
    Ok(())
}
