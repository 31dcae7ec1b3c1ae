//! Test fixtures for release metadata and update bundles

use anyhow::{Context, Result};
use flate2::Compression;
use flate2::write::GzEncoder;
use serde_json::{Value, json};
use std::path::Path;

#[derive(Clone, Debug)]
enum TarEntry {
    File { path: String, data: Vec<u8>, mode: u32 },
    Dir { path: String },
    Symlink { path: String, target: String },
}

/// Builder for `.tar.gz` bundles.
#[derive(Clone, Debug, Default)]
pub struct TarballBuilder {
    entries: Vec<TarEntry>,
}

impl TarballBuilder {
    /// Empty bundle
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a regular file with the given mode bits
    pub fn file(mut self, path: &str, data: &[u8], mode: u32) -> Self {
        self.entries.push(TarEntry::File {
            path: path.to_string(),
            data: data.to_vec(),
            mode,
        });
        self
    }

    /// Add a directory entry (mode 0755)
    pub fn dir(mut self, path: &str) -> Self {
        self.entries.push(TarEntry::Dir {
            path: path.to_string(),
        });
        self
    }

    /// Add a symbolic link entry
    pub fn symlink(mut self, path: &str, target: &str) -> Self {
        self.entries.push(TarEntry::Symlink {
            path: path.to_string(),
            target: target.to_string(),
        });
        self
    }

    /// Encode the bundle in memory
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let encoder = GzEncoder::new(Vec::new(), Compression::default());
        let mut builder = tar::Builder::new(encoder);

        for entry in &self.entries {
            let mut header = tar::Header::new_gnu();
            match entry {
                TarEntry::File { path, data, mode } => {
                    header.set_entry_type(tar::EntryType::Regular);
                    header.set_size(data.len() as u64);
                    header.set_mode(*mode);
                    header.set_cksum();
                    builder
                        .append_data(&mut header, path, data.as_slice())
                        .with_context(|| format!("Failed to append {path}"))?;
                }
                TarEntry::Dir { path } => {
                    header.set_entry_type(tar::EntryType::Directory);
                    header.set_size(0);
                    header.set_mode(0o755);
                    header.set_cksum();
                    builder
                        .append_data(&mut header, path, std::io::empty())
                        .with_context(|| format!("Failed to append {path}"))?;
                }
                TarEntry::Symlink { path, target } => {
                    header.set_entry_type(tar::EntryType::Symlink);
                    header.set_size(0);
                    header.set_mode(0o777);
                    builder
                        .append_link(&mut header, path, target)
                        .with_context(|| format!("Failed to append {path}"))?;
                }
            }
        }

        let encoder = builder.into_inner().context("Failed to finish tar stream")?;
        encoder.finish().context("Failed to finish gzip stream")
    }

    /// Write the bundle to `path`
    pub fn write_to(&self, path: &Path) -> Result<()> {
        let bytes = self.to_bytes()?;
        std::fs::write(path, bytes).with_context(|| format!("Failed to write {}", path.display()))
    }
}

/// Builder for release metadata in the release API's JSON shape.
#[derive(Clone, Debug)]
pub struct ReleaseBuilder {
    tag: String,
    name: Option<String>,
    body: Option<String>,
    assets: Vec<(String, String)>,
}

impl ReleaseBuilder {
    /// Release with the given tag and no assets
    pub fn new(tag: &str) -> Self {
        Self {
            tag: tag.to_string(),
            name: None,
            body: None,
            assets: Vec::new(),
        }
    }

    /// Set the release title
    pub fn name(mut self, name: &str) -> Self {
        self.name = Some(name.to_string());
        self
    }

    /// Set the release notes
    pub fn body(mut self, body: &str) -> Self {
        self.body = Some(body.to_string());
        self
    }

    /// Add an asset with an explicit download URL
    pub fn asset(mut self, name: &str, url: &str) -> Self {
        self.assets.push((name.to_string(), url.to_string()));
        self
    }

    /// Add an asset served from `base` at `/download/<name>`
    pub fn asset_at(self, base: &str, name: &str) -> Self {
        let url = format!("{}/download/{}", base.trim_end_matches('/'), name);
        self.asset(name, &url)
    }

    /// JSON as returned by `GET /releases/latest`
    pub fn to_json(&self) -> Value {
        let assets: Vec<Value> = self
            .assets
            .iter()
            .map(|(name, url)| json!({ "name": name, "browser_download_url": url }))
            .collect();
        json!({
            "tag_name": self.tag,
            "name": self.name,
            "body": self.body,
            "published_at": "2025-01-01T00:00:00Z",
            "assets": assets,
        })
    }
}
