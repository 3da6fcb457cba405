//! Scratch storage for one item's downloaded and composed media
//!
//! Each delivery gets its own [`MediaCache`] backed by a temporary directory.
//! The directory and everything written into it is removed when the cache is
//! dropped, on success and on every error path.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tempfile::TempDir;
use tokio::fs;
use tracing::debug;

use crate::types::AssetKind;

/// Maximum file size for downloaded assets (20MB)
pub const MAX_FILE_SIZE: usize = 20 * 1024 * 1024;

/// Per-item scratch directory
#[derive(Debug)]
pub struct MediaCache {
    dir: TempDir,
}

impl MediaCache {
    /// Create a scratch directory under `root`, or under the system temp dir
    pub fn new(root: Option<&Path>) -> Result<Self> {
        let builder = {
            let mut builder = tempfile::Builder::new();
            builder.prefix("ig-mirror-");
            builder
        };
        let dir = match root {
            Some(root) => {
                std::fs::create_dir_all(root)
                    .with_context(|| format!("Failed to create scratch root: {:?}", root))?;
                builder.tempdir_in(root)
            }
            None => builder.tempdir(),
        }
        .context("Failed to create scratch directory")?;

        debug!("Created scratch directory {:?}", dir.path());
        Ok(Self { dir })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// File path for an asset named `name`, with `extension` or the kind's default
    pub fn asset_path(&self, name: &str, kind: AssetKind, extension: Option<&str>) -> PathBuf {
        let extension = extension
            .filter(|ext| !ext.is_empty())
            .unwrap_or_else(|| kind.default_extension());
        self.dir.path().join(format!("{}.{}", name, extension))
    }

    /// Write downloaded asset data into the scratch directory
    pub async fn save(&self, path: &Path, data: &[u8]) -> Result<()> {
        if data.len() > MAX_FILE_SIZE {
            return Err(anyhow::anyhow!(
                "Media file too large: {} bytes (max: {})",
                data.len(),
                MAX_FILE_SIZE
            ));
        }

        fs::write(path, data)
            .await
            .with_context(|| format!("Failed to write media file: {:?}", path))?;

        debug!("Saved media to {:?} ({} bytes)", path, data.len());
        Ok(())
    }
}

/// Extension of the last path segment of a URL, without query or fragment
pub fn url_extension(url: &str) -> Option<&str> {
    let path = url.split(['?', '#']).next()?;
    let segment = path.rsplit('/').next()?;
    let (_, ext) = segment.rsplit_once('.')?;
    (!ext.is_empty() && ext.len() <= 5 && ext.chars().all(|c| c.is_ascii_alphanumeric()))
        .then_some(ext)
}
