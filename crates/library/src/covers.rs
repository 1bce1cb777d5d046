//! The cover-extraction collaborator contract.
//!
//! The actual image resizer is an external tool: given a page image and a
//! maximum dimension, it produces a resized image file or fails. This module
//! only defines the seam the indexer drives it through, plus the naming
//! scheme for the files it produces.

use crate::error::Result;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// A collaborator that turns a page image into a cover file on disk.
///
/// Implementations are expected to downscale to their configured maximum
/// dimension; longbox treats the whole thing as a black box that either
/// produces `destination` or fails.
// TODO: When `dyn async trait` stabilizes, migrate to native 2024 Edition async traits.
#[async_trait]
pub trait CoverRenderer: Send + Sync {
    async fn render(&self, image: &[u8], destination: &Path) -> Result<()>;
}

pub type RendererHandle = Arc<dyn CoverRenderer>;

/// Where covers go and who produces them.
#[derive(Clone)]
pub struct CoverConfig {
    pub root: PathBuf,
    pub renderer: RendererHandle,
}

/// Stable cover file name for a book: the BLAKE3 hash of its *logical* path
/// plus the source entry's extension.
///
/// Hashing the path (not the book's content digest) keeps the name stable
/// when the archive is re-downloaded or touched, so an unchanged book never
/// re-renders its cover.
#[must_use]
pub fn cover_file_name(logical: &str, entry: &str) -> String {
    let extension = Path::new(entry)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_lowercase)
        .unwrap_or_else(|| "jpg".to_string());
    format!("{}.{extension}", blake3::hash(logical.as_bytes()).to_hex())
}

/// A renderer that writes the page image unmodified. Stands in for the real
/// resizer in tests.
#[cfg(any(test, feature = "mock"))]
pub struct PassThroughRenderer;

#[cfg(any(test, feature = "mock"))]
#[async_trait]
impl CoverRenderer for PassThroughRenderer {
    async fn render(&self, image: &[u8], destination: &Path) -> Result<()> {
        use crate::error::ErrorKind;
        if let Some(parent) = destination.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(ErrorKind::Io)?;
        }
        tokio::fs::write(destination, image).await.map_err(ErrorKind::Io)?;
        Ok(())
    }
}
