//! On-demand extraction cache for comic pages.
//!
//! Serving one page requires decompressing it from its archive; doing that
//! per-request would re-read the container every time someone turns a page.
//! Instead, the first page request extracts the whole archive into a cache
//! folder and every later request is a plain file open.
//!
//! Cache folders are keyed by the BLAKE3 hash of the book's *logical* path —
//! filesystem-safe, collision-resistant, and stable across catalog
//! re-derivation (it deliberately does not depend on the book's content
//! digest, so re-downloading an identical book keeps its cache).
//!
//! Eviction is crude by design: once the folder count passes a small
//! threshold, everything gets flushed before the next extraction. A personal
//! library has effectively one reader per book, so LRU bookkeeping buys
//! nothing here. Deletions always rename the folder out of the way first, so
//! an open page read keeps its underlying file instead of racing the unlink.

pub mod error;

use crate::error::{ErrorKind, Result};
use exn::ResultExt;
use longbox_comic::ComicArchive;
use std::collections::HashMap;
use std::io;
use std::path::{Component, Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;
use tokio::fs;
use tokio::sync::Mutex;

/// Existing cache folders above this count trigger a whole-cache flush
/// before the next extraction.
const CLEANUP_THRESHOLD: usize = 10;
/// Attempts for extracting one archive into staging.
const EXTRACT_ATTEMPTS: u32 = 5;
/// Attempts for the final rename promoting staging into place.
const PROMOTE_ATTEMPTS: u32 = 3;
/// Staging and trash directories live here, out of the cache-folder count.
const STAGING_DIR: &str = ".staging";

static TRASH_COUNTER: AtomicU64 = AtomicU64::new(0);

fn backoff(attempt: u32) -> Duration {
    Duration::from_millis(50u64 << (attempt - 1))
}

/// The extraction cache.
///
/// Concurrency discipline: one async mutex per cache folder (keyed on the
/// post-hash folder path) is the only synchronization primitive. It prevents
/// the same book being extracted twice concurrently, and serializes eviction
/// against extraction of the same folder. It is entirely independent of any
/// catalog-level locking, so extraction never blocks catalog reads or writes.
pub struct PageCache {
    root: PathBuf,
    locks: StdMutex<HashMap<PathBuf, Arc<Mutex<()>>>>,
}

impl PageCache {
    /// Create a cache rooted at `root`, creating the directory if needed.
    ///
    /// Non-async; it only happens once at startup.
    pub fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        std::fs::create_dir_all(root.join(STAGING_DIR)).or_raise(|| ErrorKind::CacheRoot(root.clone()))?;
        Ok(Self { root, locks: StdMutex::new(HashMap::new()) })
    }

    /// The cache folder a logical book path maps to.
    #[must_use]
    pub fn folder_for(&self, logical: &str) -> PathBuf {
        self.root.join(blake3::hash(logical.as_bytes()).to_hex().to_string())
    }

    fn lock_for(&self, folder: &Path) -> Arc<Mutex<()>> {
        // The std mutex only guards the map; it is never held across an await.
        let mut locks = self.locks.lock().expect("page cache lock map poisoned");
        Arc::clone(locks.entry(folder.to_path_buf()).or_default())
    }

    fn trash_path(&self) -> PathBuf {
        let n = TRASH_COUNTER.fetch_add(1, Ordering::Relaxed);
        self.root.join(STAGING_DIR).join(format!("trash-{}-{n}", std::process::id()))
    }

    /// Make sure the archive's contents are materialized on disk, returning
    /// the cache folder.
    ///
    /// A no-op when the folder already exists. Otherwise runs the
    /// opportunistic cleanup pass, then extracts the whole archive into a
    /// staging directory and promotes it atomically, all under the folder's
    /// own lock. Extraction is retried with backoff (transient I/O on a
    /// network-mounted library is common).
    pub async fn ensure_cached(&self, logical: &str, archive: &Path) -> Result<PathBuf> {
        let folder = self.folder_for(logical);
        if fs::try_exists(&folder).await.unwrap_or(false) {
            return Ok(folder);
        }
        self.cleanup_if_crowded().await;
        let lock = self.lock_for(&folder);
        let _guard = lock.lock().await;
        // Double-check: another caller may have extracted while we waited.
        if fs::try_exists(&folder).await.unwrap_or(false) {
            return Ok(folder);
        }
        let mut attempt = 0;
        let staging = loop {
            attempt += 1;
            match self.extract_to_staging(archive).await {
                Ok(staging) => break staging,
                Err(err) if attempt < EXTRACT_ATTEMPTS => {
                    tracing::warn!(%err, attempt, archive = %archive.display(), "Extraction failed; retrying");
                    tokio::time::sleep(backoff(attempt)).await;
                },
                Err(err) => return Err(err),
            }
        };
        self.promote(&staging, &folder).await?;
        tracing::debug!(logical, folder = %folder.display(), "Cached archive contents");
        Ok(folder)
    }

    /// Resolve one entry of a book to its on-disk file, populating the cache
    /// if absent.
    ///
    /// The whole-cache flush can rotate a folder away between extraction and
    /// this read; when the folder itself has vanished the entry is
    /// re-extracted once before the miss counts as structural.
    pub async fn resolve(&self, logical: &str, archive: &Path, entry: &str) -> Result<PathBuf> {
        let relative = Path::new(entry);
        if relative.components().any(|c| !matches!(c, Component::Normal(_))) {
            exn::bail!(ErrorKind::InvalidEntry(entry.to_string()));
        }
        let mut folder = self.ensure_cached(logical, archive).await?;
        let mut candidate = folder.join(relative);
        if !fs::try_exists(&candidate).await.map_err(ErrorKind::Io)? {
            if fs::try_exists(&folder).await.map_err(ErrorKind::Io)? {
                exn::bail!(ErrorKind::EntryMissing(entry.to_string()));
            }
            tracing::debug!(logical, "Cache folder flushed underneath a read; re-extracting");
            folder = self.ensure_cached(logical, archive).await?;
            candidate = folder.join(relative);
            if !fs::try_exists(&candidate).await.map_err(ErrorKind::Io)? {
                exn::bail!(ErrorKind::EntryMissing(entry.to_string()));
            }
        }
        Ok(candidate)
    }

    /// Best-effort removal of a book's cache folder.
    ///
    /// Failures are logged and swallowed: cache state is always recoverable
    /// by re-extraction.
    pub async fn evict(&self, logical: &str) {
        let folder = self.folder_for(logical);
        let lock = self.lock_for(&folder);
        let _guard = lock.lock().await;
        if let Err(err) = self.rotate_and_delete(&folder).await {
            tracing::warn!(%err, logical, "Failed to evict cache folder");
        }
    }

    /// Rename the folder into trash, then delete it.
    ///
    /// Succeeds silently when the folder does not exist. Once the rename has
    /// landed the canonical name is free, so a failed delete only leaks trash
    /// (cleaned next flush), never a half-dead cache folder.
    async fn rotate_and_delete(&self, folder: &Path) -> Result<()> {
        let trash = self.trash_path();
        match fs::rename(folder, &trash).await {
            Ok(()) => {},
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(()),
            Err(err) => return Err(exn::Exn::from(ErrorKind::Io(err))),
        }
        if let Err(err) = fs::remove_dir_all(&trash).await {
            tracing::warn!(%err, trash = %trash.display(), "Rotated folder left in trash");
        }
        Ok(())
    }

    /// The blunt whole-cache flush: when existing folders exceed the
    /// threshold, rotate every one of them out under its own lock.
    /// Per-folder failures are logged and skipped.
    async fn cleanup_if_crowded(&self) {
        let folders = match self.cache_folders().await {
            Ok(folders) => folders,
            Err(err) => {
                tracing::warn!(%err, "Skipping cache cleanup pass");
                return;
            },
        };
        if folders.len() <= CLEANUP_THRESHOLD {
            return;
        }
        tracing::info!(count = folders.len(), "Flushing page cache");
        for folder in folders {
            let lock = self.lock_for(&folder);
            let _guard = lock.lock().await;
            if let Err(err) = self.rotate_and_delete(&folder).await {
                tracing::warn!(%err, folder = %folder.display(), "Failed to flush cache folder");
            }
        }
    }

    async fn cache_folders(&self) -> Result<Vec<PathBuf>> {
        let mut folders = Vec::new();
        let mut entries = fs::read_dir(&self.root).await.map_err(ErrorKind::Io)?;
        while let Some(entry) = entries.next_entry().await.map_err(ErrorKind::Io)? {
            let hidden = entry.file_name().to_string_lossy().starts_with('.');
            if !hidden && entry.file_type().await.map_err(ErrorKind::Io)?.is_dir() {
                folders.push(entry.path());
            }
        }
        Ok(folders)
    }

    /// Extract the archive into a fresh staging directory inside the cache
    /// root (same filesystem, so promotion is a pure rename).
    ///
    /// Decompression is CPU-bound and runs on the blocking pool so a large
    /// archive never stalls the async executor.
    async fn extract_to_staging(&self, archive: &Path) -> Result<PathBuf> {
        let staging_root = self.root.join(STAGING_DIR);
        let archive = archive.to_path_buf();
        tokio::task::spawn_blocking(move || {
            let staging = tempfile::tempdir_in(staging_root).map_err(ErrorKind::Io)?;
            let mut comic =
                ComicArchive::open(&archive).or_raise(|| ErrorKind::Extraction(archive.clone()))?;
            comic.extract_into(staging.path()).or_raise(|| ErrorKind::Extraction(archive.clone()))?;
            Ok(staging.keep())
        })
        .await
        .map_err(|err| ErrorKind::Io(io::Error::other(err)))?
    }

    /// Promote a fully-extracted staging directory to its canonical folder:
    /// rotate away anything stale, then rename with bounded backoff to absorb
    /// transient sharing violations.
    async fn promote(&self, staging: &Path, folder: &Path) -> Result<()> {
        self.rotate_and_delete(folder).await?;
        let mut attempt = 0;
        loop {
            attempt += 1;
            match fs::rename(staging, folder).await {
                Ok(()) => return Ok(()),
                Err(err) if attempt < PROMOTE_ATTEMPTS => {
                    tracing::warn!(%err, attempt, folder = %folder.display(), "Promotion rename failed; retrying");
                    tokio::time::sleep(backoff(attempt)).await;
                },
                Err(err) => {
                    _ = fs::remove_dir_all(staging).await;
                    return Err(err).or_raise(|| ErrorKind::Promotion(folder.to_path_buf()));
                },
            }
        }
    }
}
