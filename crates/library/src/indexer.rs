//! The background indexing job.
//!
//! One long-lived task reconciles the catalog against the real archive tree:
//! Idle → Running → Idle, woken by a fixed-period timer or an explicit
//! trigger. Indexing is incremental (unchanged files are never re-read) and
//! best-effort (one bad archive never aborts a scan). The first run's
//! outcome — success or failure — completes a one-shot "catalog is warm"
//! signal; failures of later runs are logged and leave the last-known-good
//! catalog published.

use crate::covers::{CoverConfig, cover_file_name};
use crate::error::{ErrorKind, Result};
use exn::ResultExt;
use longbox_catalog::{Book, BookPath, CatalogStore};
use longbox_comic::ComicArchive;
use longbox_pagecache::PageCache;
use std::collections::{HashMap, HashSet};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use time::OffsetDateTime;
use tokio::fs;
use tokio::sync::{Notify, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// How one indexing run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    Completed,
    /// The cancellation signal fired mid-run; the in-progress book's effect
    /// was not committed.
    Cancelled,
}

/// Warm-up state of the catalog, published over a watch channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WarmState {
    Pending,
    Ready,
    Failed,
}

/// Reconciles the catalog against the archive tree under `source_root`.
pub struct Indexer {
    store: Arc<CatalogStore>,
    cache: Arc<PageCache>,
    source_root: PathBuf,
    covers: Option<CoverConfig>,
}

impl Indexer {
    pub fn new(
        store: Arc<CatalogStore>,
        cache: Arc<PageCache>,
        source_root: impl Into<PathBuf>,
        covers: Option<CoverConfig>,
    ) -> Self {
        Self { store, cache, source_root: source_root.into(), covers }
    }

    /// Start the background loop, running once immediately and then every
    /// `period` (or sooner, when triggered).
    pub fn spawn(self, period: Duration) -> IndexerHandle {
        let trigger = Arc::new(Notify::new());
        let running = Arc::new(AtomicBool::new(false));
        let (warm_tx, warm_rx) = watch::channel(WarmState::Pending);
        let (cancel_tx, cancel_rx) = watch::channel(false);
        let task = tokio::spawn(run_loop(self, period, Arc::clone(&trigger), Arc::clone(&running), warm_tx, cancel_rx));
        IndexerHandle { trigger, running, warm: warm_rx, cancel: cancel_tx, task }
    }

    /// One full reconciliation pass. Checks `cancel` between books and
    /// between archive operations.
    pub async fn run(&self, cancel: &watch::Receiver<bool>) -> Result<RunOutcome> {
        let known_sizes: HashMap<BookPath, u64> = self
            .store
            .books()
            .await
            .or_raise(|| ErrorKind::Store)?
            .into_iter()
            .map(|book| (book.path, book.size))
            .collect();
        let errored: HashSet<BookPath> = self
            .store
            .indexing_errors()
            .await
            .or_raise(|| ErrorKind::Store)?
            .into_iter()
            .map(|error| error.path)
            .collect();

        let archives = self.discover_archives().await?;
        tracing::debug!(count = archives.len(), root = %self.source_root.display(), "Enumerated archives");

        let mut observed: HashSet<BookPath> = HashSet::with_capacity(archives.len());
        for (file, size) in archives {
            if *cancel.borrow() {
                tracing::info!("Indexing run cancelled");
                return Ok(RunOutcome::Cancelled);
            }
            let path = match BookPath::from_root(&self.source_root, &file) {
                Ok(path) => path,
                Err(err) => {
                    tracing::warn!(%err, file = %file.display(), "Skipping unaddressable archive");
                    continue;
                },
            };
            // Two physical paths can normalize to the same catalog path;
            // they are not reconciled — last processed wins.
            observed.insert(path.clone());
            // Incremental: an unchanged size means an unchanged book, unless
            // the path carries an error — errored books are always retried.
            if known_sizes.get(&path) == Some(&size) && !errored.contains(&path) {
                continue;
            }
            match self.index_book(&path, &file, size, cancel).await {
                Ok(Some(book)) => self.store.upsert_book(book).await.or_raise(|| ErrorKind::Store)?,
                Ok(None) => return Ok(RunOutcome::Cancelled),
                Err(err) => {
                    tracing::warn!(%err, book = %path, "Failed to index archive");
                    self.store.add_indexing_error(path, err.to_string()).await.or_raise(|| ErrorKind::Store)?;
                },
            }
        }

        // Books whose files vanished (deleted or renamed) leave the catalog,
        // and their extracted pages leave the cache.
        let removed = self.store.remove_books_except(&observed).await.or_raise(|| ErrorKind::Store)?;
        for path in &removed {
            self.cache.evict(path.as_str()).await;
        }
        if let Some(covers) = &self.covers {
            self.sweep_covers(covers).await;
        }
        self.store.complete_indexation(OffsetDateTime::now_utc()).await.or_raise(|| ErrorKind::Store)?;
        tracing::info!(observed = observed.len(), removed = removed.len(), "Indexing run complete");
        Ok(RunOutcome::Completed)
    }

    /// Index one archive into a [`Book`]. Returns `Ok(None)` when cancelled
    /// after the archive scan.
    ///
    /// Decompression and digesting are CPU-bound and run on the blocking
    /// pool so a large archive never stalls the async executor.
    async fn index_book(
        &self,
        path: &BookPath,
        file: &Path,
        size: u64,
        cancel: &watch::Receiver<bool>,
    ) -> Result<Option<Book>> {
        let want_cover = self.covers.is_some();
        let scan = {
            let file = file.to_path_buf();
            tokio::task::spawn_blocking(move || scan_archive(&file, want_cover))
                .await
                .map_err(|err| ErrorKind::Archive(err.to_string()))??
        };
        if *cancel.borrow() {
            return Ok(None);
        }
        let cover = match (&self.covers, scan.cover) {
            (Some(covers), Some((entry, image))) => {
                let name = cover_file_name(path.as_str(), &entry);
                covers
                    .renderer
                    .render(&image, &covers.root.join(&name))
                    .await
                    .map_err(|err| ErrorKind::Cover(err.to_string()))?;
                Some(name)
            },
            _ => None,
        };
        let mut book = Book::new(path.clone(), scan.digest, size, scan.entries);
        if let Some(cover) = cover {
            book = book.with_cover(cover);
        }
        Ok(Some(book))
    }

    /// Walk the source tree collecting archive files and their sizes.
    async fn discover_archives(&self) -> Result<Vec<(PathBuf, u64)>> {
        let mut found = Vec::new();
        let mut stack = vec![self.source_root.clone()];
        while let Some(current) = stack.pop() {
            let mut entries = match fs::read_dir(&current).await {
                Ok(entries) => entries,
                // A missing source root is an empty library, not a failure.
                Err(err) if err.kind() == io::ErrorKind::NotFound => continue,
                Err(err) => return Err(err).or_raise(|| ErrorKind::Discover(current.clone())),
            };
            while let Some(entry) = entries.next_entry().await.map_err(ErrorKind::Io)? {
                let metadata = entry.metadata().await.map_err(ErrorKind::Io)?;
                if metadata.is_dir() {
                    stack.push(entry.path());
                } else if metadata.is_file() && longbox_comic::is_archive(entry.path()) {
                    found.push((entry.path(), metadata.len()));
                }
                // Note: silently drop what is most likely a broken symlink.
            }
        }
        Ok(found)
    }

    /// Delete cover files no surviving book references. Failures are logged
    /// and skipped: covers are regenerated on the next full index anyway.
    async fn sweep_covers(&self, covers: &CoverConfig) {
        let books = match self.store.books().await {
            Ok(books) => books,
            Err(err) => {
                tracing::warn!(%err, "Skipping cover sweep");
                return;
            },
        };
        let referenced: HashSet<String> = books.into_iter().filter_map(|book| book.cover).collect();
        let mut entries = match fs::read_dir(&covers.root).await {
            Ok(entries) => entries,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return,
            Err(err) => {
                tracing::warn!(%err, "Skipping cover sweep");
                return;
            },
        };
        while let Ok(Some(entry)) = entries.next_entry().await {
            let name = entry.file_name().to_string_lossy().to_string();
            if referenced.contains(&name) {
                continue;
            }
            if let Err(err) = fs::remove_file(entry.path()).await {
                tracing::warn!(%err, cover = %name, "Failed to delete orphaned cover");
            }
        }
    }
}

struct ArchiveScan {
    entries: Vec<String>,
    /// First image entry and its bytes, when a cover was requested.
    cover: Option<(String, Vec<u8>)>,
    digest: String,
}

/// The synchronous part of indexing one archive: open, list, read the cover
/// image, digest.
fn scan_archive(file: &Path, want_cover: bool) -> Result<ArchiveScan> {
    let mut comic = ComicArchive::open(file).map_err(|err| ErrorKind::Archive(err.to_string()))?;
    let entries = comic.entry_names();
    let cover = match want_cover {
        true => match entries.iter().find(|entry| longbox_comic::is_image(entry)) {
            Some(entry) => {
                let image = comic.read_entry(entry).map_err(|err| ErrorKind::Archive(err.to_string()))?;
                Some((entry.clone(), image))
            },
            None => None,
        },
        false => None,
    };
    let digest = longbox_comic::digest_file(file).map_err(|err| ErrorKind::Archive(err.to_string()))?;
    Ok(ArchiveScan { entries, cover, digest })
}

async fn run_loop(
    indexer: Indexer,
    period: Duration,
    trigger: Arc<Notify>,
    running: Arc<AtomicBool>,
    warm: watch::Sender<WarmState>,
    mut cancel: watch::Receiver<bool>,
) {
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            _ = interval.tick() => {},
            _ = trigger.notified() => {},
            _ = cancel.changed() => return,
        }
        running.store(true, Ordering::SeqCst);
        let outcome = indexer.run(&cancel).await;
        running.store(false, Ordering::SeqCst);
        match outcome {
            Ok(RunOutcome::Completed) => {
                if *warm.borrow() == WarmState::Pending {
                    _ = warm.send(WarmState::Ready);
                }
            },
            Ok(RunOutcome::Cancelled) => return,
            Err(err) => {
                if *warm.borrow() == WarmState::Pending {
                    tracing::error!(%err, "First indexing run failed");
                    _ = warm.send(WarmState::Failed);
                } else {
                    // The previously published catalog stays intact.
                    tracing::error!(%err, "Indexing run failed");
                }
            },
        }
    }
}

/// Handle to the background indexing loop.
pub struct IndexerHandle {
    trigger: Arc<Notify>,
    running: Arc<AtomicBool>,
    warm: watch::Receiver<WarmState>,
    cancel: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl IndexerHandle {
    /// Request a reindex now. A trigger while a run is in flight collapses
    /// into that run; at most one wake-up is ever queued.
    pub fn trigger_reindex(&self) {
        if self.running.load(Ordering::SeqCst) {
            tracing::debug!("Reindex requested while a run is in flight; collapsing");
            return;
        }
        self.trigger.notify_one();
    }

    /// Whether a run is currently in flight.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Wait until the first run has finished.
    ///
    /// # Errors
    /// [`ErrorKind::ColdCatalog`] when the first run failed (or the loop shut
    /// down before completing one).
    pub async fn catalog_warm(&self) -> Result<()> {
        let mut warm = self.warm.clone();
        match warm.wait_for(|state| *state != WarmState::Pending).await {
            Ok(state) if *state == WarmState::Ready => Ok(()),
            _ => exn::bail!(ErrorKind::ColdCatalog),
        }
    }

    /// Cancel any in-flight run and stop the loop.
    pub async fn shutdown(self) {
        _ = self.cancel.send(true);
        _ = self.task.await;
    }
}
