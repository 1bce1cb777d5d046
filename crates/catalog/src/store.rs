//! The single authoritative catalog store.
//!
//! One [`CatalogStore`] owns the in-memory [`Catalog`] behind a
//! `OnceCell<RwLock<_>>`: hydration from the durable snapshots happens once,
//! on first access, guarded by the cell; afterwards reads share the read
//! lock and every mutation is serialized by the write lock and persisted
//! before the mutating call returns. There is exactly one writer path — no
//! cross-process coordination exists or is attempted.

use crate::error::{ErrorKind, Result};
use crate::model::{Book, Catalog, IndexingError, ReadingListItem};
use crate::path::BookPath;
use crate::snapshot::{self, CATALOG_FILE, CatalogSnapshot, READING_LIST_FILE, ReadingListSnapshot};
use exn::{OptionExt, ResultExt};
use longbox_pagecache::PageCache;
use std::collections::HashSet;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use time::OffsetDateTime;
use tokio::fs;
use tokio::sync::{OnceCell, RwLock};

const RELOCATE_ATTEMPTS: u32 = 3;

/// The authoritative catalog of books, reading progress, and indexing
/// errors, hydrated lazily and persisted after every mutation.
///
/// All operations are safe for concurrent callers.
pub struct CatalogStore {
    source_root: PathBuf,
    completed_root: Option<PathBuf>,
    catalog_file: PathBuf,
    reading_file: PathBuf,
    cache: Arc<PageCache>,
    state: OnceCell<RwLock<Catalog>>,
}

impl CatalogStore {
    /// Create a store persisting into `index_root` for archives under
    /// `source_root`, serving pages through `cache`.
    pub fn new(index_root: impl Into<PathBuf>, source_root: impl Into<PathBuf>, cache: Arc<PageCache>) -> Self {
        let index_root = index_root.into();
        Self {
            source_root: source_root.into(),
            completed_root: None,
            catalog_file: index_root.join(CATALOG_FILE),
            reading_file: index_root.join(READING_LIST_FILE),
            cache,
            state: OnceCell::new(),
        }
    }

    /// Configure a destination folder for archives marked as read. Without
    /// one, [`mark_as_read`](Self::mark_as_read) leaves the file in place.
    #[must_use]
    pub fn with_completed_root(mut self, completed_root: impl Into<PathBuf>) -> Self {
        self.completed_root = Some(completed_root.into());
        self
    }

    /// The hydrated catalog, loading the snapshots exactly once.
    async fn catalog(&self) -> Result<&RwLock<Catalog>> {
        self.state.get_or_try_init(|| self.load()).await
    }

    async fn load(&self) -> Result<RwLock<Catalog>> {
        let catalog: CatalogSnapshot = snapshot::load(&self.catalog_file).await?.unwrap_or_default();
        let reading: ReadingListSnapshot = snapshot::load(&self.reading_file).await?.unwrap_or_default();
        tracing::debug!(
            books = catalog.books.len(),
            reading = reading.items.len(),
            errors = catalog.indexing_errors.len(),
            "Hydrated catalog from snapshots"
        );
        Ok(RwLock::new(Catalog::new(
            catalog.last_indexation,
            catalog.books,
            reading.items,
            catalog.indexing_errors,
        )))
    }

    async fn persist_catalog(&self, catalog: &Catalog) -> Result<()> {
        let document = CatalogSnapshot {
            last_indexation: catalog.last_indexation(),
            books: catalog.books().to_vec(),
            indexing_errors: catalog.errors().to_vec(),
        };
        snapshot::persist(&self.catalog_file, &document).await
    }

    async fn persist_reading(&self, catalog: &Catalog) -> Result<()> {
        let document = ReadingListSnapshot { items: catalog.reading_list().to_vec() };
        snapshot::persist(&self.reading_file, &document).await
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// All books in natural path order.
    pub async fn books(&self) -> Result<Vec<Book>> {
        Ok(self.catalog().await?.read().await.books().to_vec())
    }

    pub async fn reading_list(&self) -> Result<Vec<ReadingListItem>> {
        Ok(self.catalog().await?.read().await.reading_list().to_vec())
    }

    pub async fn indexing_errors(&self) -> Result<Vec<IndexingError>> {
        Ok(self.catalog().await?.read().await.errors().to_vec())
    }

    pub async fn book(&self, path: &BookPath) -> Result<Option<Book>> {
        Ok(self.catalog().await?.read().await.book(path).cloned())
    }

    pub async fn reading_item(&self, path: &BookPath) -> Result<Option<ReadingListItem>> {
        Ok(self.catalog().await?.read().await.reading_item(path).cloned())
    }

    pub async fn last_indexation(&self) -> Result<Option<OffsetDateTime>> {
        Ok(self.catalog().await?.read().await.last_indexation())
    }

    // =========================================================================
    // Mutations (serialized by the write lock, persisted before returning)
    // =========================================================================

    /// Insert or replace a book, clearing any indexing error for its path.
    pub async fn upsert_book(&self, book: Book) -> Result<()> {
        let lock = self.catalog().await?;
        let mut catalog = lock.write().await;
        catalog.upsert_book(book);
        self.persist_catalog(&catalog).await
    }

    /// Remove a book and its reading-list entry.
    pub async fn remove_book(&self, path: &BookPath) -> Result<()> {
        let lock = self.catalog().await?;
        let mut catalog = lock.write().await;
        let had_reading = catalog.reading_item(path).is_some();
        let existed = catalog.remove_book(path);
        if existed {
            self.persist_catalog(&catalog).await?;
        }
        if had_reading {
            self.persist_reading(&catalog).await?;
        }
        Ok(())
    }

    /// Drop every book not in `observed` (post-scan reconciliation),
    /// returning the removed paths so the caller can evict their caches.
    pub async fn remove_books_except(&self, observed: &HashSet<BookPath>) -> Result<Vec<BookPath>> {
        let lock = self.catalog().await?;
        let mut catalog = lock.write().await;
        let removed = catalog.retain_books(observed);
        if !removed.is_empty() {
            self.persist_catalog(&catalog).await?;
            self.persist_reading(&catalog).await?;
        }
        Ok(removed)
    }

    /// Record (or replace) an indexing error for a path.
    pub async fn add_indexing_error(&self, path: BookPath, message: impl Into<String>) -> Result<()> {
        let lock = self.catalog().await?;
        let mut catalog = lock.write().await;
        catalog.upsert_error(IndexingError { path, message: message.into() });
        self.persist_catalog(&catalog).await
    }

    /// Upsert a non-completed reading item at `page`, timestamped now.
    /// Persists the reading-list snapshot only.
    pub async fn update_reading_progress(&self, path: BookPath, page: i64) -> Result<()> {
        if page < 0 {
            exn::bail!(ErrorKind::InvalidPage(page));
        }
        let lock = self.catalog().await?;
        let mut catalog = lock.write().await;
        catalog.upsert_reading(ReadingListItem::in_progress(path, page));
        self.persist_reading(&catalog).await
    }

    /// Mark a book as read: when a completed folder is configured and the
    /// book exists, its archive is relocated there and the book leaves the
    /// catalog; a completed reading item (page −1) is always recorded; the
    /// book's cache folder is evicted best-effort.
    pub async fn mark_as_read(&self, path: &BookPath) -> Result<()> {
        let lock = self.catalog().await?;
        let mut catalog = lock.write().await;
        let mut removed = false;
        if let Some(completed_root) = &self.completed_root
            && catalog.book(path).is_some()
        {
            self.relocate_to_completed(path, completed_root.clone()).await?;
            catalog.remove_book(path);
            removed = true;
        }
        catalog.upsert_reading(ReadingListItem::completed(path.clone()));
        if removed {
            self.persist_catalog(&catalog).await?;
        }
        self.persist_reading(&catalog).await?;
        drop(catalog);
        self.cache.evict(path.as_str()).await;
        Ok(())
    }

    /// Delete the reading-list entry for a path, if any.
    pub async fn remove_from_reading_list(&self, path: &BookPath) -> Result<()> {
        let lock = self.catalog().await?;
        let mut catalog = lock.write().await;
        if catalog.remove_reading(path) {
            self.persist_reading(&catalog).await?;
        }
        Ok(())
    }

    /// Stamp the last-indexation timestamp and persist the catalog snapshot.
    pub async fn complete_indexation(&self, timestamp: OffsetDateTime) -> Result<()> {
        let lock = self.catalog().await?;
        let mut catalog = lock.write().await;
        catalog.stamp_indexation(timestamp);
        self.persist_catalog(&catalog).await
    }

    // =========================================================================
    // Pages
    // =========================================================================

    /// Open the on-disk file for one page of a book, populating the
    /// extraction cache if needed.
    ///
    /// # Errors
    /// [`ErrorKind::UnknownBook`] / [`ErrorKind::PageOutOfRange`] are
    /// structural and rejected synchronously; cache population failures
    /// surface as [`ErrorKind::Cache`].
    pub async fn page_file(&self, path: &BookPath, index: usize) -> Result<fs::File> {
        let book =
            self.book(path).await?.ok_or_raise(|| ErrorKind::UnknownBook(path.to_string()))?;
        let entry =
            book.page(index).ok_or_raise(|| ErrorKind::PageOutOfRange(index))?.to_string();
        let archive = path.source_path(&self.source_root);
        let on_disk =
            self.cache.resolve(path.as_str(), &archive, &entry).await.or_raise(|| ErrorKind::Cache)?;
        Ok(fs::File::open(&on_disk).await.map_err(ErrorKind::Io)?)
    }

    /// Move the archive into the completed folder, retrying the rename with
    /// backoff. A missing source fails immediately; that's structural.
    ///
    /// The destination mirrors the book's logical path, not just its file
    /// name: `foo/t01.cbz` and `bar/t01.cbz` must never collide under the
    /// completed root, since a rename over an existing file destroys it.
    async fn relocate_to_completed(&self, path: &BookPath, completed_root: PathBuf) -> Result<()> {
        let source = path.source_path(&self.source_root);
        let destination = path.source_path(&completed_root);
        if let Some(parent) = destination.parent() {
            fs::create_dir_all(parent).await.map_err(ErrorKind::Io)?;
        }
        let mut attempt = 0;
        loop {
            attempt += 1;
            match fs::rename(&source, &destination).await {
                Ok(()) => {
                    tracing::info!(book = %path, to = %destination.display(), "Relocated completed archive");
                    return Ok(());
                },
                Err(err) if err.kind() == io::ErrorKind::NotFound => {
                    return Err(err).or_raise(|| ErrorKind::Relocate(source.clone()));
                },
                Err(err) if attempt < RELOCATE_ATTEMPTS => {
                    tracing::warn!(%err, attempt, book = %path, "Relocation failed; retrying");
                    tokio::time::sleep(Duration::from_millis(50u64 << (attempt - 1))).await;
                },
                Err(err) => return Err(err).or_raise(|| ErrorKind::Relocate(source.clone())),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use std::io::Write;
    use std::path::Path;
    use tokio::io::AsyncReadExt;

    fn fixture(dir: &Path, relative: &str, entries: &[(&str, &[u8])]) -> PathBuf {
        let path = dir.join(relative);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        let file = File::create(&path).unwrap();
        let mut writer = zip::ZipWriter::new(file);
        let options = zip::write::SimpleFileOptions::default();
        for (entry, data) in entries {
            writer.start_file(*entry, options).unwrap();
            writer.write_all(data).unwrap();
        }
        writer.finish().unwrap();
        path
    }

    struct Fixture {
        _dir: tempfile::TempDir,
        source: PathBuf,
        index: PathBuf,
        completed: PathBuf,
        cache: Arc<PageCache>,
    }
    impl Fixture {
        fn new() -> Self {
            let dir = tempfile::tempdir().unwrap();
            let source = dir.path().join("library");
            let index = dir.path().join("index");
            let completed = dir.path().join("completed");
            std::fs::create_dir_all(&source).unwrap();
            let cache = Arc::new(PageCache::new(dir.path().join("cache")).unwrap());
            Self { _dir: dir, source, index, completed, cache }
        }

        fn store(&self) -> CatalogStore {
            CatalogStore::new(&self.index, &self.source, Arc::clone(&self.cache))
        }

        fn store_with_completed(&self) -> CatalogStore {
            self.store().with_completed_root(&self.completed)
        }
    }

    fn path(s: &str) -> BookPath {
        BookPath::parse(s).unwrap()
    }

    fn book(s: &str, entries: &[&str]) -> Book {
        Book::new(path(s), "digest", 1, entries.iter().map(|e| e.to_string()).collect())
    }

    #[tokio::test]
    async fn hydrates_empty_without_snapshots() {
        let fx = Fixture::new();
        let store = fx.store();
        assert!(store.books().await.unwrap().is_empty());
        assert!(store.reading_list().await.unwrap().is_empty());
        assert!(store.last_indexation().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn mutations_survive_a_restart() {
        let fx = Fixture::new();
        {
            let store = fx.store();
            store.upsert_book(book("foo/t10.cbz", &["p1.jpg"])).await.unwrap();
            store.upsert_book(book("foo/t2.cbz", &["p1.jpg"])).await.unwrap();
            store.update_reading_progress(path("foo/t2.cbz"), 3).await.unwrap();
        }
        let store = fx.store();
        let books = store.books().await.unwrap();
        let paths: Vec<&str> = books.iter().map(|b| b.path.as_str()).collect();
        assert_eq!(paths, vec!["foo/t2.cbz", "foo/t10.cbz"]);
        assert_eq!(store.reading_item(&path("foo/t2.cbz")).await.unwrap().unwrap().page, 3);
    }

    #[tokio::test]
    async fn upsert_book_clears_indexing_error() {
        let fx = Fixture::new();
        let store = fx.store();
        store.add_indexing_error(path("t01.cbz"), "truncated archive").await.unwrap();
        assert_eq!(store.indexing_errors().await.unwrap().len(), 1);
        store.upsert_book(book("t01.cbz", &["p1.jpg"])).await.unwrap();
        assert!(store.indexing_errors().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn progress_updates_touch_only_the_reading_list_snapshot() {
        let fx = Fixture::new();
        let store = fx.store();
        store.update_reading_progress(path("foo/t1.cbz"), 5).await.unwrap();
        assert!(fx.index.join(READING_LIST_FILE).exists());
        assert!(!fx.index.join(CATALOG_FILE).exists());
        let err = store.update_reading_progress(path("foo/t1.cbz"), -2).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::InvalidPage(-2)));
    }

    #[tokio::test]
    async fn remove_book_drops_reading_entry_too() {
        let fx = Fixture::new();
        let store = fx.store();
        store.upsert_book(book("t01.cbz", &["p1.jpg"])).await.unwrap();
        store.update_reading_progress(path("t01.cbz"), 2).await.unwrap();
        store.remove_book(&path("t01.cbz")).await.unwrap();
        assert!(store.books().await.unwrap().is_empty());
        assert!(store.reading_list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn page_file_serves_bytes_through_the_cache() {
        let fx = Fixture::new();
        fixture(&fx.source, "foo/t01.cbz", &[("p1.jpg", b"page one"), ("ComicInfo.xml", b"<meta/>")]);
        let store = fx.store();
        let entries = vec!["ComicInfo.xml".to_string(), "p1.jpg".to_string()];
        store.upsert_book(Book::new(path("foo/t01.cbz"), "digest", 1, entries)).await.unwrap();

        let mut file = store.page_file(&path("foo/t01.cbz"), 0).await.unwrap();
        let mut contents = Vec::new();
        file.read_to_end(&mut contents).await.unwrap();
        assert_eq!(contents, b"page one");

        let err = store.page_file(&path("foo/t01.cbz"), 9).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::PageOutOfRange(9)));
        let err = store.page_file(&path("missing.cbz"), 0).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::UnknownBook(_)));
    }

    #[tokio::test]
    async fn mark_as_read_relocates_completes_and_evicts() {
        let fx = Fixture::new();
        let archive = fixture(&fx.source, "foo/t01.cbz", &[("p1.jpg", b"page one")]);
        let store = fx.store_with_completed();
        store.upsert_book(book("foo/t01.cbz", &["p1.jpg"])).await.unwrap();
        // Populate the cache so there is something to evict.
        store.page_file(&path("foo/t01.cbz"), 0).await.unwrap();
        let cache_folder = fx.cache.folder_for("foo/t01.cbz");
        assert!(cache_folder.exists());

        store.mark_as_read(&path("foo/t01.cbz")).await.unwrap();

        assert!(!archive.exists());
        assert!(fx.completed.join("foo").join("t01.cbz").exists());
        assert!(store.books().await.unwrap().is_empty());
        let item = store.reading_item(&path("foo/t01.cbz")).await.unwrap().unwrap();
        assert!(item.completed);
        assert_eq!(item.page, crate::model::COMPLETED_PAGE);
        assert!(!cache_folder.exists());
    }

    #[tokio::test]
    async fn relocation_keeps_same_named_books_from_different_directories_apart() {
        let fx = Fixture::new();
        let foo = fixture(&fx.source, "foo/t01.cbz", &[("p1.jpg", b"foo pages")]);
        let bar = fixture(&fx.source, "bar/t01.cbz", &[("p1.jpg", b"bar pages")]);
        let foo_bytes = std::fs::read(&foo).unwrap();
        let bar_bytes = std::fs::read(&bar).unwrap();
        let store = fx.store_with_completed();
        store.upsert_book(book("foo/t01.cbz", &["p1.jpg"])).await.unwrap();
        store.upsert_book(book("bar/t01.cbz", &["p1.jpg"])).await.unwrap();

        store.mark_as_read(&path("foo/t01.cbz")).await.unwrap();
        store.mark_as_read(&path("bar/t01.cbz")).await.unwrap();

        // Both archives survive, each under its own mirrored directory.
        assert_eq!(std::fs::read(fx.completed.join("foo/t01.cbz")).unwrap(), foo_bytes);
        assert_eq!(std::fs::read(fx.completed.join("bar/t01.cbz")).unwrap(), bar_bytes);
    }

    #[tokio::test]
    async fn mark_as_read_without_completed_folder_keeps_the_book() {
        let fx = Fixture::new();
        let archive = fixture(&fx.source, "t01.cbz", &[("p1.jpg", b"one")]);
        let store = fx.store();
        store.upsert_book(book("t01.cbz", &["p1.jpg"])).await.unwrap();
        store.mark_as_read(&path("t01.cbz")).await.unwrap();
        assert!(archive.exists());
        assert_eq!(store.books().await.unwrap().len(), 1);
        assert!(store.reading_item(&path("t01.cbz")).await.unwrap().unwrap().completed);
    }

    #[tokio::test]
    async fn remove_from_reading_list_deletes_the_entry() {
        let fx = Fixture::new();
        let store = fx.store();
        store.update_reading_progress(path("t01.cbz"), 1).await.unwrap();
        store.remove_from_reading_list(&path("t01.cbz")).await.unwrap();
        assert!(store.reading_list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn remove_books_except_reconciles_against_observed_paths() {
        let fx = Fixture::new();
        let store = fx.store();
        store.upsert_book(book("keep.cbz", &["p1.jpg"])).await.unwrap();
        store.upsert_book(book("drop.cbz", &["p1.jpg"])).await.unwrap();
        let observed: HashSet<BookPath> = [path("keep.cbz")].into_iter().collect();
        let removed = store.remove_books_except(&observed).await.unwrap();
        assert_eq!(removed, vec![path("drop.cbz")]);
        assert_eq!(store.books().await.unwrap().len(), 1);
    }
}
