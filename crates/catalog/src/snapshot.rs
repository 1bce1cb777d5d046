//! Durable snapshots of the catalog.
//!
//! Two independent, versionless artifacts, each a gzip-compressed JSON
//! document overwritten wholesale on every relevant mutation:
//!
//! - `catalog.json.gz` — indexation timestamp, books, indexing errors
//! - `reading-list.json.gz` — reading progress items
//!
//! Writes are atomic: serialize to a temp sibling, then rename over the
//! canonical path. The rename is retried with bounded exponential backoff to
//! absorb transient sharing violations (antivirus scanners and backup agents
//! love to hold these files open for a moment). Reads treat an absent file
//! as "no prior state" and retry transient I/O the same way.

use crate::error::{ErrorKind, Result};
use crate::model::{Book, IndexingError, ReadingListItem};
use exn::ResultExt;
use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use time::OffsetDateTime;
use tokio::fs;

/// Canonical file name of the catalog snapshot inside the index root.
pub const CATALOG_FILE: &str = "catalog.json.gz";
/// Canonical file name of the reading-list snapshot inside the index root.
pub const READING_LIST_FILE: &str = "reading-list.json.gz";

const ATTEMPTS: u32 = 3;

static TEMP_COUNTER: AtomicU64 = AtomicU64::new(0);

fn backoff(attempt: u32) -> Duration {
    Duration::from_millis(50u64 << (attempt - 1))
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub(crate) struct CatalogSnapshot {
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub last_indexation: Option<OffsetDateTime>,
    #[serde(default)]
    pub books: Vec<Book>,
    #[serde(default)]
    pub indexing_errors: Vec<IndexingError>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub(crate) struct ReadingListSnapshot {
    #[serde(default)]
    pub items: Vec<ReadingListItem>,
}

/// Load a snapshot, returning `None` when no file exists yet.
pub(crate) async fn load<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    let mut attempt = 0;
    let compressed = loop {
        attempt += 1;
        match fs::read(path).await {
            Ok(bytes) => break bytes,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(err) if attempt < ATTEMPTS => {
                tracing::warn!(%err, attempt, path = %path.display(), "Snapshot read failed; retrying");
                tokio::time::sleep(backoff(attempt)).await;
            },
            Err(err) => return Err(exn::Exn::from(ErrorKind::Io(err))),
        }
    };
    let mut decoder = GzDecoder::new(compressed.as_slice());
    let mut json = Vec::new();
    decoder.read_to_end(&mut json).or_raise(|| ErrorKind::Corrupt(path.to_path_buf()))?;
    let snapshot = serde_json::from_slice(&json).or_raise(|| ErrorKind::Corrupt(path.to_path_buf()))?;
    Ok(Some(snapshot))
}

/// Persist a snapshot atomically, replacing whatever was there before.
pub(crate) async fn persist<T: Serialize>(path: &Path, snapshot: &T) -> Result<()> {
    let json = serde_json::to_vec(snapshot).or_raise(|| ErrorKind::Persist(path.to_path_buf()))?;
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(&json).map_err(ErrorKind::Io)?;
    let compressed = encoder.finish().map_err(ErrorKind::Io)?;

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).await.map_err(ErrorKind::Io)?;
    }
    let temp = temp_sibling(path);
    fs::write(&temp, &compressed).await.map_err(ErrorKind::Io)?;
    let mut attempt = 0;
    loop {
        attempt += 1;
        match fs::rename(&temp, path).await {
            Ok(()) => return Ok(()),
            Err(err) if attempt < ATTEMPTS => {
                tracing::warn!(%err, attempt, path = %path.display(), "Snapshot rename failed; retrying");
                tokio::time::sleep(backoff(attempt)).await;
            },
            Err(err) => {
                // The canonical file is untouched; only the temp leaks.
                _ = fs::remove_file(&temp).await;
                return Err(err).or_raise(|| ErrorKind::Persist(path.to_path_buf()));
            },
        }
    }
}

fn temp_sibling(path: &Path) -> PathBuf {
    let n = TEMP_COUNTER.fetch_add(1, Ordering::Relaxed);
    let name = path.file_name().map(|name| name.to_string_lossy()).unwrap_or_default();
    path.with_file_name(format!("{name}.tmp-{}-{n}", std::process::id()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::path::BookPath;

    fn sample_catalog() -> CatalogSnapshot {
        CatalogSnapshot {
            last_indexation: Some(OffsetDateTime::from_unix_timestamp(1_700_000_000).unwrap()),
            books: vec![Book::new(
                BookPath::parse("foo/t01.cbz").unwrap(),
                "digest",
                42,
                vec!["p1.jpg".to_string()],
            )],
            indexing_errors: vec![IndexingError {
                path: BookPath::parse("bad.cbz").unwrap(),
                message: "not a zip".to_string(),
            }],
        }
    }

    #[tokio::test]
    async fn round_trips_both_snapshots() {
        let dir = tempfile::tempdir().unwrap();
        let catalog_file = dir.path().join(CATALOG_FILE);
        persist(&catalog_file, &sample_catalog()).await.unwrap();
        let loaded: CatalogSnapshot = load(&catalog_file).await.unwrap().unwrap();
        assert_eq!(loaded.books, sample_catalog().books);
        assert_eq!(loaded.indexing_errors, sample_catalog().indexing_errors);
        assert_eq!(loaded.last_indexation, sample_catalog().last_indexation);

        let reading_file = dir.path().join(READING_LIST_FILE);
        let reading = ReadingListSnapshot {
            items: vec![ReadingListItem::in_progress(BookPath::parse("foo/t01.cbz").unwrap(), 3)],
        };
        persist(&reading_file, &reading).await.unwrap();
        let loaded: ReadingListSnapshot = load(&reading_file).await.unwrap().unwrap();
        assert_eq!(loaded.items, reading.items);
    }

    #[tokio::test]
    async fn absent_file_is_no_prior_state() {
        let dir = tempfile::tempdir().unwrap();
        let loaded: Option<CatalogSnapshot> = load(&dir.path().join(CATALOG_FILE)).await.unwrap();
        assert!(loaded.is_none());
    }

    #[tokio::test]
    async fn snapshots_are_gzip_compressed() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join(CATALOG_FILE);
        persist(&file, &sample_catalog()).await.unwrap();
        let bytes = std::fs::read(&file).unwrap();
        assert_eq!(&bytes[..2], &[0x1F, 0x8B]);
    }

    #[tokio::test]
    async fn corrupt_snapshot_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join(CATALOG_FILE);
        std::fs::write(&file, b"not gzip at all").unwrap();
        let err = load::<CatalogSnapshot>(&file).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::Corrupt(_)));
    }

    #[tokio::test]
    async fn stray_temp_file_never_shadows_the_canonical_snapshot() {
        // Simulates a crash between temp-write and rename: the canonical file
        // from the previous persist stays readable.
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join(CATALOG_FILE);
        persist(&file, &sample_catalog()).await.unwrap();
        std::fs::write(temp_sibling(&file), b"half-written garbage").unwrap();
        let loaded: CatalogSnapshot = load(&file).await.unwrap().unwrap();
        assert_eq!(loaded.books, sample_catalog().books);
    }

    #[tokio::test]
    async fn persist_overwrites_wholesale() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join(CATALOG_FILE);
        persist(&file, &sample_catalog()).await.unwrap();
        persist(&file, &CatalogSnapshot::default()).await.unwrap();
        let loaded: CatalogSnapshot = load(&file).await.unwrap().unwrap();
        assert!(loaded.books.is_empty());
        assert!(loaded.last_indexation.is_none());
    }
}
