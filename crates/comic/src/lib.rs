//! Comic archive access.
//!
//! Comic books are distributed as zip containers full of page images
//! (`.cbz`, or plain `.zip`). This crate wraps the [`zip`] crate behind a
//! small [`ComicArchive`] type providing:
//!
//! - **Entry listing** in natural order ([`ComicArchive::entry_names`]) —
//!   archive storage order is never exposed, since it rarely matches the
//!   order pages should be presented in
//! - **Single-entry reads** ([`ComicArchive::read_entry`]) for cover
//!   extraction
//! - **Whole-archive extraction** ([`ComicArchive::extract_into`]) for the
//!   page cache
//! - **Whole-file digests** ([`digest_file`]) using streaming BLAKE3

pub mod error;

use crate::error::{ErrorKind, Result};
use exn::ResultExt;
use std::fs::File;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use zip::ZipArchive;

/// File extensions recognized as comic archives (lowercase, without dot).
pub const ARCHIVE_EXTENSIONS: &[&str] = &["cbz", "zip"];

/// File extensions recognized as page images (lowercase, without dot).
pub const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "gif", "webp", "bmp", "avif"];

fn extension_matches(name: &str, extensions: &[&str]) -> bool {
    Path::new(name)
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| extensions.contains(&ext.to_lowercase().as_str()))
}

/// Whether a filesystem path looks like a comic archive.
#[must_use]
pub fn is_archive(path: impl AsRef<Path>) -> bool {
    path.as_ref().to_str().is_some_and(|name| extension_matches(name, ARCHIVE_EXTENSIONS))
}

/// Whether an archive entry name looks like a page image.
///
/// # Examples
///
/// ```
/// assert!(longbox_comic::is_image("pages/001.JPG"));
/// assert!(!longbox_comic::is_image("ComicInfo.xml"));
/// ```
#[must_use]
pub fn is_image(entry_name: &str) -> bool {
    extension_matches(entry_name, IMAGE_EXTENSIONS)
}

/// A comic archive opened for reading.
///
/// # Examples
///
/// ```no_run
/// # fn example() -> longbox_comic::error::Result<()> {
/// let mut comic = longbox_comic::ComicArchive::open("library/foo/t01.cbz")?;
/// let pages = comic.entry_names();
/// let first = comic.read_entry(&pages[0])?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct ComicArchive {
    path: PathBuf,
    archive: ZipArchive<File>,
}

impl ComicArchive {
    /// Open an archive file for reading.
    ///
    /// # Errors
    /// [`ErrorKind::NotFound`] if the file is missing,
    /// [`ErrorKind::InvalidArchive`] if it is not a readable zip container.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path).map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => ErrorKind::NotFound(path.clone()),
            _ => ErrorKind::Io(e),
        })?;
        let archive = ZipArchive::new(file).or_raise(|| ErrorKind::InvalidArchive(path.clone()))?;
        Ok(Self { path, archive })
    }

    /// The filesystem path this archive was opened from.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// All file entry names, natural-sorted case-insensitively.
    ///
    /// Directory entries are dropped. The zip central directory preserves
    /// whatever order the archive was authored in, which for comics scraped
    /// from who-knows-where is as good as random.
    pub fn entry_names(&self) -> Vec<String> {
        let mut names: Vec<String> =
            self.archive.file_names().filter(|name| !name.ends_with('/')).map(str::to_string).collect();
        names.sort_by(|a, b| longbox_natord::compare(a, b));
        names
    }

    /// Read the full contents of one entry.
    pub fn read_entry(&mut self, name: &str) -> Result<Vec<u8>> {
        let mut entry = match self.archive.by_name(name) {
            Ok(entry) => entry,
            Err(zip::result::ZipError::FileNotFound) => exn::bail!(ErrorKind::EntryNotFound(name.to_string())),
            Err(_) => exn::bail!(ErrorKind::InvalidArchive(self.path.clone())),
        };
        let mut data = Vec::with_capacity(entry.size() as usize);
        entry.read_to_end(&mut data).or_raise(|| ErrorKind::InvalidArchive(self.path.clone()))?;
        Ok(data)
    }

    /// Extract every entry into `directory`, creating it if needed.
    ///
    /// Delegates to the zip crate's extractor, which sanitizes entry paths so
    /// a hostile archive cannot write outside the target directory.
    pub fn extract_into(&mut self, directory: impl AsRef<Path>) -> Result<()> {
        let directory = directory.as_ref();
        tracing::debug!(archive = %self.path.display(), into = %directory.display(), "Extracting archive");
        self.archive.extract(directory).or_raise(|| ErrorKind::InvalidArchive(self.path.clone()))?;
        Ok(())
    }
}

/// Streaming BLAKE3 hex digest of a whole file.
///
/// This identifies the archive *as stored* (compressed container bytes), not
/// its decompressed contents; it only needs to be cheap and stable so the
/// indexer can detect changed files.
pub fn digest_file(path: impl AsRef<Path>) -> Result<String> {
    let path = path.as_ref();
    let mut file = File::open(path).map_err(|e| match e.kind() {
        io::ErrorKind::NotFound => ErrorKind::NotFound(path.to_path_buf()),
        _ => ErrorKind::Io(e),
    })?;
    let mut hasher = blake3::Hasher::new();
    io::copy(&mut file, &mut hasher).map_err(ErrorKind::Io)?;
    Ok(hasher.finalize().to_hex().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::io::Write;

    /// Author a small cbz fixture with entries in the given (storage) order.
    fn fixture(dir: &Path, name: &str, entries: &[(&str, &[u8])]) -> PathBuf {
        let path = dir.join(name);
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

    #[rstest]
    #[case("foo/t01.cbz", true)]
    #[case("foo/t01.CBZ", true)]
    #[case("t01.zip", true)]
    #[case("t01.cbr", false)]
    #[case("t01", false)]
    fn archive_detection(#[case] path: &str, #[case] expected: bool) {
        assert_eq!(is_archive(path), expected);
    }

    #[rstest]
    #[case("001.jpg", true)]
    #[case("pages/001.PNG", true)]
    #[case("cover.webp", true)]
    #[case("ComicInfo.xml", false)]
    #[case("notes.txt", false)]
    #[case("jpg", false)]
    fn image_detection(#[case] name: &str, #[case] expected: bool) {
        assert_eq!(is_image(name), expected);
    }

    #[test]
    fn entries_are_natural_sorted_not_storage_ordered() {
        let dir = tempfile::tempdir().unwrap();
        let path = fixture(
            dir.path(),
            "t01.cbz",
            &[("p10.jpg", b"ten"), ("p2.jpg", b"two"), ("P1.jpg", b"one"), ("credits/", b"")],
        );
        let comic = ComicArchive::open(&path).unwrap();
        assert_eq!(comic.entry_names(), vec!["P1.jpg", "p2.jpg", "p10.jpg"]);
    }

    #[test]
    fn read_entry_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = fixture(dir.path(), "t01.cbz", &[("p1.jpg", b"page one")]);
        let mut comic = ComicArchive::open(&path).unwrap();
        assert_eq!(comic.read_entry("p1.jpg").unwrap(), b"page one");
        let err = comic.read_entry("missing.jpg").unwrap_err();
        assert!(matches!(&*err, ErrorKind::EntryNotFound(_)));
    }

    #[test]
    fn extract_into_materializes_all_entries() {
        let dir = tempfile::tempdir().unwrap();
        let path = fixture(dir.path(), "t01.cbz", &[("p1.jpg", b"one"), ("sub/p2.jpg", b"two")]);
        let out = dir.path().join("out");
        let mut comic = ComicArchive::open(&path).unwrap();
        comic.extract_into(&out).unwrap();
        assert_eq!(std::fs::read(out.join("p1.jpg")).unwrap(), b"one");
        assert_eq!(std::fs::read(out.join("sub/p2.jpg")).unwrap(), b"two");
    }

    #[test]
    fn open_rejects_non_archives() {
        let dir = tempfile::tempdir().unwrap();
        let bogus = dir.path().join("bogus.cbz");
        std::fs::write(&bogus, b"definitely not a zip").unwrap();
        let err = ComicArchive::open(&bogus).unwrap_err();
        assert!(matches!(&*err, ErrorKind::InvalidArchive(_)));
        let err = ComicArchive::open(dir.path().join("missing.cbz")).unwrap_err();
        assert!(matches!(&*err, ErrorKind::NotFound(_)));
    }

    #[test]
    fn digest_is_stable_and_content_sensitive() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.cbz");
        let b = dir.path().join("b.cbz");
        std::fs::write(&a, b"same bytes").unwrap();
        std::fs::write(&b, b"same bytes").unwrap();
        assert_eq!(digest_file(&a).unwrap(), digest_file(&b).unwrap());
        std::fs::write(&b, b"different").unwrap();
        assert_ne!(digest_file(&a).unwrap(), digest_file(&b).unwrap());
    }
}
