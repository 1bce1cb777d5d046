use crate::path::BookPath;
use serde::{Deserialize, Serialize};

/// One comic archive known to the catalog.
///
/// The entry list is natural-sorted at index time — the archive's native
/// storage order is never persisted. Pages are the image-typed subset of the
/// entries; other entries (metadata files, thumbnails databases) stay on the
/// record but are never served as pages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Book {
    pub path: BookPath,
    pub title: String,
    /// BLAKE3 digest of the whole archive file, used by the indexer to skip
    /// unchanged books.
    pub digest: String,
    /// Archive file size in bytes.
    pub size: u64,
    /// All file entries, pre-sorted in natural order.
    pub entries: Vec<String>,
    /// Cover image file name inside the covers folder, when cover extraction
    /// is enabled and succeeded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cover: Option<String>,
}

impl Book {
    /// Create a book record; the title is derived from the path's file stem.
    pub fn new(path: BookPath, digest: impl Into<String>, size: u64, entries: Vec<String>) -> Self {
        let title = path.stem().to_string();
        Self { path, title, digest: digest.into(), size, entries, cover: None }
    }

    #[must_use]
    pub fn with_cover(mut self, cover: impl Into<String>) -> Self {
        self.cover = Some(cover.into());
        self
    }

    /// The image-typed entries, in reading order.
    pub fn pages(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(String::as_str).filter(|name| longbox_comic::is_image(name))
    }

    /// Entry name of the page at `index`, if in range.
    #[must_use]
    pub fn page(&self, index: usize) -> Option<&str> {
        self.pages().nth(index)
    }

    #[must_use]
    pub fn page_count(&self) -> usize {
        self.pages().count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn book(entries: &[&str]) -> Book {
        let path = BookPath::parse("foo/t01.cbz").unwrap();
        Book::new(path, "digest", 42, entries.iter().map(|s| s.to_string()).collect())
    }

    #[test]
    fn title_comes_from_file_stem() {
        assert_eq!(book(&[]).title, "t01");
    }

    #[test]
    fn pages_are_image_entries_only() {
        let book = book(&["ComicInfo.xml", "p1.jpg", "p2.png", "notes.txt"]);
        assert_eq!(book.pages().collect::<Vec<_>>(), vec!["p1.jpg", "p2.png"]);
        assert_eq!(book.page_count(), 2);
        assert_eq!(book.page(1), Some("p2.png"));
        assert_eq!(book.page(2), None);
    }
}
