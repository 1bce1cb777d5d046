use crate::model::{Book, ReadingListItem};
use crate::path::BookPath;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use time::OffsetDateTime;

/// A failed attempt to index one archive.
///
/// Superseded (removed) as soon as the book indexes successfully; its
/// presence also forces the indexer to retry the file even when its size has
/// not changed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexingError {
    pub path: BookPath,
    pub message: String,
}

/// The aggregate root: everything the system knows about the library.
///
/// Invariants: at most one [`Book`], one [`ReadingListItem`], and one
/// [`IndexingError`] per path; books are always enumerable in natural path
/// order.
///
/// Every mutator replaces the relevant list wholesale instead of editing it
/// in place, so a clone handed out before a mutation can never observe a
/// partially-applied change.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Catalog {
    last_indexation: Option<OffsetDateTime>,
    books: Vec<Book>,
    reading: Vec<ReadingListItem>,
    errors: Vec<IndexingError>,
}

impl Catalog {
    pub fn new(
        last_indexation: Option<OffsetDateTime>,
        mut books: Vec<Book>,
        reading: Vec<ReadingListItem>,
        errors: Vec<IndexingError>,
    ) -> Self {
        books.sort_by(|a, b| a.path.cmp(&b.path));
        Self { last_indexation, books, reading, errors }
    }

    pub fn last_indexation(&self) -> Option<OffsetDateTime> {
        self.last_indexation
    }

    /// All books, in natural path order.
    pub fn books(&self) -> &[Book] {
        &self.books
    }

    pub fn reading_list(&self) -> &[ReadingListItem] {
        &self.reading
    }

    pub fn errors(&self) -> &[IndexingError] {
        &self.errors
    }

    pub fn book(&self, path: &BookPath) -> Option<&Book> {
        self.books.iter().find(|book| &book.path == path)
    }

    pub fn reading_item(&self, path: &BookPath) -> Option<&ReadingListItem> {
        self.reading.iter().find(|item| &item.path == path)
    }

    /// Insert or replace a book by path, clearing any indexing error recorded
    /// for that path.
    pub fn upsert_book(&mut self, book: Book) {
        let path = book.path.clone();
        let mut books: Vec<Book> = self.books.iter().filter(|existing| existing.path != path).cloned().collect();
        books.push(book);
        books.sort_by(|a, b| a.path.cmp(&b.path));
        self.books = books;
        self.errors = self.errors.iter().filter(|error| error.path != path).cloned().collect();
    }

    /// Remove a book and its reading-list entry. Returns whether a book
    /// actually existed at the path.
    pub fn remove_book(&mut self, path: &BookPath) -> bool {
        let existed = self.book(path).is_some();
        self.books = self.books.iter().filter(|book| &book.path != path).cloned().collect();
        self.remove_reading(path);
        existed
    }

    /// Drop every book whose path is not in `observed`, returning the removed
    /// paths (reading-list entries go with them).
    pub fn retain_books(&mut self, observed: &HashSet<BookPath>) -> Vec<BookPath> {
        let removed: Vec<BookPath> =
            self.books.iter().map(|book| book.path.clone()).filter(|path| !observed.contains(path)).collect();
        for path in &removed {
            self.remove_book(path);
        }
        removed
    }

    pub fn upsert_error(&mut self, error: IndexingError) {
        let mut errors: Vec<IndexingError> =
            self.errors.iter().filter(|existing| existing.path != error.path).cloned().collect();
        errors.push(error);
        self.errors = errors;
    }

    pub fn upsert_reading(&mut self, item: ReadingListItem) {
        let mut reading: Vec<ReadingListItem> =
            self.reading.iter().filter(|existing| existing.path != item.path).cloned().collect();
        reading.push(item);
        self.reading = reading;
    }

    /// Returns whether an entry existed.
    pub fn remove_reading(&mut self, path: &BookPath) -> bool {
        let existed = self.reading_item(path).is_some();
        self.reading = self.reading.iter().filter(|item| &item.path != path).cloned().collect();
        existed
    }

    pub fn stamp_indexation(&mut self, timestamp: OffsetDateTime) {
        self.last_indexation = Some(timestamp);
    }
}
