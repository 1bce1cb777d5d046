//! "Read next" suggestions.
//!
//! A pure function over the catalog's books and reading list — no I/O, no
//! locking. The heuristic is directory adjacency: finishing a book makes its
//! shelf-mates the most likely next read, then books shelved underneath that
//! directory, then anything in the same top-level series folder.

use crate::model::{Book, ReadingListItem};
use crate::path::BookPath;
use std::collections::HashSet;

/// Suggest what to read next.
///
/// For each completed item, most-recently-read first, candidates are books
/// with no reading-list entry at all, searched in the completed book's
/// directory, then in proper subdirectories of it, then anywhere under the
/// same top-level directory — stopping at the first level that yields any.
/// Results are de-duplicated across completed items and returned in natural
/// path order.
pub fn read_next(books: &[Book], reading: &[ReadingListItem]) -> Vec<Book> {
    let listed: HashSet<&BookPath> = reading.iter().map(|item| &item.path).collect();
    let unread: Vec<&Book> = books.iter().filter(|book| !listed.contains(&book.path)).collect();

    let mut completed: Vec<&ReadingListItem> = reading.iter().filter(|item| item.completed).collect();
    completed.sort_by(|a, b| b.last_read.cmp(&a.last_read));

    let mut seen: HashSet<&BookPath> = HashSet::new();
    let mut suggestions: Vec<&Book> = Vec::new();
    for item in completed {
        for book in candidates_for(item, &unread) {
            if seen.insert(&book.path) {
                suggestions.push(book);
            }
        }
    }
    suggestions.sort_by(|a, b| a.path.cmp(&b.path));
    suggestions.into_iter().cloned().collect()
}

/// The fallback chain for one completed book. Each level is only consulted
/// when every previous level came up empty.
fn candidates_for<'a>(item: &ReadingListItem, unread: &[&'a Book]) -> Vec<&'a Book> {
    let directory = item.path.directory();
    let same_directory: Vec<&Book> =
        unread.iter().copied().filter(|book| book.path.directory() == directory).collect();
    if !same_directory.is_empty() {
        return same_directory;
    }
    let below: Vec<&Book> =
        unread.iter().copied().filter(|book| is_below(book.path.directory(), directory)).collect();
    if !below.is_empty() {
        return below;
    }
    let top = item.path.first_directory();
    unread.iter().copied().filter(|book| book.path.first_directory() == top).collect()
}

/// Whether `child` is a proper subdirectory of `parent`.
fn is_below(child: &str, parent: &str) -> bool {
    match parent.is_empty() {
        // Everything below the root except the root itself.
        true => !child.is_empty(),
        false => child.len() > parent.len() && child.starts_with(parent) && child.as_bytes()[parent.len()] == b'/',
    }
}
