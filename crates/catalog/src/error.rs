//! Catalog Error Types
//!
//! This module provides structured errors using `exn` for automatic location
//! tracking and error tree construction.

use derive_more::{Display, Error};
use std::io::Error as IoError;
use std::path::PathBuf;

/// A catalog error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for catalog operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// These describe what the caller should *do*, not what went wrong internally.
#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// A path is not a valid catalog path (escapes the root, empty, NUL).
    /// Structural: never retry.
    #[display("invalid book path: {_0}")]
    InvalidPath(#[error(not(source))] String),
    /// No book exists in the catalog at the given path. Structural.
    #[display("unknown book: {_0}")]
    UnknownBook(#[error(not(source))] String),
    /// The requested page index is past the end of the book. Structural.
    #[display("page index out of range: {_0}")]
    PageOutOfRange(#[error(not(source))] usize),
    /// Reading progress must be a non-negative page index. Structural.
    #[display("invalid page index: {_0}")]
    InvalidPage(#[error(not(source))] i64),
    /// A snapshot file exists but cannot be decoded. Don't retry.
    #[display("corrupt snapshot: {}", _0.display())]
    Corrupt(#[error(not(source))] PathBuf),
    /// Writing a snapshot failed after retries.
    #[display("failed to persist snapshot: {}", _0.display())]
    Persist(#[error(not(source))] PathBuf),
    /// Moving a completed archive to the completed folder failed.
    #[display("failed to relocate archive: {}", _0.display())]
    Relocate(#[error(not(source))] PathBuf),
    /// The page cache could not materialize the requested page.
    #[display("page cache error")]
    Cache,
    /// Underlying I/O error
    #[display("I/O error: {_0}")]
    Io(IoError),
}
impl From<IoError> for ErrorKind {
    fn from(err: IoError) -> Self {
        Self::Io(err)
    }
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Io(_) | Self::Persist(_) | Self::Relocate(_) | Self::Cache)
    }
}
