//! Comic Archive Error Types
//!
//! This module provides structured errors using `exn` for automatic location
//! tracking and error tree construction.

use derive_more::{Display, Error};
use std::io::Error as IoError;
use std::path::PathBuf;

/// An archive error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for archive operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// These describe what the caller should *do*, not what went wrong internally.
#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// Archive file does not exist
    #[display("archive not found: {}", _0.display())]
    NotFound(#[error(not(source))] PathBuf),
    /// Archive data is corrupt or not a zip container. Don't retry with the
    /// same input.
    #[display("invalid or corrupted archive: {}", _0.display())]
    InvalidArchive(#[error(not(source))] PathBuf),
    /// The named entry is not present in the archive.
    #[display("no such entry: {_0}")]
    EntryNotFound(#[error(not(source))] String),
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
        matches!(self, Self::Io(_))
    }
}
