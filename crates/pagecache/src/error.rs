//! Page Cache Error Types
//!
//! This module provides structured errors using `exn` for automatic location
//! tracking and error tree construction.

use derive_more::{Display, Error};
use std::io::Error as IoError;
use std::path::PathBuf;

/// A page cache error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for page cache operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// These describe what the caller should *do*, not what went wrong internally.
#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// The cache root directory could not be created or used.
    #[display("unusable cache root: {}", _0.display())]
    CacheRoot(#[error(not(source))] PathBuf),
    /// Extracting the archive into a staging directory failed.
    #[display("extraction failed: {}", _0.display())]
    Extraction(#[error(not(source))] PathBuf),
    /// The extracted staging directory could not be promoted into place.
    #[display("promotion failed: {}", _0.display())]
    Promotion(#[error(not(source))] PathBuf),
    /// The requested entry does not exist inside the cached folder.
    #[display("entry not in cache: {_0}")]
    EntryMissing(#[error(not(source))] String),
    /// The entry name attempts to escape its cache folder.
    #[display("invalid entry name: {_0}")]
    InvalidEntry(#[error(not(source))] String),
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
        matches!(self, Self::Io(_) | Self::Extraction(_) | Self::Promotion(_))
    }
}
