//! Library Error Types
//!
//! This module provides structured errors using `exn` for automatic location
//! tracking and error tree construction.

use derive_more::{Display, Error};
use std::io::Error as IoError;
use std::path::PathBuf;

/// A library error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for library operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// These describe what the caller should *do*, not what went wrong internally.
#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// Opening, listing, or digesting one archive failed. Recorded as an
    /// indexing error on that book; never aborts a run.
    #[display("archive error: {_0}")]
    Archive(#[error(not(source))] String),
    /// The cover-extraction collaborator failed for one book. Recorded like
    /// any other per-book failure.
    #[display("cover extraction failed: {_0}")]
    Cover(#[error(not(source))] String),
    /// A catalog store operation failed (hydration or persistence). Aborts
    /// the in-flight run.
    #[display("catalog store error")]
    Store,
    /// Walking the source tree failed.
    #[display("cannot enumerate archives under {}", _0.display())]
    Discover(#[error(not(source))] PathBuf),
    /// The first indexing run never completed successfully.
    #[display("catalog never became warm")]
    ColdCatalog,
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
        matches!(self, Self::Io(_) | Self::Store | Self::Discover(_))
    }
}
