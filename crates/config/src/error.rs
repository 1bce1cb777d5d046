//! Configuration Error Types
//!
//! This module provides structured errors using `exn` for automatic location
//! tracking and error tree construction.

use derive_more::{Display, Error};

/// A configuration error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for configuration operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// The configuration file or environment could not be read or parsed.
    #[display("failed to read configuration: {_0}")]
    Load(figment::Error),
    /// The configuration parsed fine but fails a semantic check.
    #[display("invalid configuration: {_0}")]
    Invalid(#[error(not(source))] String),
    /// No platform directories could be derived for defaults.
    #[display("cannot determine platform directories for defaults")]
    NoHome,
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        false
    }
}
