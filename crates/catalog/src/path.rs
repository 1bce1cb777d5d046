//! Canonical relative addressing of catalog entries.
//!
//! A [`BookPath`] is the identity of a book everywhere in the system: catalog
//! key, reading-list key, cache key, snapshot field. It is always a
//! normalized, forward-slash, root-relative string so that the same book
//! derives the same path on every platform and on every rescan.

use crate::error::{ErrorKind, Result};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::path::{Component, Path, PathBuf};

/// Normalized relative path of one book inside the library root.
///
/// Equality and hashing use the normalized string as-is; ordering is natural
/// and case-insensitive (see [`longbox_natord`]), with a byte-wise tiebreak
/// so the order stays total and consistent with `Eq`.
///
/// # Examples
///
/// ```
/// use longbox_catalog::BookPath;
///
/// let path = BookPath::parse("Series One\\Tome 02.cbz").unwrap();
/// assert_eq!(path.as_str(), "Series One/Tome 02.cbz");
/// assert_eq!(path.directory(), "Series One");
/// assert_eq!(path.first_directory(), "Series One");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BookPath(String);

impl BookPath {
    /// Build a path from a raw stored string, normalizing separators and
    /// resolving `.`/`..`/empty segments.
    ///
    /// # Errors
    /// [`ErrorKind::InvalidPath`] when the path escapes the root, normalizes
    /// to nothing, or contains a NUL byte.
    pub fn parse(raw: impl AsRef<str>) -> Result<Self> {
        let raw = raw.as_ref();
        if raw.contains('\0') {
            exn::bail!(ErrorKind::InvalidPath(raw.to_string()));
        }
        // Backslashes are treated as separators regardless of platform:
        // stored paths may have been produced on either.
        let mut segments: Vec<&str> = Vec::new();
        for segment in raw.split(['/', '\\']) {
            match segment {
                "" | "." => {},
                ".." => {
                    if segments.pop().is_none() {
                        exn::bail!(ErrorKind::InvalidPath(raw.to_string()));
                    }
                },
                normal => segments.push(normal),
            }
        }
        if segments.is_empty() {
            exn::bail!(ErrorKind::InvalidPath(raw.to_string()));
        }
        Ok(Self(segments.join("/")))
    }

    /// Build a path for an absolute file inside `root`.
    ///
    /// # Errors
    /// [`ErrorKind::InvalidPath`] when the file is not inside the root or is
    /// not valid UTF-8.
    pub fn from_root(root: &Path, file: &Path) -> Result<Self> {
        let Ok(relative) = file.strip_prefix(root) else {
            exn::bail!(ErrorKind::InvalidPath(file.display().to_string()));
        };
        let mut segments = Vec::new();
        for component in relative.components() {
            match component {
                Component::Normal(segment) => match segment.to_str() {
                    Some(segment) => segments.push(segment),
                    None => exn::bail!(ErrorKind::InvalidPath(file.display().to_string())),
                },
                Component::CurDir => {},
                _ => exn::bail!(ErrorKind::InvalidPath(file.display().to_string())),
            }
        }
        Self::parse(segments.join("/"))
    }

    /// The normalized forward-slash string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Everything before the final separator; empty for root-level books.
    #[must_use]
    pub fn directory(&self) -> &str {
        self.0.rsplit_once('/').map(|(dir, _)| dir).unwrap_or("")
    }

    /// The top-level directory component; empty for root-level books.
    #[must_use]
    pub fn first_directory(&self) -> &str {
        self.0.split_once('/').map(|(first, _)| first).unwrap_or("")
    }

    /// The final path component.
    #[must_use]
    pub fn file_name(&self) -> &str {
        self.0.rsplit_once('/').map(|(_, name)| name).unwrap_or(&self.0)
    }

    /// The file name without its extension, used as the book's title.
    #[must_use]
    pub fn stem(&self) -> &str {
        let name = self.file_name();
        name.rsplit_once('.').map(|(stem, _)| stem).filter(|stem| !stem.is_empty()).unwrap_or(name)
    }

    /// Map this logical path back to an absolute path under `root`.
    #[must_use]
    pub fn source_path(&self, root: &Path) -> PathBuf {
        let mut path = root.to_path_buf();
        path.extend(self.0.split('/'));
        path
    }
}

impl fmt::Display for BookPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Ord for BookPath {
    fn cmp(&self, other: &Self) -> Ordering {
        // Natural case-insensitive order for humans; the byte-wise tiebreak
        // keeps paths differing only in case or leading zeros totally ordered.
        longbox_natord::compare(&self.0, &other.0).then_with(|| self.0.cmp(&other.0))
    }
}
impl PartialOrd for BookPath {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
