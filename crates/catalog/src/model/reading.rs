use crate::path::BookPath;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// Sentinel page index recorded on completed items whose position is no
/// longer tracked.
pub const COMPLETED_PAGE: i64 = -1;

/// Reading progress for one book.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadingListItem {
    pub path: BookPath,
    /// Current page index (`>= 0`), or [`COMPLETED_PAGE`] once finished.
    pub page: i64,
    pub completed: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub last_read: OffsetDateTime,
}

impl ReadingListItem {
    /// An in-progress item at `page`, timestamped now.
    pub fn in_progress(path: BookPath, page: i64) -> Self {
        Self { path, page, completed: false, last_read: OffsetDateTime::now_utc() }
    }

    /// A completed item (position no longer tracked), timestamped now.
    pub fn completed(path: BookPath) -> Self {
        Self { path, page: COMPLETED_PAGE, completed: true, last_read: OffsetDateTime::now_utc() }
    }
}
