mod book;
mod catalog;
mod reading;

pub use self::book::Book;
pub use self::catalog::{Catalog, IndexingError};
pub use self::reading::{COMPLETED_PAGE, ReadingListItem};
