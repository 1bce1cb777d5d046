//! The durable comic catalog.
//!
//! This crate owns everything the system remembers: the [`Book`] records,
//! reading progress, indexing errors, the two compressed snapshot files they
//! persist to, and the [`CatalogStore`] serializing access to all of it.
//! The [`suggest`] module answers "what should I read next" from the same
//! data.

pub mod error;
mod model;
mod path;
pub(crate) mod snapshot;
mod store;
pub mod suggest;

pub use crate::model::{Book, COMPLETED_PAGE, Catalog, IndexingError, ReadingListItem};
pub use crate::path::BookPath;
pub use crate::store::CatalogStore;
