//! Background library maintenance.
//!
//! This crate keeps the catalog in sync with the archive tree on disk: the
//! [`Indexer`] walks the tree on a timer (or on demand), reconciles the
//! [`CatalogStore`](longbox_catalog::CatalogStore) against what it finds, and
//! drives the cover-extraction collaborator defined in [`covers`].

pub mod covers;
pub mod error;
mod indexer;

pub use crate::covers::{CoverConfig, CoverRenderer, RendererHandle, cover_file_name};
pub use crate::indexer::{Indexer, IndexerHandle, RunOutcome, WarmState};

#[cfg(any(test, feature = "mock"))]
pub use crate::covers::PassThroughRenderer;
