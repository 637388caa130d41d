//! # Sidekick Index Catalog
//!
//! The durable heart of the incremental indexer: a single SQLite database
//! holding the *tag catalog* (which file version is indexed under which
//! workspace/branch/artifact tag) and the *global cache* (which tags
//! reference a given content hash). The chunk, full-text, and snippet
//! artifact tables live in the same file so their writers share one
//! connection and one WAL.
//!
//! ## Example
//!
//! ```no_run
//! use sidekick_index_catalog::{ApplyKind, Database, Result, SqliteCatalog};
//! use sidekick_protocol::{ArtifactId, PathAndCacheKey, Tag};
//!
//! fn main() -> Result<()> {
//!     let db = Database::open(std::path::Path::new(".sidekick/index.sqlite"))?;
//!     let catalog = SqliteCatalog::new(db);
//!
//!     let tag = Tag::new("file:///ws", "main", ArtifactId::Chunks);
//!     let item = PathAndCacheKey::new("file:///ws/a.rs", "deadbeef");
//!     catalog.apply(&tag, &[item], ApplyKind::Compute)?;
//!     Ok(())
//! }
//! ```

mod catalog;
mod classify;
mod db;
mod error;

pub use catalog::{ApplyKind, CatalogRow, SqliteCatalog};
pub use classify::should_clear_indexes;
pub use db::{now_ms, Database};
pub use error::{CatalogError, Result};
