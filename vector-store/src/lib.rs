//! # Sidekick Vector Store
//!
//! LanceDB-backed storage for embedded code chunks. Rows are keyed by the
//! content-addressed identity `(path, cache_key, chunk_index)` plus the tag
//! columns `(dir, branch)`, so the same content indexed under two branches
//! is two cheap rows sharing one embedding computation: re-linking content
//! to a new tag or a new path copies rows inside the store instead of
//! re-embedding.
//!
//! The store owns its directory layout; the indexer only ever creates the
//! directory and, on `clear`, removes it recursively.

mod error;
mod store;

pub use error::VectorStoreError;
pub use store::{VectorHit, VectorRow, VectorStore, VectorStoreConfig};
