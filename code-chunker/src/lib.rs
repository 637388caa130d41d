/*!
# Sidekick Code Chunker

Splits source files into chunks bounded by a model-token budget, for
embedding and full-text indexing.

Two modes:

- **Smart collapse**: when a tree-sitter grammar exists for the file's
  language, oversized syntax nodes are represented by collapsed forms
  (signatures with `{ ... }` bodies) while recursion makes sure every
  child is also covered by its own chunk.
- **Basic**: plain line accumulation bounded by the token budget.

## Example

```rust
use sidekick_code_chunker::{chunk_document, ChunkerConfig};

let chunks = chunk_document(
    "file:///ws/main.rs",
    "fn main() {\n    println!(\"hi\");\n}\n",
    &ChunkerConfig::default(),
    "deadbeef",
);
assert!(!chunks.is_empty());
```
*/

mod basic;
mod chunker;
mod config;
mod language;
mod smart;
mod token;

pub use chunker::chunk_document;
pub use config::ChunkerConfig;
pub use language::Language;
pub use token::TokenCounter;

use serde::{Deserialize, Serialize};

/// A chunk of a specific file version, bounded by the token budget.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Chunk {
    /// The chunk text; for collapsed forms this is a summary, not a
    /// verbatim slice of the file.
    pub content: String,

    /// First line covered, 0-based.
    pub start_line: usize,

    /// Last line covered, 0-based inclusive.
    pub end_line: usize,

    /// Absolute workspace URI of the source file.
    pub filepath: String,

    /// Cache key (SHA-256 hex) of the file version this chunk came from.
    pub digest: String,

    /// Position of this chunk within the file's chunk stream.
    pub index: usize,
}

/// A chunk before it is bound to a file identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ChunkWithoutId {
    pub content: String,
    pub start_line: usize,
    pub end_line: usize,
}
