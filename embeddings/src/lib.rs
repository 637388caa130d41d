//! # Sidekick Embeddings
//!
//! Local embedding generation for the vector artifact, via fastembed and
//! ONNX Runtime. Construction is optional: when no model is configured the
//! provider is absent and the indexer simply omits the vector artifact.
//!
//! ## Example
//!
//! ```no_run
//! use sidekick_embeddings::{EmbeddingsConfig, EmbeddingsProvider};
//!
//! fn main() -> Result<(), sidekick_embeddings::EmbeddingError> {
//!     let Some(provider) = EmbeddingsProvider::try_from_config(EmbeddingsConfig::default())?
//!     else {
//!         return Ok(()); // embeddings disabled
//!     };
//!     let vectors = provider.embed(&["fn hello() {}".to_string()])?;
//!     assert_eq!(vectors.len(), 1);
//!     Ok(())
//! }
//! ```

mod error;
mod provider;

pub use error::EmbeddingError;
pub use provider::EmbeddingsConfig;
pub use provider::EmbeddingsModelType;
pub use provider::EmbeddingsProvider;

/// Default embedding dimension for Nomic-embed-text-v1.5.
pub const DEFAULT_EMBEDDING_DIM: usize = 768;
