use thiserror::Error;

/// Errors from embedding generation.
#[derive(Debug, Error)]
pub enum EmbeddingError {
    /// Failed to initialize the embedding model
    #[error("Failed to initialize embedding model: {0}")]
    ModelInitialization(String),

    /// Failed to generate embeddings
    #[error("Embedding generation failed: {0}")]
    EmbeddingGeneration(String),

    /// Model produced a vector of the wrong size. The message is matched by
    /// the index error classifier, which treats it as a signal to rebuild.
    #[error("vector length mismatch: expected {expected}, got {actual}")]
    LengthMismatch { expected: usize, actual: usize },
}
