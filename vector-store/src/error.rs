use thiserror::Error;

/// Errors that can occur during vector store operations.
#[derive(Debug, Error)]
pub enum VectorStoreError {
    /// Failed to initialize the vector store
    #[error("Failed to initialize vector store: {0}")]
    Initialization(String),

    /// Failed to add data to the vector store
    #[error("Failed to add data: {0}")]
    AdditionFailed(String),

    /// Failed to search the vector store
    #[error("Failed to search: {0}")]
    SearchFailed(String),

    /// Failed to delete rows
    #[error("Failed to delete: {0}")]
    DeletionFailed(String),

    /// Database error
    #[error("Database error: {0}")]
    Database(String),

    /// Embedding error
    #[error("Embedding error: {0}")]
    Embedding(#[from] sidekick_embeddings::EmbeddingError),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Arrow error
    #[error("Arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),
}

impl From<lancedb::Error> for VectorStoreError {
    fn from(err: lancedb::Error) -> Self {
        VectorStoreError::Database(err.to_string())
    }
}
