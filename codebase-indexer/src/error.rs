use sidekick_embeddings::EmbeddingError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum IndexError {
    #[error("Catalog error: {0}")]
    Catalog(#[from] sidekick_index_catalog::CatalogError),

    #[error("Vector store error: {0}")]
    VectorStore(#[from] sidekick_vector_store::VectorStoreError),

    #[error("Embedding error: {0}")]
    Embedding(#[from] EmbeddingError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Walk error: {0}")]
    Walk(String),

    #[error("Indexing cancelled")]
    Cancelled,
}

impl From<ignore::Error> for IndexError {
    fn from(err: ignore::Error) -> Self {
        IndexError::Walk(err.to_string())
    }
}

impl IndexError {
    /// Model failures are surfaced to the IDE as such and never trigger an
    /// index rebuild. A dimension mismatch is storage drift, not a model
    /// outage, so it is excluded here and picked up by the classifier.
    pub fn is_model_error(&self) -> bool {
        matches!(
            self,
            IndexError::Embedding(
                EmbeddingError::ModelInitialization(_) | EmbeddingError::EmbeddingGeneration(_)
            )
        )
    }

    /// Whether this failure means the on-disk indexes should be cleared.
    pub fn should_clear_indexes(&self) -> bool {
        !self.is_model_error()
            && sidekick_index_catalog::should_clear_indexes(&self.to_string())
    }
}

pub type Result<T> = std::result::Result<T, IndexError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn model_errors_do_not_clear_indexes() {
        let err = IndexError::Embedding(EmbeddingError::EmbeddingGeneration(
            "SQLITE_ERROR mentioned in passing".into(),
        ));
        assert!(err.is_model_error());
        assert!(!err.should_clear_indexes());
    }

    #[test]
    fn length_mismatch_clears_indexes() {
        let err = IndexError::Embedding(EmbeddingError::LengthMismatch {
            expected: 768,
            actual: 384,
        });
        assert!(!err.is_model_error());
        assert!(err.should_clear_indexes());
    }

    #[test]
    fn cancellation_is_not_a_clearing_failure() {
        assert!(!IndexError::Cancelled.should_clear_indexes());
    }
}
