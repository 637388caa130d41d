use crate::error::EmbeddingError;
use crate::DEFAULT_EMBEDDING_DIM;
use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};
use log::{debug, info};
use serde::{Deserialize, Serialize};

/// Supported embedding models.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum EmbeddingsModelType {
    /// Nomic-embed-text-v1.5 (recommended for code)
    NomicEmbedTextV15,
    /// All-MiniLM-L6-v2 (lightweight, faster)
    AllMiniLmL6V2,
}

impl EmbeddingsModelType {
    fn to_fastembed_model(self) -> EmbeddingModel {
        match self {
            EmbeddingsModelType::NomicEmbedTextV15 => EmbeddingModel::NomicEmbedTextV15,
            EmbeddingsModelType::AllMiniLmL6V2 => EmbeddingModel::AllMiniLML6V2,
        }
    }
}

/// Configuration for the embeddings provider. A `None` model disables
/// embeddings entirely; the vector artifact is then omitted from indexing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingsConfig {
    pub model: Option<EmbeddingsModelType>,

    /// Target embedding dimension (Matryoshka truncation).
    #[serde(default = "default_dimension")]
    pub dimension: usize,

    /// Maximum batch size for embedding generation.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

fn default_dimension() -> usize {
    DEFAULT_EMBEDDING_DIM
}

fn default_batch_size() -> usize {
    32
}

impl Default for EmbeddingsConfig {
    fn default() -> Self {
        Self {
            model: Some(EmbeddingsModelType::NomicEmbedTextV15),
            dimension: default_dimension(),
            batch_size: default_batch_size(),
        }
    }
}

/// Service for generating text embeddings.
pub struct EmbeddingsProvider {
    model: TextEmbedding,
    config: EmbeddingsConfig,
}

impl EmbeddingsProvider {
    /// Build a provider from configuration. Returns `Ok(None)` when no
    /// model is configured.
    pub fn try_from_config(config: EmbeddingsConfig) -> Result<Option<Self>, EmbeddingError> {
        let Some(model_type) = config.model else {
            info!("No embedding model configured; vector indexing disabled");
            return Ok(None);
        };

        info!(
            "Initializing embeddings provider with model {:?}, dimension {}",
            model_type, config.dimension
        );

        let init_options = InitOptions::new(model_type.to_fastembed_model());
        let model = TextEmbedding::try_new(init_options).map_err(|e| {
            EmbeddingError::ModelInitialization(format!("Failed to initialize model: {e}"))
        })?;

        Ok(Some(Self { model, config }))
    }

    /// Generate embeddings for a list of texts, preserving order.
    pub fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        debug!("Generating embeddings for {} texts", texts.len());

        let mut all_embeddings = Vec::with_capacity(texts.len());
        for batch in texts.chunks(self.config.batch_size) {
            let refs: Vec<&str> = batch.iter().map(|s| s.as_str()).collect();
            let batch_embeddings = self
                .model
                .embed(refs, None)
                .map_err(|e| EmbeddingError::EmbeddingGeneration(e.to_string()))?;

            for mut embedding in batch_embeddings {
                // Matryoshka models allow truncation; anything shorter than
                // the target dimension is a real mismatch.
                if embedding.len() > self.config.dimension {
                    embedding.truncate(self.config.dimension);
                } else if embedding.len() < self.config.dimension {
                    return Err(EmbeddingError::LengthMismatch {
                        expected: self.config.dimension,
                        actual: embedding.len(),
                    });
                }
                all_embeddings.push(embedding);
            }
        }

        Ok(all_embeddings)
    }

    /// Generate a single embedding.
    pub fn embed_one(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let mut embeddings = self.embed(&[text.to_string()])?;
        embeddings
            .pop()
            .ok_or_else(|| EmbeddingError::EmbeddingGeneration("No embedding generated".into()))
    }

    /// Dimension of vectors produced by this provider.
    pub fn dimension(&self) -> usize {
        self.config.dimension
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn disabled_config_yields_no_provider() {
        let config = EmbeddingsConfig {
            model: None,
            ..Default::default()
        };
        let provider = EmbeddingsProvider::try_from_config(config).unwrap();
        assert!(provider.is_none());
    }

    #[test]
    fn length_mismatch_message_is_classifier_visible() {
        let err = EmbeddingError::LengthMismatch {
            expected: 768,
            actual: 384,
        };
        assert_eq!(
            err.to_string(),
            "vector length mismatch: expected 768, got 384"
        );
    }

    #[test]
    #[ignore] // Requires embedding model download
    fn embeds_texts_at_configured_dimension() {
        let provider = EmbeddingsProvider::try_from_config(EmbeddingsConfig::default())
            .unwrap()
            .unwrap();
        let vectors = provider
            .embed(&["fn hello() {}".to_string(), "class Widget {}".to_string()])
            .unwrap();
        assert_eq!(vectors.len(), 2);
        for vector in &vectors {
            assert_eq!(vector.len(), provider.dimension());
        }
    }
}
