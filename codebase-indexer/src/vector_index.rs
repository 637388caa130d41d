use crate::artifact::{check_cancelled, item_fraction, ArtifactIndex, ProgressReporter};
use crate::chunk_index::stored_chunks;
use crate::error::Result;
use crate::plan::{CompleteCallback, RefreshPlan};
use async_trait::async_trait;
use log::debug;
use sidekick_embeddings::EmbeddingsProvider;
use sidekick_index_catalog::{ApplyKind, Database};
use sidekick_protocol::{ArtifactId, PathAndCacheKey, Tag};
use sidekick_vector_store::{VectorRow, VectorStore};
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

/// Embeds chunk contents and stores the vectors in LanceDB, keyed by
/// `(path, cache_key, chunk_index)` under the tag's `(dir, branch)`.
/// Chunks are read from the chunk artifact's table, which is why that
/// artifact updates first. Absent from the artifact list when no embedding
/// model is configured.
pub struct VectorIndex {
    db: Database,
    store: Arc<Mutex<VectorStore>>,
    provider: Arc<EmbeddingsProvider>,
}

impl VectorIndex {
    pub fn new(
        db: Database,
        store: Arc<Mutex<VectorStore>>,
        provider: Arc<EmbeddingsProvider>,
    ) -> Self {
        Self { db, store, provider }
    }

    /// Embedding dimension, for store configuration.
    pub fn dimension(&self) -> usize {
        self.provider.dimension()
    }

    async fn compute_item(&self, tag: &Tag, item: &PathAndCacheKey) -> Result<usize> {
        let chunks = stored_chunks(&self.db, &item.path, &item.cache_key)?;
        if chunks.is_empty() {
            return Ok(0);
        }

        let texts: Vec<String> = chunks.iter().map(|c| c.content.clone()).collect();
        let embeddings = self.provider.embed(&texts)?;

        let rows: Vec<VectorRow> = chunks
            .iter()
            .zip(embeddings)
            .map(|(chunk, vector)| VectorRow {
                path: chunk.filepath.clone(),
                cache_key: chunk.digest.clone(),
                chunk_index: chunk.index as u64,
                start_line: chunk.start_line as u64,
                end_line: chunk.end_line as u64,
                content: chunk.content.clone(),
                dir: tag.directory.clone(),
                branch: tag.branch.clone(),
                vector,
            })
            .collect();

        let count = rows.len();
        let store = self.store.lock().await;
        store.upsert(rows).await?;
        Ok(count)
    }
}

#[async_trait]
impl ArtifactIndex for VectorIndex {
    fn artifact_id(&self) -> ArtifactId {
        ArtifactId::Lancedb
    }

    async fn update(
        &self,
        tag: &Tag,
        plan: &RefreshPlan,
        complete: &CompleteCallback,
        _repo_name: Option<&str>,
        progress: &ProgressReporter,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let total = plan.len();
        let mut position = 0usize;

        for item in &plan.compute {
            check_cancelled(cancel).await?;
            let count = self.compute_item(tag, item).await?;
            debug!("Embedded {count} chunks for {}", item.path);
            complete(std::slice::from_ref(item), ApplyKind::Compute)?;
            progress
                .report(item_fraction(position, total), format!("Embedding {}", item.path))
                .await;
            position += 1;
        }

        for item in &plan.add_tag {
            check_cancelled(cancel).await?;
            {
                let store = self.store.lock().await;
                store
                    .copy_for_tag(&item.cache_key, &item.path, &tag.directory, &tag.branch)
                    .await?;
            }
            complete(std::slice::from_ref(item), ApplyKind::Add)?;
            progress
                .report(item_fraction(position, total), format!("Linking {}", item.path))
                .await;
            position += 1;
        }

        for item in &plan.remove_tag {
            check_cancelled(cancel).await?;
            {
                let store = self.store.lock().await;
                store
                    .delete(&item.path, &item.cache_key, &tag.directory, &tag.branch)
                    .await?;
            }
            complete(std::slice::from_ref(item), ApplyKind::Remove)?;
            progress
                .report(item_fraction(position, total), format!("Unlinking {}", item.path))
                .await;
            position += 1;
        }

        for item in &plan.del {
            check_cancelled(cancel).await?;
            {
                let store = self.store.lock().await;
                store
                    .delete(&item.path, &item.cache_key, &tag.directory, &tag.branch)
                    .await?;
            }
            complete(std::slice::from_ref(item), ApplyKind::Remove)?;
            progress
                .report(item_fraction(position, total), format!("Removing {}", item.path))
                .await;
            position += 1;
        }

        Ok(())
    }
}
