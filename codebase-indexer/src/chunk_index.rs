use crate::artifact::{check_cancelled, item_fraction, ArtifactIndex, ProgressReporter};
use crate::error::Result;
use crate::plan::{CompleteCallback, RefreshPlan};
use crate::planner::FileReader;
use async_trait::async_trait;
use log::debug;
use rusqlite::{params, OptionalExtension};
use sidekick_code_chunker::{chunk_document, Chunk, ChunkerConfig};
use sidekick_index_catalog::{ApplyKind, Database};
use sidekick_protocol::{ArtifactId, PathAndCacheKey, Tag};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Stores chunk rows keyed by `(path, cache_key)`. Tag membership is the
/// catalog's business; remove-tag touches nothing here, while add-tag
/// copies rows to paths that do not hold them yet (renames).
pub struct ChunkIndex {
    db: Database,
    reader: Arc<dyn FileReader>,
    config: ChunkerConfig,
}

impl ChunkIndex {
    pub fn new(db: Database, reader: Arc<dyn FileReader>, config: ChunkerConfig) -> Self {
        Self { db, reader, config }
    }

    async fn compute_item(&self, item: &PathAndCacheKey) -> Result<usize> {
        let bytes = self.reader.read_file(&item.path).await?;
        let contents = String::from_utf8_lossy(&bytes);
        let chunks = chunk_document(&item.path, &contents, &self.config, &item.cache_key);
        let count = chunks.len();

        self.db.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            // Replaying a compute (e.g. after a crash) must not duplicate.
            tx.execute(
                "DELETE FROM chunks WHERE path = ?1 AND cacheKey = ?2",
                params![item.path, item.cache_key],
            )?;
            for chunk in &chunks {
                tx.execute(
                    "INSERT INTO chunks (cacheKey, path, idx, startLine, endLine, content)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                    params![
                        chunk.digest,
                        chunk.filepath,
                        chunk.index as i64,
                        chunk.start_line as i64,
                        chunk.end_line as i64,
                        chunk.content
                    ],
                )?;
            }
            tx.commit()
        })?;
        Ok(count)
    }

    /// Link already-chunked content to a new path. A rename classifies the
    /// new path as add_tag, and the paired del drops the old path's rows,
    /// so the rows must be copied over (no re-chunking) or the content
    /// would be unreachable under its new name. A branch switch hits the
    /// existing-rows early-out and stays catalog-only.
    fn link_item(&self, item: &PathAndCacheKey) -> Result<usize> {
        let copied = self.db.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let existing: i64 = tx.query_row(
                "SELECT COUNT(*) FROM chunks WHERE path = ?1 AND cacheKey = ?2",
                params![item.path, item.cache_key],
                |row| row.get(0),
            )?;
            if existing > 0 {
                tx.commit()?;
                return Ok(0);
            }
            let source: Option<String> = tx
                .query_row(
                    "SELECT path FROM chunks WHERE cacheKey = ?1 LIMIT 1",
                    params![item.cache_key],
                    |row| row.get(0),
                )
                .optional()?;
            let copied = match source {
                Some(source) => tx.execute(
                    "INSERT INTO chunks (cacheKey, path, idx, startLine, endLine, content)
                     SELECT cacheKey, ?2, idx, startLine, endLine, content
                     FROM chunks WHERE cacheKey = ?1 AND path = ?3",
                    params![item.cache_key, item.path, source],
                )?,
                None => 0,
            };
            tx.commit()?;
            Ok(copied)
        })?;
        Ok(copied)
    }

    fn delete_item(&self, item: &PathAndCacheKey) -> Result<()> {
        self.db.with_conn(|conn| {
            conn.execute(
                "DELETE FROM chunks WHERE path = ?1 AND cacheKey = ?2",
                params![item.path, item.cache_key],
            )?;
            Ok(())
        })?;
        Ok(())
    }
}

/// Read the stored chunks for one file version. The full-text and vector
/// artifacts build on these rows, which is why the chunk artifact must be
/// updated first within a refresh.
pub(crate) fn stored_chunks(
    db: &Database,
    path: &str,
    cache_key: &str,
) -> Result<Vec<Chunk>> {
    Ok(db.with_conn(|conn| {
        let mut stmt = conn.prepare_cached(
            "SELECT idx, startLine, endLine, content FROM chunks
             WHERE path = ?1 AND cacheKey = ?2 ORDER BY idx",
        )?;
        let rows = stmt.query_map(params![path, cache_key], |row| {
            Ok(Chunk {
                index: row.get::<_, i64>(0)? as usize,
                start_line: row.get::<_, i64>(1)? as usize,
                end_line: row.get::<_, i64>(2)? as usize,
                content: row.get(3)?,
                filepath: path.to_string(),
                digest: cache_key.to_string(),
            })
        })?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
    })?)
}

#[async_trait]
impl ArtifactIndex for ChunkIndex {
    fn artifact_id(&self) -> ArtifactId {
        ArtifactId::Chunks
    }

    async fn update(
        &self,
        _tag: &Tag,
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
            let count = self.compute_item(item).await?;
            debug!("Chunked {} into {count} chunks", item.path);
            complete(std::slice::from_ref(item), ApplyKind::Compute)?;
            progress
                .report(item_fraction(position, total), format!("Chunking {}", item.path))
                .await;
            position += 1;
        }

        for item in &plan.add_tag {
            check_cancelled(cancel).await?;
            let copied = self.link_item(item)?;
            if copied > 0 {
                debug!("Copied {copied} chunk rows to {}", item.path);
            }
            complete(std::slice::from_ref(item), ApplyKind::Add)?;
            progress
                .report(item_fraction(position, total), format!("Linking {}", item.path))
                .await;
            position += 1;
        }

        for item in &plan.remove_tag {
            check_cancelled(cancel).await?;
            complete(std::slice::from_ref(item), ApplyKind::Remove)?;
            progress
                .report(item_fraction(position, total), format!("Unlinking {}", item.path))
                .await;
            position += 1;
        }

        for item in &plan.del {
            check_cancelled(cancel).await?;
            self.delete_item(item)?;
            complete(std::slice::from_ref(item), ApplyKind::Remove)?;
            progress
                .report(item_fraction(position, total), format!("Removing {}", item.path))
                .await;
            position += 1;
        }

        Ok(())
    }
}
