use crate::artifact::{check_cancelled, item_fraction, ArtifactIndex, ProgressReporter};
use crate::error::Result;
use crate::plan::{CompleteCallback, RefreshPlan};
use async_trait::async_trait;
use log::debug;
use rusqlite::params;
use sidekick_code_chunker::Chunk;
use sidekick_index_catalog::{ApplyKind, Database};
use sidekick_protocol::{ArtifactId, PathAndCacheKey, Tag};
use tokio_util::sync::CancellationToken;

/// BM25 weight of the path column relative to content.
const PATH_BM25_WEIGHT: f64 = 10.0;

/// Query against the trigram full-text index.
#[derive(Clone, Debug)]
pub struct FtsQuery {
    /// Tags whose content is searched; results must be indexed under at
    /// least one of them.
    pub tags: Vec<Tag>,
    pub text: String,
    pub n: usize,
    /// Restrict results to these paths.
    pub filter_paths: Option<Vec<String>>,
    /// Keep only rows with BM25 rank at or below this bound (FTS5 ranks
    /// are negative; more negative is a stronger match). `0.0` keeps all.
    pub bm25_threshold: f64,
}

impl FtsQuery {
    pub fn new(tags: Vec<Tag>, text: impl Into<String>, n: usize) -> Self {
        Self {
            tags,
            text: text.into(),
            n,
            filter_paths: None,
            bm25_threshold: 0.0,
        }
    }
}

/// Trigram-tokenized full-text index over chunk contents. FTS rows link to
/// chunk rows through the metadata table; tag membership is resolved
/// through the tag catalog at query time. Remove-tag is catalog-only, and
/// add-tag only does work when the path has no FTS rows yet (a rename
/// arriving as add-tag plus del of the old path).
pub struct FullTextIndex {
    db: Database,
}

impl FullTextIndex {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    fn compute_item(&self, item: &PathAndCacheKey) -> Result<usize> {
        let inserted = self.db.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            // Replays must not leave stale fts rows behind.
            tx.execute(
                "DELETE FROM chunk_fts WHERE rowid IN (
                    SELECT id FROM chunk_fts_metadata WHERE path = ?1 AND cacheKey = ?2
                )",
                params![item.path, item.cache_key],
            )?;
            tx.execute(
                "DELETE FROM chunk_fts_metadata WHERE path = ?1 AND cacheKey = ?2",
                params![item.path, item.cache_key],
            )?;

            let chunk_rows: Vec<(i64, String)> = {
                let mut stmt = tx.prepare_cached(
                    "SELECT id, content FROM chunks
                     WHERE path = ?1 AND cacheKey = ?2 ORDER BY idx",
                )?;
                let rows = stmt.query_map(params![item.path, item.cache_key], |row| {
                    Ok((row.get(0)?, row.get(1)?))
                })?;
                rows.collect::<rusqlite::Result<Vec<_>>>()?
            };

            for (chunk_id, content) in &chunk_rows {
                tx.execute(
                    "INSERT INTO chunk_fts (path, content) VALUES (?1, ?2)",
                    params![item.path, content],
                )?;
                tx.execute(
                    "INSERT OR REPLACE INTO chunk_fts_metadata (id, path, cacheKey, chunkId)
                     VALUES (last_insert_rowid(), ?1, ?2, ?3)",
                    params![item.path, item.cache_key, chunk_id],
                )?;
            }
            tx.commit()?;
            Ok(chunk_rows.len())
        })?;
        Ok(inserted)
    }

    fn delete_item(&self, item: &PathAndCacheKey) -> Result<()> {
        self.db.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            tx.execute(
                "DELETE FROM chunk_fts WHERE rowid IN (
                    SELECT id FROM chunk_fts_metadata WHERE path = ?1 AND cacheKey = ?2
                )",
                params![item.path, item.cache_key],
            )?;
            tx.execute(
                "DELETE FROM chunk_fts_metadata WHERE path = ?1 AND cacheKey = ?2",
                params![item.path, item.cache_key],
            )?;
            tx.commit()
        })?;
        Ok(())
    }

    /// Make a linked path searchable. The chunk artifact has already
    /// copied its rows (it updates before this one), so re-running the
    /// compute path over the chunk table is enough; no text is re-derived
    /// from disk. Paths that already have FTS rows (branch switch) are
    /// left alone.
    fn link_item(&self, item: &PathAndCacheKey) -> Result<usize> {
        let existing: i64 = self.db.with_conn(|conn| {
            conn.query_row(
                "SELECT COUNT(*) FROM chunk_fts_metadata WHERE path = ?1 AND cacheKey = ?2",
                params![item.path, item.cache_key],
                |row| row.get(0),
            )
        })?;
        if existing > 0 {
            return Ok(0);
        }
        self.compute_item(item)
    }

    /// Top-`n` chunks matching `query.text`, filtered to the query's tags,
    /// ranked by BM25 with the path column weighted.
    pub fn retrieve(&self, query: &FtsQuery) -> Result<Vec<Chunk>> {
        if query.tags.is_empty() || query.text.trim().is_empty() {
            return Ok(Vec::new());
        }

        let mut tag_clauses = Vec::new();
        let mut bind: Vec<Box<dyn rusqlite::types::ToSql>> = Vec::new();
        bind.push(Box::new(fts_escape(&query.text)));
        for tag in &query.tags {
            tag_clauses.push("(tc.dir = ? AND tc.branch = ?)".to_string());
            bind.push(Box::new(tag.directory.clone()));
            bind.push(Box::new(tag.branch.clone()));
        }

        let mut path_clause = String::new();
        if let Some(paths) = &query.filter_paths {
            if !paths.is_empty() {
                let placeholders = vec!["?"; paths.len()].join(", ");
                path_clause = format!("AND chunks.path IN ({placeholders})");
                for path in paths {
                    bind.push(Box::new(path.clone()));
                }
            }
        }

        bind.push(Box::new(query.bm25_threshold));
        bind.push(Box::new(query.n as i64));

        let sql = format!(
            "SELECT * FROM (
                 SELECT chunks.path AS path, chunks.cacheKey AS cacheKey,
                        chunks.idx AS idx, chunks.startLine AS startLine,
                        chunks.endLine AS endLine, chunks.content AS content,
                        bm25(chunk_fts, {PATH_BM25_WEIGHT}, 1.0) AS rank
                 FROM chunk_fts
                 JOIN chunk_fts_metadata ON chunk_fts.rowid = chunk_fts_metadata.id
                 JOIN chunks ON chunk_fts_metadata.chunkId = chunks.id
                 WHERE chunk_fts MATCH ?
                   AND EXISTS (
                       SELECT 1 FROM tag_catalog tc
                       WHERE tc.path = chunks.path AND tc.cacheKey = chunks.cacheKey
                         AND tc.artifactId = '{fts}'
                         AND ({tags})
                   )
                   {path_clause}
             )
             WHERE rank <= ?
             ORDER BY rank
             LIMIT ?",
            fts = ArtifactId::Fts.as_str(),
            tags = tag_clauses.join(" OR "),
        );

        let chunks = self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(
                rusqlite::params_from_iter(bind.iter().map(|b| b.as_ref())),
                |row| {
                    Ok(Chunk {
                        filepath: row.get(0)?,
                        digest: row.get(1)?,
                        index: row.get::<_, i64>(2)? as usize,
                        start_line: row.get::<_, i64>(3)? as usize,
                        end_line: row.get::<_, i64>(4)? as usize,
                        content: row.get(5)?,
                    })
                },
            )?;
            rows.collect::<rusqlite::Result<Vec<_>>>()
        })?;

        debug!(
            "FTS retrieve {:?} matched {} chunks",
            query.text,
            chunks.len()
        );
        Ok(chunks)
    }
}

/// Quote the query as an FTS5 phrase so user text cannot inject operators.
fn fts_escape(text: &str) -> String {
    format!("\"{}\"", text.replace('"', "\"\""))
}

#[async_trait]
impl ArtifactIndex for FullTextIndex {
    fn artifact_id(&self) -> ArtifactId {
        ArtifactId::Fts
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
            let count = self.compute_item(item)?;
            debug!("FTS indexed {count} chunks for {}", item.path);
            complete(std::slice::from_ref(item), ApplyKind::Compute)?;
            progress
                .report(item_fraction(position, total), format!("Indexing {}", item.path))
                .await;
            position += 1;
        }

        for item in &plan.add_tag {
            check_cancelled(cancel).await?;
            let copied = self.link_item(item)?;
            if copied > 0 {
                debug!("FTS linked {copied} chunks for {}", item.path);
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
