use crate::error::VectorStoreError;
use arrow::array::{
    Array, FixedSizeListArray, Float32Array, RecordBatch, RecordBatchIterator, StringArray,
    UInt64Array,
};
use arrow::datatypes::{DataType, Field, Schema};
use lancedb::connection::Connection;
use lancedb::query::{ExecutableQuery, QueryBase};
use lancedb::table::Table;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;

const TABLE_NAME: &str = "code_chunks";

/// Configuration for the vector store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorStoreConfig {
    /// Dimension of the embeddings.
    pub dimension: usize,
}

impl Default for VectorStoreConfig {
    fn default() -> Self {
        Self {
            dimension: sidekick_embeddings::DEFAULT_EMBEDDING_DIM,
        }
    }
}

/// One embedded chunk row.
#[derive(Debug, Clone, PartialEq)]
pub struct VectorRow {
    pub path: String,
    pub cache_key: String,
    pub chunk_index: u64,
    pub start_line: u64,
    pub end_line: u64,
    pub content: String,
    pub dir: String,
    pub branch: String,
    pub vector: Vec<f32>,
}

/// A nearest-neighbor search hit.
#[derive(Debug, Clone, PartialEq)]
pub struct VectorHit {
    pub path: String,
    pub cache_key: String,
    pub chunk_index: u64,
    pub start_line: u64,
    pub end_line: u64,
    pub content: String,
    /// Distance from the query vector (lower is better).
    pub distance: f32,
}

/// Vector store for embedded code chunks using LanceDB.
pub struct VectorStore {
    connection: Connection,
    table: Option<Table>,
    config: VectorStoreConfig,
}

impl VectorStore {
    /// Open (creating if needed) the store under `store_path`.
    pub async fn open(
        store_path: &Path,
        config: VectorStoreConfig,
    ) -> Result<Self, VectorStoreError> {
        info!("Initializing vector store at {}", store_path.display());
        std::fs::create_dir_all(store_path)?;

        let uri = store_path
            .to_str()
            .ok_or_else(|| VectorStoreError::Initialization("Invalid store path".into()))?;
        let connection = lancedb::connect(uri)
            .execute()
            .await
            .map_err(|e| VectorStoreError::Initialization(e.to_string()))?;

        let mut store = Self {
            connection,
            table: None,
            config,
        };
        store.initialize_table().await?;
        Ok(store)
    }

    async fn initialize_table(&mut self) -> Result<(), VectorStoreError> {
        let table_names = self
            .connection
            .table_names()
            .execute()
            .await
            .map_err(|e| VectorStoreError::Initialization(e.to_string()))?;

        if table_names.contains(&TABLE_NAME.to_string()) {
            debug!("Opening existing table '{TABLE_NAME}'");
            self.table = Some(
                self.connection
                    .open_table(TABLE_NAME)
                    .execute()
                    .await
                    .map_err(|e| VectorStoreError::Initialization(e.to_string()))?,
            );
        } else {
            debug!("Creating new table '{TABLE_NAME}'");
            let schema = Self::schema(self.config.dimension);
            let empty = RecordBatch::new_empty(Arc::new(schema.clone()));
            let batches =
                RecordBatchIterator::new(vec![empty].into_iter().map(Ok), Arc::new(schema));
            self.table = Some(
                self.connection
                    .create_table(TABLE_NAME, Box::new(batches))
                    .execute()
                    .await
                    .map_err(|e| VectorStoreError::Initialization(e.to_string()))?,
            );
        }
        Ok(())
    }

    fn schema(dimension: usize) -> Schema {
        Schema::new(vec![
            Field::new("path", DataType::Utf8, false),
            Field::new("cacheKey", DataType::Utf8, false),
            Field::new("chunkIndex", DataType::UInt64, false),
            Field::new("startLine", DataType::UInt64, false),
            Field::new("endLine", DataType::UInt64, false),
            Field::new("content", DataType::Utf8, false),
            Field::new("dir", DataType::Utf8, false),
            Field::new("branch", DataType::Utf8, false),
            Field::new(
                "vector",
                DataType::FixedSizeList(
                    Arc::new(Field::new("item", DataType::Float32, true)),
                    dimension as i32,
                ),
                false,
            ),
        ])
    }

    fn table(&self) -> Result<&Table, VectorStoreError> {
        self.table
            .as_ref()
            .ok_or_else(|| VectorStoreError::Database("Table not initialized".into()))
    }

    /// Insert rows, replacing any existing rows with the same
    /// `(path, cache_key, chunk_index, dir, branch)` identity.
    pub async fn upsert(&self, rows: Vec<VectorRow>) -> Result<(), VectorStoreError> {
        if rows.is_empty() {
            return Ok(());
        }
        debug!("Upserting {} vector rows", rows.len());

        // Delete-then-insert; the unique identity spans five columns, so a
        // per-(path, cacheKey, tag) predicate covers every incoming row.
        let mut predicates: Vec<String> = rows
            .iter()
            .map(|row| {
                format!(
                    "(path = {} AND cacheKey = {} AND dir = {} AND branch = {})",
                    sql_quote(&row.path),
                    sql_quote(&row.cache_key),
                    sql_quote(&row.dir),
                    sql_quote(&row.branch)
                )
            })
            .collect();
        predicates.sort();
        predicates.dedup();
        self.table()?
            .delete(&predicates.join(" OR "))
            .await
            .map_err(|e| VectorStoreError::DeletionFailed(e.to_string()))?;

        let batch = self.rows_to_batch(&rows)?;
        self.table()?
            .add(Box::new(RecordBatchIterator::new(
                vec![Ok(batch)].into_iter(),
                Arc::new(Self::schema(self.config.dimension)),
            )))
            .execute()
            .await
            .map_err(|e| VectorStoreError::AdditionFailed(e.to_string()))?;
        Ok(())
    }

    /// Re-link already-embedded content to a target identity by copying
    /// its rows with rewritten path and tag columns. No embedding work
    /// happens here. Covers both a branch switch (same path, new tag) and
    /// a rename (new path, same tag, where the paired delete drops the old
    /// path's rows).
    pub async fn copy_for_tag(
        &self,
        cache_key: &str,
        to_path: &str,
        to_dir: &str,
        to_branch: &str,
    ) -> Result<usize, VectorStoreError> {
        let existing = self
            .query_rows(&format!("cacheKey = {}", sql_quote(cache_key)))
            .await?;

        // The same content may already sit under several paths and tags;
        // one copy per chunk index is enough, and chunk indexes already at
        // the target identity need nothing.
        let mut seen: std::collections::HashSet<u64> = existing
            .iter()
            .filter(|row| row.path == to_path && row.dir == to_dir && row.branch == to_branch)
            .map(|row| row.chunk_index)
            .collect();
        let mut copies = Vec::new();
        for mut row in existing {
            if !seen.insert(row.chunk_index) {
                continue;
            }
            row.path = to_path.to_string();
            row.dir = to_dir.to_string();
            row.branch = to_branch.to_string();
            copies.push(row);
        }

        let copied = copies.len();
        if copied > 0 {
            self.upsert(copies).await?;
        }
        debug!("Copied {copied} vector rows to ({to_path}, {to_dir}, {to_branch})");
        Ok(copied)
    }

    /// Remove the rows for one file version under one tag.
    pub async fn delete(
        &self,
        path: &str,
        cache_key: &str,
        dir: &str,
        branch: &str,
    ) -> Result<(), VectorStoreError> {
        self.table()?
            .delete(&format!(
                "path = {} AND cacheKey = {} AND dir = {} AND branch = {}",
                sql_quote(path),
                sql_quote(cache_key),
                sql_quote(dir),
                sql_quote(branch)
            ))
            .await
            .map_err(|e| VectorStoreError::DeletionFailed(e.to_string()))?;
        Ok(())
    }

    /// Nearest-neighbor search restricted to the given `(dir, branch)` tags
    /// and, optionally, to a set of paths.
    pub async fn search(
        &self,
        query_vector: Vec<f32>,
        tags: &[(String, String)],
        n: usize,
        filter_paths: Option<&[String]>,
    ) -> Result<Vec<VectorHit>, VectorStoreError> {
        if tags.is_empty() {
            return Ok(Vec::new());
        }

        let tag_filter = tags
            .iter()
            .map(|(dir, branch)| {
                format!(
                    "(dir = {} AND branch = {})",
                    sql_quote(dir),
                    sql_quote(branch)
                )
            })
            .collect::<Vec<_>>()
            .join(" OR ");
        let mut filter = format!("({tag_filter})");
        if let Some(paths) = filter_paths {
            if !paths.is_empty() {
                let list = paths.iter().map(|p| sql_quote(p)).collect::<Vec<_>>().join(", ");
                filter.push_str(&format!(" AND path IN ({list})"));
            }
        }

        let results = self
            .table()?
            .vector_search(query_vector)
            .map_err(|e| VectorStoreError::SearchFailed(e.to_string()))?
            .only_if(filter)
            .limit(n)
            .execute()
            .await
            .map_err(|e| VectorStoreError::SearchFailed(e.to_string()))?;

        let mut hits = Vec::new();
        let batches: Vec<RecordBatch> = collect_batches(results).await?;
        for batch in batches {
            let path = string_column(&batch, "path")?;
            let cache_key = string_column(&batch, "cacheKey")?;
            let chunk_index = u64_column(&batch, "chunkIndex")?;
            let start_line = u64_column(&batch, "startLine")?;
            let end_line = u64_column(&batch, "endLine")?;
            let content = string_column(&batch, "content")?;
            let distance = batch
                .column_by_name("_distance")
                .and_then(|col| col.as_any().downcast_ref::<Float32Array>().cloned());

            for i in 0..batch.num_rows() {
                hits.push(VectorHit {
                    path: path.value(i).to_string(),
                    cache_key: cache_key.value(i).to_string(),
                    chunk_index: chunk_index.value(i),
                    start_line: start_line.value(i),
                    end_line: end_line.value(i),
                    content: content.value(i).to_string(),
                    distance: distance.as_ref().map(|arr| arr.value(i)).unwrap_or(0.0),
                });
            }
        }
        debug!("Vector search returned {} hits", hits.len());
        Ok(hits)
    }

    /// Scan rows matching an SQL predicate, vectors included.
    async fn query_rows(&self, predicate: &str) -> Result<Vec<VectorRow>, VectorStoreError> {
        let results = self
            .table()?
            .query()
            .only_if(predicate.to_string())
            .execute()
            .await
            .map_err(|e| VectorStoreError::SearchFailed(e.to_string()))?;

        let mut rows = Vec::new();
        let batches: Vec<RecordBatch> = collect_batches(results).await?;
        for batch in batches {
            let path = string_column(&batch, "path")?;
            let cache_key = string_column(&batch, "cacheKey")?;
            let chunk_index = u64_column(&batch, "chunkIndex")?;
            let start_line = u64_column(&batch, "startLine")?;
            let end_line = u64_column(&batch, "endLine")?;
            let content = string_column(&batch, "content")?;
            let dir = string_column(&batch, "dir")?;
            let branch = string_column(&batch, "branch")?;
            let vectors = batch
                .column_by_name("vector")
                .and_then(|col| col.as_any().downcast_ref::<FixedSizeListArray>().cloned())
                .ok_or_else(|| VectorStoreError::SearchFailed("Invalid vector column".into()))?;

            for i in 0..batch.num_rows() {
                let values = vectors.value(i);
                let floats = values
                    .as_any()
                    .downcast_ref::<Float32Array>()
                    .ok_or_else(|| {
                        VectorStoreError::SearchFailed("Invalid vector element type".into())
                    })?;
                rows.push(VectorRow {
                    path: path.value(i).to_string(),
                    cache_key: cache_key.value(i).to_string(),
                    chunk_index: chunk_index.value(i),
                    start_line: start_line.value(i),
                    end_line: end_line.value(i),
                    content: content.value(i).to_string(),
                    dir: dir.value(i).to_string(),
                    branch: branch.value(i).to_string(),
                    vector: floats.values().to_vec(),
                });
            }
        }
        Ok(rows)
    }

    fn rows_to_batch(&self, rows: &[VectorRow]) -> Result<RecordBatch, VectorStoreError> {
        let paths: Vec<&str> = rows.iter().map(|r| r.path.as_str()).collect();
        let cache_keys: Vec<&str> = rows.iter().map(|r| r.cache_key.as_str()).collect();
        let chunk_indexes: Vec<u64> = rows.iter().map(|r| r.chunk_index).collect();
        let start_lines: Vec<u64> = rows.iter().map(|r| r.start_line).collect();
        let end_lines: Vec<u64> = rows.iter().map(|r| r.end_line).collect();
        let contents: Vec<&str> = rows.iter().map(|r| r.content.as_str()).collect();
        let dirs: Vec<&str> = rows.iter().map(|r| r.dir.as_str()).collect();
        let branches: Vec<&str> = rows.iter().map(|r| r.branch.as_str()).collect();
        let vectors: Vec<f32> = rows.iter().flat_map(|r| r.vector.iter().copied()).collect();

        let schema = Arc::new(Self::schema(self.config.dimension));
        let batch = RecordBatch::try_new(
            schema,
            vec![
                Arc::new(StringArray::from(paths)),
                Arc::new(StringArray::from(cache_keys)),
                Arc::new(UInt64Array::from(chunk_indexes)),
                Arc::new(UInt64Array::from(start_lines)),
                Arc::new(UInt64Array::from(end_lines)),
                Arc::new(StringArray::from(contents)),
                Arc::new(StringArray::from(dirs)),
                Arc::new(StringArray::from(branches)),
                Arc::new(
                    Float32Array::from(vectors)
                        .into_fixed_size_list(self.config.dimension as i32),
                ),
            ],
        )?;
        Ok(batch)
    }

    /// Total row count, mostly for tests and diagnostics.
    pub async fn count(&self) -> Result<usize, VectorStoreError> {
        Ok(self
            .table()?
            .count_rows(None)
            .await
            .map_err(|e| VectorStoreError::Database(e.to_string()))?)
    }

    /// Recursively remove a store directory. Failures are logged, not fatal.
    pub fn destroy(store_path: &Path) {
        if let Err(e) = std::fs::remove_dir_all(store_path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!("Failed to remove vector store at {}: {e}", store_path.display());
            }
        }
    }
}

async fn collect_batches<S, E>(mut stream: S) -> Result<Vec<RecordBatch>, VectorStoreError>
where
    S: futures::Stream<Item = std::result::Result<RecordBatch, E>> + Unpin,
    E: std::fmt::Display,
{
    use futures::TryStreamExt;
    let mut batches = Vec::new();
    while let Some(batch) = stream
        .try_next()
        .await
        .map_err(|e| VectorStoreError::SearchFailed(e.to_string()))?
    {
        batches.push(batch);
    }
    Ok(batches)
}

fn string_column<'a>(
    batch: &'a RecordBatch,
    name: &str,
) -> Result<&'a StringArray, VectorStoreError> {
    batch
        .column_by_name(name)
        .and_then(|col| col.as_any().downcast_ref::<StringArray>())
        .ok_or_else(|| VectorStoreError::SearchFailed(format!("Invalid {name} column")))
}

fn u64_column<'a>(
    batch: &'a RecordBatch,
    name: &str,
) -> Result<&'a UInt64Array, VectorStoreError> {
    batch
        .column_by_name(name)
        .and_then(|col| col.as_any().downcast_ref::<UInt64Array>())
        .ok_or_else(|| VectorStoreError::SearchFailed(format!("Invalid {name} column")))
}

/// Quote a string for use in a LanceDB SQL predicate.
fn sql_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn row(path: &str, cache_key: &str, chunk_index: u64, dir: &str, branch: &str) -> VectorRow {
        VectorRow {
            path: path.to_string(),
            cache_key: cache_key.to_string(),
            chunk_index,
            start_line: 0,
            end_line: 4,
            content: format!("content of {path}#{chunk_index}"),
            dir: dir.to_string(),
            branch: branch.to_string(),
            vector: vec![chunk_index as f32; 8],
        }
    }

    async fn test_store() -> (VectorStore, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let store = VectorStore::open(
            &temp_dir.path().join("vectors.lance"),
            VectorStoreConfig { dimension: 8 },
        )
        .await
        .unwrap();
        (store, temp_dir)
    }

    #[test]
    fn sql_quote_escapes_single_quotes() {
        assert_eq!(sql_quote("it's"), "'it''s'");
    }

    #[tokio::test]
    async fn upsert_is_idempotent_per_identity() {
        let (store, _temp_dir) = test_store().await;
        let rows = vec![row("a.rs", "k1", 0, "ws", "main"), row("a.rs", "k1", 1, "ws", "main")];
        store.upsert(rows.clone()).await.unwrap();
        store.upsert(rows).await.unwrap();
        assert_eq!(store.count().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn copy_for_tag_duplicates_rows_without_reembedding() {
        let (store, _temp_dir) = test_store().await;
        store
            .upsert(vec![row("a.rs", "k1", 0, "ws", "main")])
            .await
            .unwrap();

        let copied = store.copy_for_tag("k1", "a.rs", "ws", "feature").await.unwrap();
        assert_eq!(copied, 1);
        assert_eq!(store.count().await.unwrap(), 2);

        // Copying again is a no-op: the target identity already exists.
        let copied = store.copy_for_tag("k1", "a.rs", "ws", "feature").await.unwrap();
        assert_eq!(copied, 0);
        assert_eq!(store.count().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn copy_for_tag_handles_a_rename_within_one_tag() {
        let (store, _temp_dir) = test_store().await;
        store
            .upsert(vec![
                row("a.rs", "k1", 0, "ws", "main"),
                row("a.rs", "k1", 1, "ws", "main"),
            ])
            .await
            .unwrap();

        // Same tag, new path: both chunks must land under the new name.
        let copied = store.copy_for_tag("k1", "b.rs", "ws", "main").await.unwrap();
        assert_eq!(copied, 2);

        store.delete("a.rs", "k1", "ws", "main").await.unwrap();
        let hits = store
            .search(vec![1.0; 8], &[("ws".to_string(), "main".to_string())], 10, None)
            .await
            .unwrap();
        assert_eq!(hits.len(), 2);
        assert!(hits.iter().all(|hit| hit.path == "b.rs"));
    }

    #[tokio::test]
    async fn delete_removes_only_the_addressed_tag() {
        let (store, _temp_dir) = test_store().await;
        store
            .upsert(vec![row("a.rs", "k1", 0, "ws", "main")])
            .await
            .unwrap();
        store.copy_for_tag("k1", "a.rs", "ws", "feature").await.unwrap();

        store.delete("a.rs", "k1", "ws", "feature").await.unwrap();
        assert_eq!(store.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn search_filters_by_tag() {
        let (store, _temp_dir) = test_store().await;
        store
            .upsert(vec![
                row("a.rs", "k1", 0, "ws", "main"),
                row("b.rs", "k2", 3, "ws", "feature"),
            ])
            .await
            .unwrap();

        let hits = store
            .search(
                vec![3.0; 8],
                &[("ws".to_string(), "feature".to_string())],
                10,
                None,
            )
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].path, "b.rs");
    }

    #[tokio::test]
    async fn destroy_is_silent_when_missing() {
        let temp_dir = TempDir::new().unwrap();
        VectorStore::destroy(&temp_dir.path().join("missing"));
    }
}
