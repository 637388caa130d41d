use crate::artifact::{ArtifactIndex, ProgressReporter};
use crate::error::{IndexError, Result};
use crate::planner::{plan_refresh, FileReader};
use crate::walker::{canonical_uri, walk_dir_stats};
use async_trait::async_trait;
use log::{info, warn};
use serde::{Deserialize, Serialize};
use sidekick_index_catalog::{ApplyKind, SqliteCatalog};
use sidekick_protocol::{FileStats, FileStatsEntry, ProgressUpdate, Tag};
use sidekick_vector_store::VectorStore;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, UNIX_EPOCH};
use tokio::sync::{mpsc, watch};
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;

/// Source of branch and repo identity for a workspace root. The IDE
/// messenger implements this in production.
#[async_trait]
pub trait WorkspaceInfo: Send + Sync {
    /// Current VCS branch, empty string when not under version control.
    async fn branch(&self, dir: &str) -> String;
    async fn repo_name(&self, dir: &str) -> Option<String>;
}

/// Workspace without version control: empty branch, no repo name.
pub struct NoVcsInfo;

#[async_trait]
impl WorkspaceInfo for NoVcsInfo {
    async fn branch(&self, _dir: &str) -> String {
        String::new()
    }

    async fn repo_name(&self, _dir: &str) -> Option<String> {
        None
    }
}

/// Configuration for the indexer orchestrator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexerConfig {
    /// Plan items processed per batch before re-checking pause/cancel.
    #[serde(default = "default_files_per_batch")]
    pub files_per_batch: usize,

    /// Poll interval while paused, in milliseconds.
    #[serde(default = "default_pause_poll_ms")]
    pub pause_poll_ms: u64,
}

fn default_files_per_batch() -> usize {
    500
}

fn default_pause_poll_ms() -> u64 {
    100
}

impl Default for IndexerConfig {
    fn default() -> Self {
        Self {
            files_per_batch: default_files_per_batch(),
            pause_poll_ms: default_pause_poll_ms(),
        }
    }
}

impl IndexerConfig {
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.files_per_batch == 0 {
            return Err("files_per_batch must be > 0".to_string());
        }
        if self.pause_poll_ms == 0 {
            return Err("pause_poll_ms must be > 0".to_string());
        }
        Ok(())
    }
}

/// Walks workspaces, plans per artifact, batches, streams progress, and
/// respects pause and cancellation.
pub struct CodebaseIndexer {
    catalog: SqliteCatalog,
    artifacts: Vec<Arc<dyn ArtifactIndex>>,
    reader: Arc<dyn FileReader>,
    workspace: Arc<dyn WorkspaceInfo>,
    config: IndexerConfig,
    pause_tx: watch::Sender<bool>,
    pause_rx: watch::Receiver<bool>,
    vector_store_path: Option<PathBuf>,
}

impl CodebaseIndexer {
    pub fn new(
        catalog: SqliteCatalog,
        artifacts: Vec<Arc<dyn ArtifactIndex>>,
        reader: Arc<dyn FileReader>,
        workspace: Arc<dyn WorkspaceInfo>,
        config: IndexerConfig,
        vector_store_path: Option<PathBuf>,
    ) -> Self {
        let (pause_tx, pause_rx) = watch::channel(false);
        Self {
            catalog,
            artifacts,
            reader,
            workspace,
            config,
            pause_tx,
            pause_rx,
            vector_store_path,
        }
    }

    /// Pause or resume indexing. Running refreshes poll this between
    /// batches.
    pub fn set_paused(&self, paused: bool) {
        let _ = self.pause_tx.send(paused);
    }

    pub fn is_paused(&self) -> bool {
        *self.pause_rx.borrow()
    }

    /// Refresh every artifact for the given workspace roots, streaming
    /// progress. Cancellation yields exactly one `cancelled` update and
    /// ends the stream.
    pub fn refresh_dirs(
        &self,
        dirs: Vec<String>,
        cancel: CancellationToken,
    ) -> ReceiverStream<ProgressUpdate> {
        let (tx, rx) = mpsc::channel(256);
        let run = RefreshRun {
            catalog: self.catalog.clone(),
            artifacts: self.artifacts.clone(),
            reader: self.reader.clone(),
            workspace: self.workspace.clone(),
            config: self.config.clone(),
            pause_rx: self.pause_rx.clone(),
        };

        tokio::spawn(async move {
            run.refresh_dirs(dirs, cancel, tx).await;
        });
        ReceiverStream::new(rx)
    }

    /// Refresh exactly the given files under one workspace root. Artifacts
    /// whose filtered plan is empty are skipped entirely. Progress is
    /// logged, not streamed.
    pub async fn refresh_files(&self, dir: &str, files: &[String]) -> Result<()> {
        let dir = canonical_uri(dir);
        let paths: Vec<String> = files.iter().map(|f| canonical_uri(f)).collect();

        let mut stats = FileStats::new();
        for path in &paths {
            if let Ok(metadata) = tokio::fs::metadata(path).await {
                let last_modified = metadata
                    .modified()
                    .ok()
                    .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
                    .map(|d| d.as_millis() as u64)
                    .unwrap_or(0);
                stats.insert(
                    path.clone(),
                    FileStatsEntry {
                        last_modified,
                        size: metadata.len(),
                    },
                );
            }
        }

        let branch = self.workspace.branch(&dir).await;
        let repo = self.workspace.repo_name(&dir).await;
        let cancel = CancellationToken::new();
        // Sink reporter: file-event refreshes do not surface progress.
        let (sink_tx, _sink_rx) = mpsc::channel(1);

        for artifact in &self.artifacts {
            let tag = Tag::new(dir.clone(), branch.clone(), artifact.artifact_id());
            let output = plan_refresh(&self.catalog, &tag, &stats, &self.reader).await?;
            let filtered = output.plan.filter_paths(&paths);
            let touched: Vec<_> = output
                .touch_last_updated
                .iter()
                .filter(|item| paths.contains(&item.path))
                .cloned()
                .collect();

            if filtered.is_empty() && touched.is_empty() {
                continue;
            }

            let reporter = ProgressReporter::new(sink_tx.clone(), 0.0, 1.0);
            artifact
                .update(&tag, &filtered, &output.complete, repo.as_deref(), &reporter, &cancel)
                .await?;
            (output.complete)(&touched, ApplyKind::UpdateLastUpdated)?;
        }

        info!("Refreshed {} files under {dir}", paths.len());
        Ok(())
    }

    /// Delete the catalog database and the vector store tree. Failures are
    /// logged, not fatal; the caller re-opens stores afterwards.
    pub fn clear_indexes(&self) {
        if let Some(path) = self.catalog.database().path() {
            for suffix in ["", "-wal", "-shm"] {
                let mut target = path.as_os_str().to_owned();
                target.push(suffix);
                if let Err(e) = std::fs::remove_file(PathBuf::from(&target)) {
                    if e.kind() != std::io::ErrorKind::NotFound {
                        warn!("Failed to remove {:?}: {e}", target);
                    }
                }
            }
        }
        if let Some(vector_path) = &self.vector_store_path {
            VectorStore::destroy(vector_path);
        }
        info!("Cleared on-disk indexes");
    }
}

/// Per-run state cloned out of the indexer so the stream can outlive the
/// borrow.
struct RefreshRun {
    catalog: SqliteCatalog,
    artifacts: Vec<Arc<dyn ArtifactIndex>>,
    reader: Arc<dyn FileReader>,
    workspace: Arc<dyn WorkspaceInfo>,
    config: IndexerConfig,
    pause_rx: watch::Receiver<bool>,
}

enum RunControl {
    Continue,
    NextDir,
    Stop,
}

impl RefreshRun {
    async fn refresh_dirs(
        &self,
        dirs: Vec<String>,
        cancel: CancellationToken,
        tx: mpsc::Sender<ProgressUpdate>,
    ) {
        let _ = tx.send(ProgressUpdate::loading("Planning indexing")).await;

        let slice_count = (dirs.len() * self.artifacts.len()).max(1);
        'dirs: for (dir_index, raw_dir) in dirs.iter().enumerate() {
            if cancel.is_cancelled() {
                let _ = tx.send(ProgressUpdate::cancelled()).await;
                return;
            }

            let dir = canonical_uri(raw_dir);
            let stats = match walk_dir_stats(&dir) {
                Ok(stats) => stats,
                Err(e) => {
                    let _ = tx
                        .send(ProgressUpdate::failed(
                            format!("Failed to walk {dir}: {e}"),
                            false,
                            Some(format!("{e:?}")),
                        ))
                        .await;
                    continue;
                }
            };
            let branch = self.workspace.branch(&dir).await;
            let repo = self.workspace.repo_name(&dir).await;
            info!(
                "Refreshing {dir} (branch {branch:?}): {} candidate files",
                stats.len()
            );

            for (artifact_index, artifact) in self.artifacts.iter().enumerate() {
                let slice = dir_index * self.artifacts.len() + artifact_index;
                let base = slice as f64 / slice_count as f64;
                let span = 1.0 / slice_count as f64;

                match self
                    .run_artifact(artifact, &dir, &branch, repo.as_deref(), &stats, base, span, &cancel, &tx)
                    .await
                {
                    RunControl::Continue => {}
                    RunControl::NextDir => continue 'dirs,
                    RunControl::Stop => return,
                }
            }
        }

        let _ = tx.send(ProgressUpdate::done()).await;
    }

    #[allow(clippy::too_many_arguments)]
    async fn run_artifact(
        &self,
        artifact: &Arc<dyn ArtifactIndex>,
        dir: &str,
        branch: &str,
        repo: Option<&str>,
        stats: &FileStats,
        base: f64,
        span: f64,
        cancel: &CancellationToken,
        tx: &mpsc::Sender<ProgressUpdate>,
    ) -> RunControl {
        let tag = Tag::new(dir, branch, artifact.artifact_id());
        let output = match plan_refresh(&self.catalog, &tag, stats, &self.reader).await {
            Ok(output) => output,
            Err(e) => return self.handle_error(e, tx).await,
        };

        let plan_len = output.plan.len().max(1);
        let mut items_done = 0usize;
        for batch in output.plan.batches(self.config.files_per_batch) {
            if let RunControl::Stop = self.wait_while_paused(base, cancel, tx).await {
                return RunControl::Stop;
            }
            if cancel.is_cancelled() {
                let _ = tx.send(ProgressUpdate::cancelled()).await;
                return RunControl::Stop;
            }

            let batch_base = base + span * (items_done as f64 / plan_len as f64);
            let batch_span = span * (batch.len() as f64 / plan_len as f64);
            let reporter = ProgressReporter::new(tx.clone(), batch_base, batch_span);

            if let Err(e) = artifact
                .update(&tag, &batch, &output.complete, repo, &reporter, cancel)
                .await
            {
                return self.handle_error(e, tx).await;
            }
            items_done += batch.len();
        }

        if let Err(e) = (output.complete)(&output.touch_last_updated, ApplyKind::UpdateLastUpdated)
        {
            return self.handle_error(e, tx).await;
        }
        RunControl::Continue
    }

    /// Emit one `paused` update, then poll in slices until resumed.
    /// Cancellation still wins while paused.
    async fn wait_while_paused(
        &self,
        progress: f64,
        cancel: &CancellationToken,
        tx: &mpsc::Sender<ProgressUpdate>,
    ) -> RunControl {
        if !*self.pause_rx.borrow() {
            return RunControl::Continue;
        }
        let _ = tx.send(ProgressUpdate::paused(progress)).await;
        loop {
            if cancel.is_cancelled() {
                let _ = tx.send(ProgressUpdate::cancelled()).await;
                return RunControl::Stop;
            }
            if !*self.pause_rx.borrow() {
                return RunControl::Continue;
            }
            tokio::time::sleep(Duration::from_millis(self.config.pause_poll_ms)).await;
        }
    }

    /// Cancellation ends the run with a single `cancelled` update. A model
    /// failure ends the run so the outer layer can surface it without
    /// clearing anything. Every other failure is reported with its
    /// clear-indexes classification and indexing moves to the next
    /// directory.
    async fn handle_error(&self, e: IndexError, tx: &mpsc::Sender<ProgressUpdate>) -> RunControl {
        match e {
            IndexError::Cancelled => {
                let _ = tx.send(ProgressUpdate::cancelled()).await;
                RunControl::Stop
            }
            e if e.is_model_error() => {
                warn!("Model failure while indexing: {e}");
                let _ = tx
                    .send(ProgressUpdate::failed(
                        e.to_string(),
                        false,
                        Some(format!("{e:?}")),
                    ))
                    .await;
                RunControl::Stop
            }
            e => {
                warn!("Indexing failure: {e}");
                let _ = tx
                    .send(ProgressUpdate::failed(
                        e.to_string(),
                        e.should_clear_indexes(),
                        Some(format!("{e:?}")),
                    ))
                    .await;
                RunControl::NextDir
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk_index::{stored_chunks, ChunkIndex};
    use crate::fts_index::{FtsQuery, FullTextIndex};
    use crate::plan::{CompleteCallback, RefreshPlan};
    use crate::planner::{cache_key_of, DiskFileReader};
    use crate::snippets_index::SnippetsIndex;
    use pretty_assertions::assert_eq;
    use sidekick_code_chunker::ChunkerConfig;
    use sidekick_index_catalog::Database;
    use sidekick_protocol::{ArtifactId, IndexingStatus};
    use std::fs;
    use tempfile::TempDir;
    use tokio_stream::StreamExt;

    fn standard_indexer(db: &Database) -> CodebaseIndexer {
        let reader: Arc<dyn FileReader> = Arc::new(DiskFileReader);
        let artifacts: Vec<Arc<dyn ArtifactIndex>> = vec![
            Arc::new(ChunkIndex::new(
                db.clone(),
                reader.clone(),
                ChunkerConfig::default(),
            )),
            Arc::new(FullTextIndex::new(db.clone())),
            Arc::new(SnippetsIndex::new(db.clone(), reader.clone())),
        ];
        CodebaseIndexer::new(
            SqliteCatalog::new(db.clone()),
            artifacts,
            reader,
            Arc::new(NoVcsInfo),
            IndexerConfig::default(),
            None,
        )
    }

    async fn drain(
        mut stream: ReceiverStream<ProgressUpdate>,
    ) -> Vec<ProgressUpdate> {
        let mut updates = Vec::new();
        while let Some(update) = stream.next().await {
            updates.push(update);
        }
        updates
    }

    #[tokio::test]
    async fn first_index_computes_and_finishes_done() {
        let workspace = TempDir::new().unwrap();
        fs::write(workspace.path().join("a.txt"), "five hundred bytes of text").unwrap();

        let db = Database::open_in_memory().unwrap();
        let indexer = standard_indexer(&db);
        let catalog = SqliteCatalog::new(db.clone());

        let updates = drain(indexer.refresh_dirs(
            vec![workspace.path().to_string_lossy().to_string()],
            CancellationToken::new(),
        ))
        .await;

        let last = updates.last().unwrap();
        assert_eq!(last.status, IndexingStatus::Done);
        assert_eq!(last.progress, 1.0);

        // One catalog row per artifact tag, keyed by the content hash.
        let dir = canonical_uri(&workspace.path().to_string_lossy());
        let expected_key = cache_key_of(b"five hundred bytes of text");
        for artifact in [ArtifactId::Chunks, ArtifactId::Fts, ArtifactId::Snippets] {
            let rows = catalog
                .get_saved_items(&Tag::new(dir.clone(), "", artifact))
                .unwrap();
            assert_eq!(rows.len(), 1, "artifact {artifact}");
            assert_eq!(rows[0].cache_key, expected_key);
        }
    }

    #[tokio::test]
    async fn progress_is_monotonic_between_transitions() {
        let workspace = TempDir::new().unwrap();
        for i in 0..8 {
            fs::write(
                workspace.path().join(format!("f{i}.txt")),
                format!("file number {i} body"),
            )
            .unwrap();
        }

        let db = Database::open_in_memory().unwrap();
        let indexer = standard_indexer(&db);
        let updates = drain(indexer.refresh_dirs(
            vec![workspace.path().to_string_lossy().to_string()],
            CancellationToken::new(),
        ))
        .await;

        let mut last = 0.0f64;
        for update in updates
            .iter()
            .filter(|u| u.status == IndexingStatus::Indexing)
        {
            assert!(
                update.progress + 1e-9 >= last,
                "fraction went backwards: {} < {last}",
                update.progress
            );
            last = update.progress;
        }
    }

    #[tokio::test]
    async fn reindex_of_unchanged_workspace_stays_done() {
        let workspace = TempDir::new().unwrap();
        fs::write(workspace.path().join("a.rs"), "fn a() {}\n").unwrap();

        let db = Database::open_in_memory().unwrap();
        let indexer = standard_indexer(&db);
        let dirs = vec![workspace.path().to_string_lossy().to_string()];

        drain(indexer.refresh_dirs(dirs.clone(), CancellationToken::new())).await;
        let updates = drain(indexer.refresh_dirs(dirs, CancellationToken::new())).await;

        assert_eq!(updates.last().unwrap().status, IndexingStatus::Done);
        // Second run should have found nothing to compute.
        assert!(updates
            .iter()
            .all(|u| !u.desc.starts_with("Chunking")));
    }

    #[tokio::test]
    async fn rename_preserves_artifacts_under_the_new_path() {
        let workspace = TempDir::new().unwrap();
        let source = "fn renamed_survivor() {\n    let kept = 1;\n    kept\n}\n";
        fs::write(workspace.path().join("a.rs"), source).unwrap();

        let db = Database::open_in_memory().unwrap();
        let indexer = standard_indexer(&db);
        let dirs = vec![workspace.path().to_string_lossy().to_string()];

        let updates = drain(indexer.refresh_dirs(dirs.clone(), CancellationToken::new())).await;
        assert_eq!(updates.last().unwrap().status, IndexingStatus::Done);

        fs::rename(
            workspace.path().join("a.rs"),
            workspace.path().join("b.rs"),
        )
        .unwrap();
        let updates = drain(indexer.refresh_dirs(dirs, CancellationToken::new())).await;
        assert_eq!(updates.last().unwrap().status, IndexingStatus::Done);

        let dir = canonical_uri(&workspace.path().to_string_lossy());
        let key = cache_key_of(source.as_bytes());
        let old_path = format!("{dir}/a.rs");
        let new_path = format!("{dir}/b.rs");

        // Chunk rows moved with the file.
        let chunks = stored_chunks(&db, &new_path, &key).unwrap();
        assert!(!chunks.is_empty());
        assert!(chunks[0].content.contains("renamed_survivor"));
        assert!(stored_chunks(&db, &old_path, &key).unwrap().is_empty());

        // Full-text search finds the new path, and only it.
        let fts = FullTextIndex::new(db.clone());
        let hits = fts
            .retrieve(&FtsQuery::new(
                vec![Tag::new(dir.clone(), "", ArtifactId::Fts)],
                "renamed_survivor",
                10,
            ))
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].filepath, new_path);

        // Snippets followed the rename without re-parsing.
        let snippets = SnippetsIndex::new(db.clone(), Arc::new(DiskFileReader));
        let extracted = snippets.snippets_for_path(&new_path).unwrap();
        assert!(extracted.iter().any(|s| s.title == "renamed_survivor"));
        assert!(snippets.snippets_for_path(&old_path).unwrap().is_empty());

        // The catalog agrees: one row, under the new path.
        let catalog = SqliteCatalog::new(db);
        let rows = catalog
            .get_saved_items(&Tag::new(dir, "", ArtifactId::Chunks))
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].path, new_path);
    }

    #[tokio::test]
    async fn cancellation_yields_exactly_one_cancelled_update() {
        let workspace = TempDir::new().unwrap();
        // Enough files that the producer outpaces the progress channel and
        // is still mid-run when cancellation lands.
        for i in 0..200 {
            fs::write(
                workspace.path().join(format!("f{i}.txt")),
                format!("body of file number {i} with padding to chunk"),
            )
            .unwrap();
        }

        let db = Database::open_in_memory().unwrap();
        let indexer = standard_indexer(&db);
        let cancel = CancellationToken::new();

        let mut stream = indexer.refresh_dirs(
            vec![workspace.path().to_string_lossy().to_string()],
            cancel.clone(),
        );

        let mut updates = Vec::new();
        while let Some(update) = stream.next().await {
            updates.push(update);
            if updates.len() == 2 {
                cancel.cancel();
            }
        }

        let cancelled: Vec<_> = updates
            .iter()
            .filter(|u| u.status == IndexingStatus::Cancelled)
            .collect();
        assert_eq!(cancelled.len(), 1);
        assert_eq!(updates.last().unwrap().status, IndexingStatus::Cancelled);
    }

    #[tokio::test]
    async fn pause_emits_paused_then_resumes() {
        let workspace = TempDir::new().unwrap();
        fs::write(workspace.path().join("a.txt"), "small file").unwrap();

        let db = Database::open_in_memory().unwrap();
        let indexer = standard_indexer(&db);
        indexer.set_paused(true);

        let mut stream = indexer.refresh_dirs(
            vec![workspace.path().to_string_lossy().to_string()],
            CancellationToken::new(),
        );

        let mut updates = Vec::new();
        let mut resumed = false;
        while let Some(update) = stream.next().await {
            if update.status == IndexingStatus::Paused && !resumed {
                indexer.set_paused(false);
                resumed = true;
            }
            updates.push(update);
        }

        assert!(updates.iter().any(|u| u.status == IndexingStatus::Paused));
        assert_eq!(updates.last().unwrap().status, IndexingStatus::Done);
    }

    #[tokio::test]
    async fn failing_artifact_reports_failed_and_continues() {
        struct FailingIndex;

        #[async_trait]
        impl ArtifactIndex for FailingIndex {
            fn artifact_id(&self) -> ArtifactId {
                ArtifactId::Chunks
            }

            async fn update(
                &self,
                _tag: &Tag,
                _plan: &RefreshPlan,
                _complete: &CompleteCallback,
                _repo: Option<&str>,
                _progress: &ProgressReporter,
                _cancel: &CancellationToken,
            ) -> Result<()> {
                Err(IndexError::Io(std::io::Error::new(
                    std::io::ErrorKind::Other,
                    "disk I/O error",
                )))
            }
        }

        let workspace = TempDir::new().unwrap();
        fs::write(workspace.path().join("a.txt"), "body").unwrap();

        let db = Database::open_in_memory().unwrap();
        let indexer = CodebaseIndexer::new(
            SqliteCatalog::new(db.clone()),
            vec![Arc::new(FailingIndex)],
            Arc::new(DiskFileReader),
            Arc::new(NoVcsInfo),
            IndexerConfig::default(),
            None,
        );

        let updates = drain(indexer.refresh_dirs(
            vec![workspace.path().to_string_lossy().to_string()],
            CancellationToken::new(),
        ))
        .await;

        let failed = updates
            .iter()
            .find(|u| u.status == IndexingStatus::Failed)
            .expect("failed update");
        assert_eq!(failed.should_clear_indexes, Some(true));
        assert!(failed.debug_info.is_some());
        // The run still finishes (no remaining dirs, so done follows).
        assert_eq!(updates.last().unwrap().status, IndexingStatus::Done);
    }

    #[tokio::test]
    async fn refresh_files_skips_artifacts_with_empty_plans() {
        let workspace = TempDir::new().unwrap();
        let file = workspace.path().join("a.rs");
        fs::write(&file, "fn a() {}\n").unwrap();

        let db = Database::open_in_memory().unwrap();
        let indexer = standard_indexer(&db);
        let catalog = SqliteCatalog::new(db.clone());
        let dir = workspace.path().to_string_lossy().to_string();

        // Index the single file directly.
        indexer
            .refresh_files(&dir, &[file.to_string_lossy().to_string()])
            .await
            .unwrap();

        let tag = Tag::new(canonical_uri(&dir), "", ArtifactId::Chunks);
        assert_eq!(catalog.get_saved_items(&tag).unwrap().len(), 1);

        // A second refresh has nothing to do and must not error.
        indexer
            .refresh_files(&dir, &[file.to_string_lossy().to_string()])
            .await
            .unwrap();
        assert_eq!(catalog.get_saved_items(&tag).unwrap().len(), 1);
    }

    #[tokio::test]
    async fn refresh_files_picks_up_content_changes() {
        let workspace = TempDir::new().unwrap();
        let file = workspace.path().join("a.rs");
        fs::write(&file, "fn old_version() {}\n").unwrap();

        let db = Database::open_in_memory().unwrap();
        let indexer = standard_indexer(&db);
        let dir = workspace.path().to_string_lossy().to_string();
        let file_uri = file.to_string_lossy().to_string();

        indexer.refresh_files(&dir, &[file_uri.clone()]).await.unwrap();

        // Rewrite and refresh again; FTS should now find the new symbol.
        fs::write(&file, "fn brand_new_symbol() {}\n").unwrap();
        filetime_bump(&file);
        indexer.refresh_files(&dir, &[file_uri]).await.unwrap();

        let fts = FullTextIndex::new(db.clone());
        let hits = fts
            .retrieve(&FtsQuery::new(
                vec![Tag::new(canonical_uri(&dir), "", ArtifactId::Fts)],
                "brand_new_symbol",
                10,
            ))
            .unwrap();
        assert_eq!(hits.len(), 1);
    }

    /// Push a file's mtime safely past the catalog's lastUpdated stamp.
    fn filetime_bump(path: &std::path::Path) {
        let future = std::time::SystemTime::now() + Duration::from_secs(5);
        let file = fs::File::options().write(true).open(path).unwrap();
        file.set_times(
            fs::FileTimes::new()
                .set_accessed(future)
                .set_modified(future),
        )
        .unwrap();
    }

    #[tokio::test]
    async fn clear_indexes_removes_database_file() {
        let state_dir = TempDir::new().unwrap();
        let db_path = state_dir.path().join("index.sqlite");
        let db = Database::open(&db_path).unwrap();
        let indexer = standard_indexer(&db);

        assert!(db_path.exists());
        indexer.clear_indexes();
        assert!(!db_path.exists());
    }
}
