/*!
# Sidekick Codebase Indexer

The incremental multi-index engine. A content-addressed, tag-based planner
compares the durable catalog against a workspace snapshot and classifies
the difference into compute / add-tag / remove-tag / del work; per-artifact
indexes (chunks, full-text, vectors, snippets) consume the plan and make
their side effects durable before the shared catalog records them. The
orchestrator walks directories, batches plans, streams progress, and
honors pause and cancellation cooperatively.

## Example

```no_run
use sidekick_codebase_indexer::{
    ArtifactIndex, ChunkIndex, CodebaseIndexer, DiskFileReader, FullTextIndex,
    IndexerConfig, NoVcsInfo, SnippetsIndex,
};
use sidekick_code_chunker::ChunkerConfig;
use sidekick_index_catalog::{Database, SqliteCatalog};
use std::sync::Arc;
use tokio_stream::StreamExt;
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let db = Database::open(std::path::Path::new(".sidekick/index.sqlite"))?;
    let reader: Arc<dyn sidekick_codebase_indexer::FileReader> = Arc::new(DiskFileReader);
    let artifacts: Vec<Arc<dyn ArtifactIndex>> = vec![
        Arc::new(ChunkIndex::new(db.clone(), reader.clone(), ChunkerConfig::default())),
        Arc::new(FullTextIndex::new(db.clone())),
        Arc::new(SnippetsIndex::new(db.clone(), reader.clone())),
    ];
    let indexer = CodebaseIndexer::new(
        SqliteCatalog::new(db),
        artifacts,
        reader,
        Arc::new(NoVcsInfo),
        IndexerConfig::default(),
        None,
    );

    let mut progress = indexer.refresh_dirs(vec!["/workspace".into()], CancellationToken::new());
    while let Some(update) = progress.next().await {
        println!("{:?} {:.0}% {}", update.status, update.progress * 100.0, update.desc);
    }
    Ok(())
}
```
*/

mod artifact;
mod chunk_index;
mod error;
mod fts_index;
mod global_cache_index;
mod orchestrator;
mod plan;
mod planner;
mod snippets_index;
mod vector_index;
mod walker;

pub use artifact::{ArtifactIndex, ProgressReporter};
pub use chunk_index::ChunkIndex;
pub use error::{IndexError, Result};
pub use fts_index::{FtsQuery, FullTextIndex};
pub use global_cache_index::GlobalCacheIndex;
pub use orchestrator::{CodebaseIndexer, IndexerConfig, NoVcsInfo, WorkspaceInfo};
pub use plan::{CompleteCallback, RefreshPlan};
pub use planner::{cache_key_of, plan_refresh, DiskFileReader, FileReader, PlannerOutput};
pub use snippets_index::{CodeSnippet, SnippetsIndex};
pub use vector_index::VectorIndex;
pub use walker::{canonical_uri, walk_dir_stats, MAX_INDEXABLE_FILE_SIZE};
