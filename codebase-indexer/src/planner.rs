use crate::error::Result;
use crate::global_cache_index::GlobalCacheIndex;
use crate::plan::{CompleteCallback, RefreshPlan};
use crate::walker::MAX_INDEXABLE_FILE_SIZE;
use async_trait::async_trait;
use futures::future::join_all;
use log::debug;
use sha2::{Digest, Sha256};
use sidekick_index_catalog::{ApplyKind, CatalogRow, SqliteCatalog};
use sidekick_protocol::{FileStats, PathAndCacheKey, Tag};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Semaphore;

/// Bound on concurrent file reads while planning, to avoid handle
/// exhaustion on large workspaces.
const MAX_PLANNING_READS: usize = 10;

/// Source of file contents. The IDE messenger is the production
/// implementation; [`DiskFileReader`] serves the local case and tests.
#[async_trait]
pub trait FileReader: Send + Sync {
    async fn read_file(&self, path: &str) -> std::io::Result<Vec<u8>>;
}

/// Reads straight from the local filesystem.
pub struct DiskFileReader;

#[async_trait]
impl FileReader for DiskFileReader {
    async fn read_file(&self, path: &str) -> std::io::Result<Vec<u8>> {
        tokio::fs::read(path).await
    }
}

/// Lowercase hex SHA-256 of file bytes: the cache key.
pub fn cache_key_of(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

/// What the planner hands back: the classified plan, the unchanged files
/// whose timestamp should advance, and the callback that persists effects.
pub struct PlannerOutput {
    pub plan: RefreshPlan,
    pub touch_last_updated: Vec<PathAndCacheKey>,
    pub complete: CompleteCallback,
}

struct PathGroup {
    latest: CatalogRow,
    all_keys: Vec<String>,
}

/// Compare the catalog's view of one tag against a workspace snapshot and
/// classify the difference.
pub async fn plan_refresh(
    catalog: &SqliteCatalog,
    tag: &Tag,
    file_stats: &FileStats,
    reader: &Arc<dyn FileReader>,
) -> Result<PlannerOutput> {
    // Oversized files never take part, even when handed in directly.
    let file_stats: FileStats = file_stats
        .iter()
        .filter(|(_, entry)| entry.size <= MAX_INDEXABLE_FILE_SIZE)
        .map(|(path, entry)| (path.clone(), *entry))
        .collect();

    let saved = catalog.get_saved_items(tag)?;
    let mut groups: HashMap<String, PathGroup> = HashMap::new();
    for row in saved {
        match groups.entry(row.path.clone()) {
            std::collections::hash_map::Entry::Occupied(mut entry) => {
                let group = entry.get_mut();
                group.all_keys.push(row.cache_key.clone());
                if row.last_updated > group.latest.last_updated {
                    group.latest = row;
                }
            }
            std::collections::hash_map::Entry::Vacant(entry) => {
                entry.insert(PathGroup {
                    all_keys: vec![row.cache_key.clone()],
                    latest: row,
                });
            }
        }
    }

    let mut add: Vec<PathAndCacheKey> = Vec::new();
    let mut remove: Vec<PathAndCacheKey> = Vec::new();
    let mut update_new_version: Vec<PathAndCacheKey> = Vec::new();
    let mut update_old_version: Vec<PathAndCacheKey> = Vec::new();
    let mut touch_last_updated: Vec<PathAndCacheKey> = Vec::new();

    let semaphore = Arc::new(Semaphore::new(MAX_PLANNING_READS));

    // Known paths: deleted, unchanged, or rewritten.
    for (path, group) in &groups {
        let Some(stats) = file_stats.get(path) else {
            for key in &group.all_keys {
                remove.push(PathAndCacheKey::new(path.clone(), key.clone()));
            }
            continue;
        };

        if stats.last_modified <= group.latest.last_updated {
            continue;
        }

        let permit = semaphore.acquire().await.map_err(|_| {
            std::io::Error::new(std::io::ErrorKind::Other, "planner semaphore closed")
        })?;
        let bytes = reader.read_file(path).await?;
        drop(permit);
        let new_key = cache_key_of(&bytes);

        if new_key == group.latest.cache_key {
            touch_last_updated.push(PathAndCacheKey::new(path.clone(), new_key));
            for key in &group.all_keys {
                if key != &group.latest.cache_key {
                    update_old_version.push(PathAndCacheKey::new(path.clone(), key.clone()));
                }
            }
        } else {
            update_new_version.push(PathAndCacheKey::new(path.clone(), new_key));
            for key in &group.all_keys {
                update_old_version.push(PathAndCacheKey::new(path.clone(), key.clone()));
            }
        }
    }

    // Paths the catalog has never seen, hashed with bounded concurrency.
    let new_paths: Vec<&String> = file_stats
        .keys()
        .filter(|path| !groups.contains_key(*path))
        .collect();
    let reads = new_paths.iter().map(|path| {
        let semaphore = semaphore.clone();
        let reader = reader.clone();
        let path = (*path).clone();
        async move {
            let _permit = semaphore.acquire().await.ok()?;
            let bytes = reader.read_file(&path).await.ok()?;
            Some(PathAndCacheKey::new(path, cache_key_of(&bytes)))
        }
    });
    add.extend(join_all(reads).await.into_iter().flatten());

    // Classify against the global cache.
    let mut plan = RefreshPlan::default();
    for item in add.into_iter().chain(update_new_version) {
        let tags = catalog.get_tags_for(&item.cache_key, tag.artifact_id)?;
        if tags.is_empty() {
            plan.compute.push(item);
        } else {
            plan.add_tag.push(item);
        }
    }
    for item in remove.into_iter().chain(update_old_version) {
        let tags = catalog.get_tags_for(&item.cache_key, tag.artifact_id)?;
        let referenced_elsewhere = tags
            .iter()
            .any(|t| t.directory != tag.directory || t.branch != tag.branch);
        if referenced_elsewhere {
            plan.remove_tag.push(item);
        } else {
            plan.del.push(item);
        }
    }

    debug!(
        "Planned refresh for {tag}: {} compute, {} add_tag, {} remove_tag, {} del, {} touch",
        plan.compute.len(),
        plan.add_tag.len(),
        plan.remove_tag.len(),
        plan.del.len(),
        touch_last_updated.len()
    );

    let complete = make_complete_callback(catalog.clone(), tag.clone());
    Ok(PlannerOutput {
        plan,
        touch_last_updated,
        complete,
    })
}

/// The persistence side of a plan: tag-catalog mutation for every kind plus
/// the global-cache bookkeeping the [`GlobalCacheIndex`] owns. Idempotent
/// for `UpdateOldVersion`; `UpdateLastUpdated` and `UpdateNewVersion` never
/// touch the global cache.
fn make_complete_callback(catalog: SqliteCatalog, tag: Tag) -> CompleteCallback {
    let global_cache = GlobalCacheIndex::new(catalog.clone());
    Arc::new(move |items, kind| {
        catalog.apply(&tag, items, kind)?;
        global_cache.apply(&tag, items, kind)?;
        Ok(())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use sidekick_index_catalog::Database;
    use sidekick_protocol::{ArtifactId, FileStatsEntry};
    use std::collections::HashMap;

    struct MapReader(HashMap<String, Vec<u8>>);

    #[async_trait]
    impl FileReader for MapReader {
        async fn read_file(&self, path: &str) -> std::io::Result<Vec<u8>> {
            self.0.get(path).cloned().ok_or_else(|| {
                std::io::Error::new(std::io::ErrorKind::NotFound, path.to_string())
            })
        }
    }

    fn setup(
        files: &[(&str, &str, u64)],
    ) -> (SqliteCatalog, FileStats, Arc<dyn FileReader>) {
        let catalog = SqliteCatalog::new(Database::open_in_memory().unwrap());
        let mut stats = FileStats::new();
        let mut contents = HashMap::new();
        for (path, body, mtime) in files {
            stats.insert(
                path.to_string(),
                FileStatsEntry {
                    last_modified: *mtime,
                    size: body.len() as u64,
                },
            );
            contents.insert(path.to_string(), body.as_bytes().to_vec());
        }
        (catalog, stats, Arc::new(MapReader(contents)))
    }

    fn tag() -> Tag {
        Tag::new("/ws", "main", ArtifactId::Chunks)
    }

    async fn run_plan(
        catalog: &SqliteCatalog,
        stats: &FileStats,
        reader: &Arc<dyn FileReader>,
    ) -> PlannerOutput {
        plan_refresh(catalog, &tag(), stats, reader).await.unwrap()
    }

    /// Drive a plan to completion the way an artifact index would.
    fn complete_all(output: &PlannerOutput) {
        (output.complete)(&output.plan.compute, ApplyKind::Compute).unwrap();
        (output.complete)(&output.plan.add_tag, ApplyKind::Add).unwrap();
        (output.complete)(&output.plan.remove_tag, ApplyKind::Remove).unwrap();
        (output.complete)(&output.plan.del, ApplyKind::Remove).unwrap();
        (output.complete)(&output.touch_last_updated, ApplyKind::UpdateLastUpdated).unwrap();
    }

    #[tokio::test]
    async fn first_index_computes_everything() {
        let (catalog, stats, reader) = setup(&[("/ws/a.rs", "fn a() {}", 1000)]);
        let output = run_plan(&catalog, &stats, &reader).await;

        assert_eq!(output.plan.compute.len(), 1);
        assert!(output.plan.add_tag.is_empty());
        assert!(output.plan.del.is_empty());
        assert_eq!(output.plan.compute[0].cache_key, cache_key_of(b"fn a() {}"));
    }

    #[tokio::test]
    async fn replay_on_unchanged_workspace_is_empty() {
        let (catalog, stats, reader) = setup(&[("/ws/a.rs", "fn a() {}", 1000)]);
        let output = run_plan(&catalog, &stats, &reader).await;
        complete_all(&output);

        let replay = run_plan(&catalog, &stats, &reader).await;
        assert!(replay.plan.is_empty());
        assert!(replay.touch_last_updated.is_empty());
    }

    #[tokio::test]
    async fn deleted_file_becomes_del_when_last_reference() {
        let (catalog, stats, reader) = setup(&[("/ws/a.rs", "fn a() {}", 1000)]);
        let output = run_plan(&catalog, &stats, &reader).await;
        complete_all(&output);

        let empty = FileStats::new();
        let output = run_plan(&catalog, &empty, &reader).await;
        assert_eq!(output.plan.del.len(), 1);
        assert!(output.plan.remove_tag.is_empty());
    }

    #[tokio::test]
    async fn rename_of_identical_content_is_add_tag_plus_del() {
        let (catalog, stats, reader) = setup(&[("/ws/a.rs", "fn same() {}", 1000)]);
        let output = run_plan(&catalog, &stats, &reader).await;
        complete_all(&output);

        let (_, renamed_stats, renamed_reader) = setup(&[("/ws/b.rs", "fn same() {}", 2000)]);
        let output = run_plan(&catalog, &renamed_stats, &renamed_reader).await;

        // Same content under a new path: link the new path, drop the old.
        assert!(output.plan.compute.is_empty());
        assert_eq!(output.plan.add_tag.len(), 1);
        assert_eq!(output.plan.add_tag[0].path, "/ws/b.rs");
        assert_eq!(output.plan.del.len(), 1);
        assert_eq!(output.plan.del[0].path, "/ws/a.rs");

        complete_all(&output);
        let rows = catalog.get_saved_items(&tag()).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].path, "/ws/b.rs");
        let key = cache_key_of(b"fn same() {}");
        assert_eq!(catalog.get_tags_for(&key, ArtifactId::Chunks).unwrap().len(), 1);
    }

    #[tokio::test]
    async fn second_branch_add_tags_shared_content() {
        let (catalog, stats, reader) = setup(&[("/ws/a.rs", "fn shared() {}", 1000)]);
        let output = run_plan(&catalog, &stats, &reader).await;
        complete_all(&output);

        let feature = Tag::new("/ws", "feature", ArtifactId::Chunks);
        let output = plan_refresh(&catalog, &feature, &stats, &reader).await.unwrap();
        assert!(output.plan.compute.is_empty());
        assert_eq!(output.plan.add_tag.len(), 1);

        (output.complete)(&output.plan.add_tag, ApplyKind::Add).unwrap();
        let key = cache_key_of(b"fn shared() {}");
        assert_eq!(catalog.get_tags_for(&key, ArtifactId::Chunks).unwrap().len(), 2);
    }

    #[tokio::test]
    async fn removal_under_one_branch_is_remove_tag_when_shared() {
        let (catalog, stats, reader) = setup(&[("/ws/a.rs", "fn shared() {}", 1000)]);
        let main_output = run_plan(&catalog, &stats, &reader).await;
        complete_all(&main_output);

        let feature = Tag::new("/ws", "feature", ArtifactId::Chunks);
        let output = plan_refresh(&catalog, &feature, &stats, &reader).await.unwrap();
        (output.complete)(&output.plan.add_tag, ApplyKind::Add).unwrap();

        // File disappears from the feature branch only.
        let empty = FileStats::new();
        let output = plan_refresh(&catalog, &feature, &empty, &reader).await.unwrap();
        assert_eq!(output.plan.remove_tag.len(), 1);
        assert!(output.plan.del.is_empty());
    }

    #[tokio::test]
    async fn changed_content_yields_new_compute_and_old_del() {
        let (catalog, stats, reader) = setup(&[("/ws/a.rs", "fn v1() {}", 1000)]);
        let output = run_plan(&catalog, &stats, &reader).await;
        complete_all(&output);

        let future = sidekick_index_catalog::now_ms() + 60_000;
        let (_, new_stats, new_reader) = setup(&[("/ws/a.rs", "fn v2() {}", future)]);
        let output = run_plan(&catalog, &new_stats, &new_reader).await;

        assert_eq!(output.plan.compute.len(), 1);
        assert_eq!(output.plan.compute[0].cache_key, cache_key_of(b"fn v2() {}"));
        assert_eq!(output.plan.del.len(), 1);
        assert_eq!(output.plan.del[0].cache_key, cache_key_of(b"fn v1() {}"));

        complete_all(&output);
        let rows = catalog.get_saved_items(&tag()).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].cache_key, cache_key_of(b"fn v2() {}"));
    }

    #[tokio::test]
    async fn touched_but_unchanged_file_is_timestamp_only() {
        let (catalog, stats, reader) = setup(&[("/ws/a.rs", "fn same() {}", 1000)]);
        let output = run_plan(&catalog, &stats, &reader).await;
        complete_all(&output);

        // mtime advances past the recorded lastUpdated, content identical.
        let future = sidekick_index_catalog::now_ms() + 60_000;
        let (_, touched_stats, touched_reader) = setup(&[("/ws/a.rs", "fn same() {}", future)]);
        let output = run_plan(&catalog, &touched_stats, &touched_reader).await;

        assert!(output.plan.is_empty());
        assert_eq!(output.touch_last_updated.len(), 1);
    }

    #[tokio::test]
    async fn oversized_files_are_ignored() {
        let big = "x".repeat(16);
        let (catalog, mut stats, reader) = setup(&[("/ws/big.bin", big.as_str(), 1000)]);
        stats.get_mut("/ws/big.bin").unwrap().size = MAX_INDEXABLE_FILE_SIZE + 1;

        let output = run_plan(&catalog, &stats, &reader).await;
        assert!(output.plan.is_empty());
    }

    #[test]
    fn cache_key_is_lowercase_hex_sha256() {
        let key = cache_key_of(b"hello");
        assert_eq!(key.len(), 64);
        assert_eq!(
            key,
            "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"
        );
    }
}
