use crate::db::{now_ms, Database};
use crate::error::Result;
use log::debug;
use rusqlite::params;
use sidekick_protocol::{ArtifactId, PathAndCacheKey, Tag};

/// One row of the tag catalog as seen by the planner.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CatalogRow {
    pub path: String,
    pub cache_key: String,
    /// Milliseconds since the Unix epoch.
    pub last_updated: u64,
}

/// How a batch of items mutates the tag catalog.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ApplyKind {
    /// New content, full artifact work was done; upsert `(path, key, now)`.
    Compute,
    /// Content already known globally; upsert `(path, key, now)`.
    Add,
    /// Drop the matching `(path, key)` row for this tag.
    Remove,
    /// Unchanged content observed again; rewrite key and timestamp in place.
    UpdateLastUpdated,
    /// Content changed; upsert the new `(path, key, now)` row.
    UpdateNewVersion,
    /// Accounting only; the superseded key is removed via [`ApplyKind::Remove`].
    UpdateOldVersion,
}

/// Transactional operations over the tag catalog and global cache tables.
#[derive(Clone)]
pub struct SqliteCatalog {
    db: Database,
}

impl SqliteCatalog {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    /// Every row stored under `tag`.
    pub fn get_saved_items(&self, tag: &Tag) -> Result<Vec<CatalogRow>> {
        self.db.with_conn(|conn| {
            let mut stmt = conn.prepare_cached(
                "SELECT path, cacheKey, lastUpdated FROM tag_catalog
                 WHERE dir = ?1 AND branch = ?2 AND artifactId = ?3",
            )?;
            let rows = stmt.query_map(
                params![tag.directory, tag.branch, tag.artifact_id.as_str()],
                |row| {
                    Ok(CatalogRow {
                        path: row.get(0)?,
                        cache_key: row.get(1)?,
                        last_updated: row.get::<_, i64>(2)? as u64,
                    })
                },
            )?;
            rows.collect()
        })
    }

    /// All tags in the global cache that reference `cache_key` for the given
    /// artifact.
    pub fn get_tags_for(&self, cache_key: &str, artifact_id: ArtifactId) -> Result<Vec<Tag>> {
        self.db.with_conn(|conn| {
            let mut stmt = conn.prepare_cached(
                "SELECT dir, branch FROM global_cache
                 WHERE cacheKey = ?1 AND artifactId = ?2",
            )?;
            let rows = stmt.query_map(params![cache_key, artifact_id.as_str()], |row| {
                Ok(Tag {
                    directory: row.get(0)?,
                    branch: row.get(1)?,
                    artifact_id,
                })
            })?;
            rows.collect()
        })
    }

    /// Apply one batch of tag-catalog mutations. All rows for the batch go
    /// through a single transaction.
    pub fn apply(&self, tag: &Tag, items: &[PathAndCacheKey], kind: ApplyKind) -> Result<()> {
        if items.is_empty() || kind == ApplyKind::UpdateOldVersion {
            return Ok(());
        }
        let now = now_ms() as i64;
        debug!("Catalog apply {:?}: {} items under {}", kind, items.len(), tag);

        self.db.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            for item in items {
                match kind {
                    ApplyKind::Compute | ApplyKind::Add | ApplyKind::UpdateNewVersion => {
                        tx.execute(
                            "REPLACE INTO tag_catalog
                             (dir, branch, artifactId, path, cacheKey, lastUpdated)
                             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                            params![
                                tag.directory,
                                tag.branch,
                                tag.artifact_id.as_str(),
                                item.path,
                                item.cache_key,
                                now
                            ],
                        )?;
                    }
                    ApplyKind::Remove => {
                        tx.execute(
                            "DELETE FROM tag_catalog
                             WHERE dir = ?1 AND branch = ?2 AND artifactId = ?3
                               AND path = ?4 AND cacheKey = ?5",
                            params![
                                tag.directory,
                                tag.branch,
                                tag.artifact_id.as_str(),
                                item.path,
                                item.cache_key
                            ],
                        )?;
                    }
                    ApplyKind::UpdateLastUpdated => {
                        tx.execute(
                            "UPDATE tag_catalog SET cacheKey = ?5, lastUpdated = ?6
                             WHERE dir = ?1 AND branch = ?2 AND artifactId = ?3 AND path = ?4",
                            params![
                                tag.directory,
                                tag.branch,
                                tag.artifact_id.as_str(),
                                item.path,
                                item.cache_key,
                                now
                            ],
                        )?;
                    }
                    ApplyKind::UpdateOldVersion => unreachable!("filtered above"),
                }
            }
            tx.commit()
        })
    }

    /// Record in the global cache that `tag` references `cache_key`.
    pub fn global_cache_add(&self, cache_key: &str, tag: &Tag) -> Result<()> {
        self.db.with_conn(|conn| {
            conn.execute(
                "INSERT OR IGNORE INTO global_cache (cacheKey, dir, branch, artifactId)
                 VALUES (?1, ?2, ?3, ?4)",
                params![cache_key, tag.directory, tag.branch, tag.artifact_id.as_str()],
            )?;
            Ok(())
        })
    }

    /// Drop the `(cache_key, tag)` reference from the global cache.
    ///
    /// The reference survives while any tag-catalog row still justifies it
    /// (a rename deletes the old path's row while the new path's row keeps
    /// referencing the same content), keeping the global cache an exact
    /// mirror of the tags under which a key appears.
    pub fn global_cache_remove(&self, cache_key: &str, tag: &Tag) -> Result<()> {
        self.db.with_conn(|conn| {
            conn.execute(
                "DELETE FROM global_cache
                 WHERE cacheKey = ?1 AND dir = ?2 AND branch = ?3 AND artifactId = ?4
                   AND NOT EXISTS (
                       SELECT 1 FROM tag_catalog
                       WHERE cacheKey = ?1 AND dir = ?2 AND branch = ?3 AND artifactId = ?4
                   )",
                params![cache_key, tag.directory, tag.branch, tag.artifact_id.as_str()],
            )?;
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn catalog() -> SqliteCatalog {
        SqliteCatalog::new(Database::open_in_memory().expect("open"))
    }

    fn tag() -> Tag {
        Tag::new("file:///ws", "main", ArtifactId::Chunks)
    }

    #[test]
    fn compute_then_get_saved_items() {
        let catalog = catalog();
        let item = PathAndCacheKey::new("file:///ws/a.rs", "aaaa");
        catalog.apply(&tag(), &[item.clone()], ApplyKind::Compute).unwrap();

        let rows = catalog.get_saved_items(&tag()).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].path, item.path);
        assert_eq!(rows[0].cache_key, item.cache_key);
        assert!(rows[0].last_updated > 0);
    }

    #[test]
    fn compute_is_idempotent_per_uniqueness_tuple() {
        let catalog = catalog();
        let item = PathAndCacheKey::new("file:///ws/a.rs", "aaaa");
        catalog.apply(&tag(), &[item.clone()], ApplyKind::Compute).unwrap();
        catalog.apply(&tag(), &[item], ApplyKind::Compute).unwrap();
        assert_eq!(catalog.get_saved_items(&tag()).unwrap().len(), 1);
    }

    #[test]
    fn remove_deletes_exact_row_only() {
        let catalog = catalog();
        let a = PathAndCacheKey::new("file:///ws/a.rs", "aaaa");
        let b = PathAndCacheKey::new("file:///ws/b.rs", "bbbb");
        catalog.apply(&tag(), &[a.clone(), b.clone()], ApplyKind::Compute).unwrap();

        catalog.apply(&tag(), &[a], ApplyKind::Remove).unwrap();
        let rows = catalog.get_saved_items(&tag()).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].path, b.path);
    }

    #[test]
    fn update_last_updated_rewrites_in_place() {
        let catalog = catalog();
        let item = PathAndCacheKey::new("file:///ws/a.rs", "aaaa");
        catalog.apply(&tag(), &[item], ApplyKind::Compute).unwrap();

        let touched = PathAndCacheKey::new("file:///ws/a.rs", "aaaa");
        catalog
            .apply(&tag(), &[touched], ApplyKind::UpdateLastUpdated)
            .unwrap();
        let rows = catalog.get_saved_items(&tag()).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].cache_key, "aaaa");
    }

    #[test]
    fn update_old_version_is_a_no_op() {
        let catalog = catalog();
        let item = PathAndCacheKey::new("file:///ws/a.rs", "aaaa");
        catalog.apply(&tag(), &[item.clone()], ApplyKind::Compute).unwrap();
        catalog.apply(&tag(), &[item], ApplyKind::UpdateOldVersion).unwrap();
        assert_eq!(catalog.get_saved_items(&tag()).unwrap().len(), 1);
    }

    #[test]
    fn global_cache_tracks_tags_per_artifact() {
        let catalog = catalog();
        let main = tag();
        let feature = Tag::new("file:///ws", "feature", ArtifactId::Chunks);

        catalog.global_cache_add("aaaa", &main).unwrap();
        catalog.global_cache_add("aaaa", &feature).unwrap();
        catalog.global_cache_add("aaaa", &main).unwrap(); // duplicate ignored

        let tags = catalog.get_tags_for("aaaa", ArtifactId::Chunks).unwrap();
        assert_eq!(tags.len(), 2);

        catalog.global_cache_remove("aaaa", &feature).unwrap();
        let tags = catalog.get_tags_for("aaaa", ArtifactId::Chunks).unwrap();
        assert_eq!(tags.len(), 1);
        assert_eq!(tags[0].branch, "main");
    }

    #[test]
    fn global_cache_reference_survives_while_catalog_rows_remain() {
        let catalog = catalog();
        let t = tag();
        let old = PathAndCacheKey::new("file:///ws/a.rs", "aaaa");
        let new = PathAndCacheKey::new("file:///ws/b.rs", "aaaa");
        catalog.apply(&t, &[old.clone()], ApplyKind::Compute).unwrap();
        catalog.global_cache_add("aaaa", &t).unwrap();

        // Rename: the new path links the content before the old row drops.
        catalog.apply(&t, &[new.clone()], ApplyKind::Add).unwrap();
        catalog.global_cache_add("aaaa", &t).unwrap();
        catalog.apply(&t, &[old], ApplyKind::Remove).unwrap();
        catalog.global_cache_remove("aaaa", &t).unwrap();

        let tags = catalog.get_tags_for("aaaa", ArtifactId::Chunks).unwrap();
        assert_eq!(tags.len(), 1);

        // Dropping the last row releases the reference.
        catalog.apply(&t, &[new], ApplyKind::Remove).unwrap();
        catalog.global_cache_remove("aaaa", &t).unwrap();
        assert!(catalog.get_tags_for("aaaa", ArtifactId::Chunks).unwrap().is_empty());
    }

    #[test]
    fn global_cache_is_partitioned_by_artifact() {
        let catalog = catalog();
        catalog.global_cache_add("aaaa", &tag()).unwrap();
        let fts_tags = catalog.get_tags_for("aaaa", ArtifactId::Fts).unwrap();
        assert!(fts_tags.is_empty());
    }
}
