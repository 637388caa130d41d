use crate::error::Result;
use sidekick_index_catalog::{ApplyKind, SqliteCatalog};
use sidekick_protocol::{ArtifactId, PathAndCacheKey, Tag};

/// The synthetic `globalCache` artifact: the reverse index from content to
/// tags. Unlike the real artifacts it is driven by the planner's complete
/// callback rather than by the orchestrator, so every catalog mutation
/// keeps the reverse index in step.
#[derive(Clone)]
pub struct GlobalCacheIndex {
    catalog: SqliteCatalog,
}

impl GlobalCacheIndex {
    pub fn new(catalog: SqliteCatalog) -> Self {
        Self { catalog }
    }

    pub fn artifact_id(&self) -> ArtifactId {
        ArtifactId::GlobalCache
    }

    /// Mirror one batch of completions. Compute and add-tag insert the
    /// `(key, tag)` reference; removals drop it; the timestamp and version
    /// kinds never touch the reverse index.
    pub fn apply(&self, tag: &Tag, items: &[PathAndCacheKey], kind: ApplyKind) -> Result<()> {
        match kind {
            ApplyKind::Compute | ApplyKind::Add => {
                for item in items {
                    self.catalog.global_cache_add(&item.cache_key, tag)?;
                }
            }
            ApplyKind::Remove => {
                for item in items {
                    self.catalog.global_cache_remove(&item.cache_key, tag)?;
                }
            }
            ApplyKind::UpdateLastUpdated
            | ApplyKind::UpdateNewVersion
            | ApplyKind::UpdateOldVersion => {}
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use sidekick_index_catalog::Database;

    #[test]
    fn update_kinds_do_not_touch_the_reverse_index() {
        let catalog = SqliteCatalog::new(Database::open_in_memory().unwrap());
        let index = GlobalCacheIndex::new(catalog.clone());
        let tag = Tag::new("/ws", "main", ArtifactId::Chunks);
        let item = PathAndCacheKey::new("/ws/a.rs", "aaaa");

        index
            .apply(&tag, std::slice::from_ref(&item), ApplyKind::UpdateNewVersion)
            .unwrap();
        index
            .apply(&tag, std::slice::from_ref(&item), ApplyKind::UpdateLastUpdated)
            .unwrap();
        assert!(catalog.get_tags_for("aaaa", ArtifactId::Chunks).unwrap().is_empty());

        index.apply(&tag, &[item], ApplyKind::Compute).unwrap();
        assert_eq!(catalog.get_tags_for("aaaa", ArtifactId::Chunks).unwrap().len(), 1);
    }
}
