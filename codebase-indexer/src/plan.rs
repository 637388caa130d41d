use crate::error::Result;
use sidekick_index_catalog::ApplyKind;
use sidekick_protocol::PathAndCacheKey;
use std::sync::Arc;

/// The classified work needed to bring one tag's artifact in sync with the
/// workspace. The four sequences are disjoint.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RefreshPlan {
    /// New content requiring full artifact work.
    pub compute: Vec<PathAndCacheKey>,
    /// Content already present globally under another tag; link only.
    pub add_tag: Vec<PathAndCacheKey>,
    /// Content still referenced elsewhere; unlink only.
    pub remove_tag: Vec<PathAndCacheKey>,
    /// Content to drop entirely (last reference).
    pub del: Vec<PathAndCacheKey>,
}

impl RefreshPlan {
    pub fn is_empty(&self) -> bool {
        self.compute.is_empty()
            && self.add_tag.is_empty()
            && self.remove_tag.is_empty()
            && self.del.is_empty()
    }

    pub fn len(&self) -> usize {
        self.compute.len() + self.add_tag.len() + self.remove_tag.len() + self.del.len()
    }

    /// Restrict the plan to the given canonicalized paths.
    pub fn filter_paths(&self, paths: &[String]) -> RefreshPlan {
        let keep = |items: &[PathAndCacheKey]| {
            items
                .iter()
                .filter(|item| paths.iter().any(|p| p == &item.path))
                .cloned()
                .collect()
        };
        RefreshPlan {
            compute: keep(&self.compute),
            add_tag: keep(&self.add_tag),
            remove_tag: keep(&self.remove_tag),
            del: keep(&self.del),
        }
    }

    /// Split into sub-plans of at most `batch_size` items each, preserving
    /// the compute → add_tag → remove_tag → del processing order across the
    /// whole sequence of batches.
    pub fn batches(&self, batch_size: usize) -> Vec<RefreshPlan> {
        let mut out = Vec::new();
        for slice in self.compute.chunks(batch_size.max(1)) {
            out.push(RefreshPlan {
                compute: slice.to_vec(),
                ..Default::default()
            });
        }
        for slice in self.add_tag.chunks(batch_size.max(1)) {
            out.push(RefreshPlan {
                add_tag: slice.to_vec(),
                ..Default::default()
            });
        }
        for slice in self.remove_tag.chunks(batch_size.max(1)) {
            out.push(RefreshPlan {
                remove_tag: slice.to_vec(),
                ..Default::default()
            });
        }
        for slice in self.del.chunks(batch_size.max(1)) {
            out.push(RefreshPlan {
                del: slice.to_vec(),
                ..Default::default()
            });
        }
        out
    }
}

/// Persists a plan's effects after an artifact makes them durable. Invoked
/// with small item slices; writes the tag catalog and, for the kinds that
/// own it, the global cache.
pub type CompleteCallback =
    Arc<dyn Fn(&[PathAndCacheKey], ApplyKind) -> Result<()> + Send + Sync>;
