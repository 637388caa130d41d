mod imports;
mod root_path;

use crate::types::FileContext;
use async_trait::async_trait;
use log::debug;
use lru::LruCache;
use sidekick_code_chunker::Language;
use sidekick_protocol::{AutocompleteInput, Position, RangeInFileWithContents};
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

pub(crate) use root_path::root_path_snippets;

/// Per-source hard cap; a source that cannot answer in time contributes
/// nothing rather than stalling the completion.
const SNIPPET_SOURCE_TIMEOUT: Duration = Duration::from_millis(100);

/// Bound on each context cache.
const CONTEXT_CACHE_CAPACITY: usize = 100;

/// Where a context snippet came from; drives prompt ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnippetKind {
    Clipboard,
    RecentlyVisited,
    RecentlyEdited,
    Diff,
    Imports,
    RootPath,
    /// Provided directly by the IDE alongside the trigger.
    Ide,
}

impl SnippetKind {
    /// Match a configuration name like `"clipboard"` or `"diff"`.
    pub fn matches_name(&self, name: &str) -> bool {
        let own = match self {
            SnippetKind::Clipboard => "clipboard",
            SnippetKind::RecentlyVisited => "recentlyVisited",
            SnippetKind::RecentlyEdited => "recentlyEdited",
            SnippetKind::Diff => "diff",
            SnippetKind::Imports => "imports",
            SnippetKind::RootPath => "rootPath",
            SnippetKind::Ide => "ide",
        };
        own.eq_ignore_ascii_case(name)
    }
}

/// One piece of context offered to the prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContextSnippet {
    pub filepath: String,
    pub content: String,
    pub kind: SnippetKind,
}

/// LSP-style definition lookup, implemented by the IDE messenger.
#[async_trait]
pub trait DefinitionProvider: Send + Sync {
    async fn goto_definition(
        &self,
        filepath: &str,
        position: Position,
    ) -> Vec<RangeInFileWithContents>;
}

/// VCS diff source, implemented by the IDE messenger.
#[async_trait]
pub trait DiffProvider: Send + Sync {
    async fn diff(&self) -> Vec<String>;
}

/// No-op providers for tests and barebones deployments.
pub struct NoDefinitions;

#[async_trait]
impl DefinitionProvider for NoDefinitions {
    async fn goto_definition(
        &self,
        _filepath: &str,
        _position: Position,
    ) -> Vec<RangeInFileWithContents> {
        Vec::new()
    }
}

pub struct NoDiff;

#[async_trait]
impl DiffProvider for NoDiff {
    async fn diff(&self) -> Vec<String> {
        Vec::new()
    }
}

/// Gathers snippets from every source in parallel, each raced against the
/// 100 ms cap. Definition lookups and diffs are cached in bounded LRUs.
pub struct SnippetCollector {
    definitions: Arc<dyn DefinitionProvider>,
    diffs: Arc<dyn DiffProvider>,
    root_path_cache: Mutex<LruCache<String, Vec<ContextSnippet>>>,
    diff_cache: Mutex<LruCache<u64, Vec<String>>>,
}

impl SnippetCollector {
    pub fn new(definitions: Arc<dyn DefinitionProvider>, diffs: Arc<dyn DiffProvider>) -> Self {
        let capacity = NonZeroUsize::new(CONTEXT_CACHE_CAPACITY).unwrap_or(NonZeroUsize::MIN);
        Self {
            definitions,
            diffs,
            root_path_cache: Mutex::new(LruCache::new(capacity)),
            diff_cache: Mutex::new(LruCache::new(capacity)),
        }
    }

    /// Collect everything available for this trigger. `save_stamp` keys the
    /// diff cache (the diff only changes when a file is saved).
    pub async fn collect(
        &self,
        input: &AutocompleteInput,
        file_contents: &str,
        ctx: &FileContext,
        language: Language,
        save_stamp: Option<u64>,
    ) -> Vec<ContextSnippet> {
        let (root_path, imports, diff) = tokio::join!(
            self.collect_root_path(input, file_contents, language),
            self.collect_imports(input, ctx, language),
            self.collect_diff(save_stamp),
        );

        let mut snippets = Vec::new();
        if let Some(clipboard) = &input.clipboard {
            if !clipboard.text.trim().is_empty() {
                snippets.push(ContextSnippet {
                    filepath: input.filepath.clone(),
                    content: clipboard.text.clone(),
                    kind: SnippetKind::Clipboard,
                });
            }
        }
        snippets.extend(range_snippets(
            &input.recently_visited_ranges,
            SnippetKind::RecentlyVisited,
        ));
        snippets.extend(range_snippets(
            &input.recently_edited_ranges,
            SnippetKind::RecentlyEdited,
        ));
        snippets.extend(diff);
        snippets.extend(root_path);
        snippets.extend(imports);

        debug!("Collected {} context snippets", snippets.len());
        snippets
    }

    async fn collect_root_path(
        &self,
        input: &AutocompleteInput,
        file_contents: &str,
        language: Language,
    ) -> Vec<ContextSnippet> {
        let lookup = root_path_snippets(
            self.definitions.as_ref(),
            &self.root_path_cache,
            &input.filepath,
            file_contents,
            input.pos,
            language,
        );
        tokio::time::timeout(SNIPPET_SOURCE_TIMEOUT, lookup)
            .await
            .unwrap_or_default()
    }

    async fn collect_imports(
        &self,
        input: &AutocompleteInput,
        ctx: &FileContext,
        language: Language,
    ) -> Vec<ContextSnippet> {
        let lookup = imports::import_definition_snippets(
            self.definitions.as_ref(),
            &input.filepath,
            ctx,
            language,
        );
        tokio::time::timeout(SNIPPET_SOURCE_TIMEOUT, lookup)
            .await
            .unwrap_or_default()
    }

    async fn collect_diff(&self, save_stamp: Option<u64>) -> Vec<ContextSnippet> {
        let patches = match save_stamp {
            Some(stamp) => {
                if let Some(cached) = self.diff_cache.lock().await.get(&stamp) {
                    cached.clone()
                } else {
                    let fresh = tokio::time::timeout(SNIPPET_SOURCE_TIMEOUT, self.diffs.diff())
                        .await
                        .unwrap_or_default();
                    self.diff_cache.lock().await.put(stamp, fresh.clone());
                    fresh
                }
            }
            None => tokio::time::timeout(SNIPPET_SOURCE_TIMEOUT, self.diffs.diff())
                .await
                .unwrap_or_default(),
        };

        patches
            .into_iter()
            .filter(|patch| !patch.trim().is_empty())
            .map(|patch| ContextSnippet {
                filepath: String::new(),
                content: patch,
                kind: SnippetKind::Diff,
            })
            .collect()
    }
}

fn range_snippets(
    ranges: &[RangeInFileWithContents],
    kind: SnippetKind,
) -> Vec<ContextSnippet> {
    ranges
        .iter()
        .filter(|range| !range.contents.trim().is_empty())
        .map(|range| ContextSnippet {
            filepath: range.filepath.clone(),
            content: range.contents.clone(),
            kind,
        })
        .collect()
}
