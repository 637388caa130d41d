use crate::artifact::{check_cancelled, item_fraction, ArtifactIndex, ProgressReporter};
use crate::error::Result;
use crate::plan::{CompleteCallback, RefreshPlan};
use crate::planner::FileReader;
use async_trait::async_trait;
use log::debug;
use rusqlite::{params, OptionalExtension};
use sidekick_code_chunker::Language;
use sidekick_index_catalog::{ApplyKind, Database};
use sidekick_protocol::{ArtifactId, PathAndCacheKey, Tag};
use std::path::Path;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tree_sitter::{Node, Parser};

/// A named symbol definition extracted from a file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeSnippet {
    pub title: String,
    pub content: String,
    pub start_line: usize,
    pub end_line: usize,
}

/// Extracts function and type definitions into the `code_snippets` table,
/// keyed by `(path, cache_key)` like every other artifact.
pub struct SnippetsIndex {
    db: Database,
    reader: Arc<dyn FileReader>,
}

impl SnippetsIndex {
    pub fn new(db: Database, reader: Arc<dyn FileReader>) -> Self {
        Self { db, reader }
    }

    async fn compute_item(&self, item: &PathAndCacheKey) -> Result<usize> {
        let bytes = self.reader.read_file(&item.path).await?;
        let contents = String::from_utf8_lossy(&bytes);
        let snippets = extract_snippets(&item.path, &contents);
        let count = snippets.len();

        self.db.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            tx.execute(
                "DELETE FROM code_snippets WHERE path = ?1 AND cacheKey = ?2",
                params![item.path, item.cache_key],
            )?;
            for snippet in &snippets {
                tx.execute(
                    "INSERT INTO code_snippets
                     (path, cacheKey, title, content, startLine, endLine)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                    params![
                        item.path,
                        item.cache_key,
                        snippet.title,
                        snippet.content,
                        snippet.start_line as i64,
                        snippet.end_line as i64
                    ],
                )?;
            }
            tx.commit()
        })?;
        Ok(count)
    }

    fn delete_item(&self, item: &PathAndCacheKey) -> Result<()> {
        self.db.with_conn(|conn| {
            conn.execute(
                "DELETE FROM code_snippets WHERE path = ?1 AND cacheKey = ?2",
                params![item.path, item.cache_key],
            )?;
            Ok(())
        })?;
        Ok(())
    }

    /// Copy extracted snippets to a path that does not hold them yet. The
    /// del paired with a rename removes the old path's rows, so linking
    /// must carry the rows over; no file is re-read or re-parsed.
    fn link_item(&self, item: &PathAndCacheKey) -> Result<usize> {
        let copied = self.db.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let existing: i64 = tx.query_row(
                "SELECT COUNT(*) FROM code_snippets WHERE path = ?1 AND cacheKey = ?2",
                params![item.path, item.cache_key],
                |row| row.get(0),
            )?;
            if existing > 0 {
                tx.commit()?;
                return Ok(0);
            }
            let source: Option<String> = tx
                .query_row(
                    "SELECT path FROM code_snippets WHERE cacheKey = ?1 LIMIT 1",
                    params![item.cache_key],
                    |row| row.get(0),
                )
                .optional()?;
            let copied = match source {
                Some(source) => tx.execute(
                    "INSERT INTO code_snippets
                     (path, cacheKey, title, content, startLine, endLine)
                     SELECT ?2, cacheKey, title, content, startLine, endLine
                     FROM code_snippets WHERE cacheKey = ?1 AND path = ?3",
                    params![item.cache_key, item.path, source],
                )?,
                None => 0,
            };
            tx.commit()?;
            Ok(copied)
        })?;
        Ok(copied)
    }

    /// All stored snippets for a path, newest version included.
    pub fn snippets_for_path(&self, path: &str) -> Result<Vec<CodeSnippet>> {
        Ok(self.db.with_conn(|conn| {
            let mut stmt = conn.prepare_cached(
                "SELECT title, content, startLine, endLine FROM code_snippets
                 WHERE path = ?1 ORDER BY startLine",
            )?;
            let rows = stmt.query_map(params![path], |row| {
                Ok(CodeSnippet {
                    title: row.get(0)?,
                    content: row.get(1)?,
                    start_line: row.get::<_, i64>(2)? as usize,
                    end_line: row.get::<_, i64>(3)? as usize,
                })
            })?;
            rows.collect::<rusqlite::Result<Vec<_>>>()
        })?)
    }
}

/// Walk the syntax tree and pull out every function and container
/// definition. Unsupported languages and parse failures yield nothing.
pub(crate) fn extract_snippets(filepath: &str, contents: &str) -> Vec<CodeSnippet> {
    let language = Language::from_path(Path::new(filepath));
    let Some(grammar) = language.grammar() else {
        return Vec::new();
    };
    let mut parser = Parser::new();
    if parser.set_language(&grammar).is_err() {
        return Vec::new();
    }
    let Some(tree) = parser.parse(contents, None) else {
        return Vec::new();
    };

    let mut snippets = Vec::new();
    collect_snippets(tree.root_node(), contents, language, &mut snippets);
    snippets
}

fn collect_snippets(
    node: Node<'_>,
    source: &str,
    language: Language,
    out: &mut Vec<CodeSnippet>,
) {
    let kind = node.kind();
    if language.function_node_types().contains(&kind)
        || language.container_node_types().contains(&kind)
    {
        if let Some(snippet) = snippet_from(node, source) {
            out.push(snippet);
        }
    }

    let mut cursor = node.walk();
    for child in node.named_children(&mut cursor) {
        collect_snippets(child, source, language, out);
    }
}

fn snippet_from(node: Node<'_>, source: &str) -> Option<CodeSnippet> {
    let content = node.utf8_text(source.as_bytes()).ok()?;
    let title = node
        .child_by_field_name("name")
        .and_then(|name| name.utf8_text(source.as_bytes()).ok())
        .map(str::to_string)
        .or_else(|| content.lines().next().map(|line| line.trim().to_string()))?;
    Some(CodeSnippet {
        title,
        content: content.to_string(),
        start_line: node.start_position().row,
        end_line: node.end_position().row,
    })
}

#[async_trait]
impl ArtifactIndex for SnippetsIndex {
    fn artifact_id(&self) -> ArtifactId {
        ArtifactId::Snippets
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
            debug!("Extracted {count} snippets from {}", item.path);
            complete(std::slice::from_ref(item), ApplyKind::Compute)?;
            progress
                .report(item_fraction(position, total), format!("Extracting {}", item.path))
                .await;
            position += 1;
        }

        for item in &plan.add_tag {
            check_cancelled(cancel).await?;
            let copied = self.link_item(item)?;
            if copied > 0 {
                debug!("Copied {copied} snippets to {}", item.path);
            }
            complete(std::slice::from_ref(item), ApplyKind::Add)?;
            position += 1;
        }

        for item in &plan.remove_tag {
            check_cancelled(cancel).await?;
            complete(std::slice::from_ref(item), ApplyKind::Remove)?;
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
