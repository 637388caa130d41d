use super::{ContextSnippet, DefinitionProvider, SnippetKind};
use lru::LruCache;
use sha2::{Digest, Sha256};
use sidekick_code_chunker::Language;
use sidekick_protocol::Position;
use tokio::sync::Mutex;
use tree_sitter::{Node, Parser};

/// Node types worth resolving to their definitions while walking from the
/// tree root down to the cursor.
const RESOLVABLE_NODE_TYPES: &[&str] = &[
    "call_expression",
    "function_item",
    "function_definition",
    "function_declaration",
    "method_definition",
    "type_identifier",
    "attribute",
    "member_expression",
    "field_expression",
];

/// Definitions for the AST path above the cursor: parse the file, walk the
/// named nodes from root to cursor, and resolve each recognized node
/// through go-to-definition. Results are cached per node under a SHA-256
/// chain of the parent keys and node identity, so an unchanged scope costs
/// one lookup per session.
pub(crate) async fn root_path_snippets(
    definitions: &dyn DefinitionProvider,
    cache: &Mutex<LruCache<String, Vec<ContextSnippet>>>,
    filepath: &str,
    file_contents: &str,
    cursor: Position,
    language: Language,
) -> Vec<ContextSnippet> {
    let Some(grammar) = language.grammar() else {
        return Vec::new();
    };
    let mut parser = Parser::new();
    if parser.set_language(&grammar).is_err() {
        return Vec::new();
    }
    let Some(tree) = parser.parse(file_contents, None) else {
        return Vec::new();
    };

    let path = ast_path_to_cursor(tree.root_node(), cursor);
    let mut snippets = Vec::new();
    let mut chain_key = filepath.to_string();

    for node in path {
        chain_key = chain(&chain_key, &node_identity(node, file_contents));
        if !RESOLVABLE_NODE_TYPES.contains(&node.kind()) {
            continue;
        }

        if let Some(cached) = cache.lock().await.get(&chain_key) {
            snippets.extend(cached.iter().cloned());
            continue;
        }

        let position = Position::new(
            node.start_position().row as u32,
            node.start_position().column as u32,
        );
        let resolved: Vec<ContextSnippet> = definitions
            .goto_definition(filepath, position)
            .await
            .into_iter()
            .filter(|range| !range.contents.trim().is_empty())
            .map(|range| ContextSnippet {
                filepath: range.filepath,
                content: range.contents,
                kind: SnippetKind::RootPath,
            })
            .collect();

        cache.lock().await.put(chain_key.clone(), resolved.clone());
        snippets.extend(resolved);
    }

    snippets
}

/// Named nodes from the root down to the one containing the cursor.
fn ast_path_to_cursor(root: Node<'_>, cursor: Position) -> Vec<Node<'_>> {
    let point = tree_sitter::Point::new(cursor.line as usize, cursor.character as usize);
    let mut path = Vec::new();
    let mut node = root;
    loop {
        path.push(node);
        let Some(child) = node.named_child_containing_point(point) else {
            break;
        };
        node = child;
    }
    path
}

trait NamedChildAt<'a> {
    fn named_child_containing_point(&self, point: tree_sitter::Point) -> Option<Node<'a>>;
}

impl<'a> NamedChildAt<'a> for Node<'a> {
    fn named_child_containing_point(&self, point: tree_sitter::Point) -> Option<Node<'a>> {
        let mut cursor = self.walk();
        let found = self
            .named_children(&mut cursor)
            .find(|child| child.start_position() <= point && point <= child.end_position());
        found
    }
}

fn node_identity(node: Node<'_>, source: &str) -> String {
    let name = node
        .child_by_field_name("name")
        .and_then(|n| n.utf8_text(source.as_bytes()).ok())
        .unwrap_or("");
    format!("{}:{}:{}", node.kind(), node.start_byte(), name)
}

/// Chain a parent cache key with a node identity.
fn chain(parent_key: &str, identity: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(parent_key.as_bytes());
    hasher.update(identity.as_bytes());
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::super::NoDefinitions;
    use super::*;
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;
    use sidekick_protocol::{Range, RangeInFileWithContents};
    use std::num::NonZeroUsize;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn cache() -> Mutex<LruCache<String, Vec<ContextSnippet>>> {
        Mutex::new(LruCache::new(NonZeroUsize::new(100).unwrap()))
    }

    struct CountingDefinitions(AtomicUsize);

    #[async_trait]
    impl DefinitionProvider for CountingDefinitions {
        async fn goto_definition(
            &self,
            _filepath: &str,
            _position: Position,
        ) -> Vec<RangeInFileWithContents> {
            self.0.fetch_add(1, Ordering::SeqCst);
            vec![RangeInFileWithContents {
                filepath: "/ws/def.rs".into(),
                range: Range::default(),
                contents: "fn definition() {}".into(),
            }]
        }
    }

    const SOURCE: &str = "fn outer() {\n    helper(argument);\n}\n";

    #[tokio::test]
    async fn resolves_definitions_along_the_cursor_path() {
        let provider = CountingDefinitions(AtomicUsize::new(0));
        let cache = cache();
        let snippets = root_path_snippets(
            &provider,
            &cache,
            "/ws/main.rs",
            SOURCE,
            Position::new(1, 8),
            Language::Rust,
        )
        .await;

        assert!(!snippets.is_empty());
        assert!(snippets.iter().all(|s| s.kind == SnippetKind::RootPath));
        assert!(provider.0.load(Ordering::SeqCst) >= 1);
    }

    #[tokio::test]
    async fn second_lookup_is_served_from_cache() {
        let provider = CountingDefinitions(AtomicUsize::new(0));
        let cache = cache();
        for _ in 0..2 {
            root_path_snippets(
                &provider,
                &cache,
                "/ws/main.rs",
                SOURCE,
                Position::new(1, 8),
                Language::Rust,
            )
            .await;
        }
        let first_run = provider.0.load(Ordering::SeqCst);

        // The second run resolved nothing new.
        root_path_snippets(
            &provider,
            &cache,
            "/ws/main.rs",
            SOURCE,
            Position::new(1, 8),
            Language::Rust,
        )
        .await;
        assert_eq!(provider.0.load(Ordering::SeqCst), first_run);
    }

    #[tokio::test]
    async fn unsupported_language_yields_nothing() {
        let cache = cache();
        let snippets = root_path_snippets(
            &NoDefinitions,
            &cache,
            "/ws/notes.txt",
            "plain text",
            Position::new(0, 0),
            Language::Unknown,
        )
        .await;
        assert!(snippets.is_empty());
    }
}
