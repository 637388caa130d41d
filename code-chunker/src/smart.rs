use crate::language::Language;
use crate::token::TokenCounter;
use crate::ChunkWithoutId;
use log::debug;
use tree_sitter::{Node, Parser};

/// AST-driven "smart collapse" chunking.
///
/// Walks the syntax tree top-down. Subtrees that fit the token budget are
/// emitted verbatim and not descended into. Oversized functions are emitted
/// as signature-plus-placeholder collapsed forms; oversized containers as a
/// header plus their children's collapsed forms. Recursion continues into
/// named children, so a collapsed form and the full bodies it elides are
/// both represented somewhere in the chunk stream.
///
/// Returns `None` when no grammar is available or parsing fails; callers
/// fall back to basic mode.
pub(crate) fn smart_chunks(
    contents: &str,
    language: Language,
    max_chunk_size: usize,
) -> Option<Vec<ChunkWithoutId>> {
    let grammar = language.grammar()?;
    let mut parser = Parser::new();
    parser.set_language(&grammar).ok()?;
    let tree = parser.parse(contents, None)?;

    let collapser = Collapser {
        language,
        counter: TokenCounter::new(),
        max_chunk_size,
        source: contents,
    };

    let mut chunks = Vec::new();
    collapser.walk(tree.root_node(), &mut chunks);
    debug!(
        "Smart-collapse produced {} chunks ({} lines of {})",
        chunks.len(),
        contents.lines().count(),
        language.name()
    );
    Some(chunks)
}

struct Collapser<'a> {
    language: Language,
    counter: TokenCounter,
    max_chunk_size: usize,
    source: &'a str,
}

impl Collapser<'_> {
    fn walk(&self, node: Node<'_>, out: &mut Vec<ChunkWithoutId>) {
        let Some(text) = self.node_text(node) else {
            return;
        };
        if text.trim().is_empty() {
            return;
        }

        if self.counter.count(text) <= self.max_chunk_size {
            out.push(self.chunk_from(node, text.to_string()));
            return;
        }

        if self.is_function(node) {
            if let Some(collapsed) = self.collapsed_function(node) {
                out.push(collapsed);
            }
        } else if self.is_container(node) {
            if let Some(collapsed) = self.collapsed_container(node) {
                out.push(collapsed);
            }
        }

        let mut cursor = node.walk();
        for child in node.named_children(&mut cursor) {
            self.walk(child, out);
        }
    }

    /// Signature line plus a body placeholder; when the function sits
    /// directly inside a class/impl container, the container's header line
    /// is prepended so the reader sees scope.
    fn collapsed_function(&self, node: Node<'_>) -> Option<ChunkWithoutId> {
        let signature = self.signature_of(node)?;
        let collapsed = format!("{signature} {}", self.language.collapsed_placeholder());

        let content = match self.enclosing_container(node) {
            Some(container) => {
                let header = self.header_line_of(container)?;
                format!("{header}\n...\n{collapsed}")
            }
            None => collapsed,
        };

        Some(self.chunk_from(node, content))
    }

    /// Container header plus the body with every child function body
    /// replaced by its placeholder. If the result still exceeds the budget,
    /// collapsed entries are removed from the end until it fits; removals
    /// leave at most single blank lines behind.
    fn collapsed_container(&self, node: Node<'_>) -> Option<ChunkWithoutId> {
        let body = node.child_by_field_name("body")?;
        let header = self.source.get(node.start_byte()..body.start_byte())?.trim_end();

        struct Piece {
            text: String,
            collapsible: bool,
        }

        let mut pieces = Vec::new();
        let mut cursor = body.walk();
        for child in body.named_children(&mut cursor) {
            let indent = " ".repeat(child.start_position().column);
            if self.is_function(child) {
                if let Some(signature) = self.signature_of(child) {
                    pieces.push(Piece {
                        text: format!(
                            "{indent}{signature} {}",
                            self.language.collapsed_placeholder()
                        ),
                        collapsible: true,
                    });
                }
            } else if let Some(text) = self.node_text(child) {
                pieces.push(Piece {
                    text: format!("{indent}{text}"),
                    collapsible: false,
                });
            }
        }

        let render = |pieces: &[Piece]| -> String {
            let body_text = pieces
                .iter()
                .map(|p| p.text.as_str())
                .collect::<Vec<_>>()
                .join("\n\n");
            if self.language.uses_braces() {
                format!("{header} {{\n{body_text}\n}}")
            } else {
                format!("{header}\n{body_text}")
            }
        };

        let mut content = render(&pieces);
        let mut removed_any = false;
        while self.counter.count(&content) > self.max_chunk_size {
            let Some(last_collapsible) = pieces.iter().rposition(|p| p.collapsible) else {
                break;
            };
            pieces.remove(last_collapsible);
            removed_any = true;
            content = render(&pieces);
        }
        if removed_any {
            content = collapse_blank_runs(&content);
        }

        Some(self.chunk_from(node, content))
    }

    fn signature_of(&self, node: Node<'_>) -> Option<String> {
        let body = node.child_by_field_name("body")?;
        let signature = self.source.get(node.start_byte()..body.start_byte())?;
        Some(signature.trim_end().to_string())
    }

    fn header_line_of(&self, node: Node<'_>) -> Option<String> {
        let text = self.node_text(node)?;
        text.lines().next().map(|line| line.trim_end().to_string())
    }

    /// The container a function is nested directly inside, looking through
    /// the intermediate body node.
    fn enclosing_container(&self, node: Node<'_>) -> Option<Node<'_>> {
        let parent = node.parent()?;
        if self.is_container(parent) {
            return Some(parent);
        }
        let grandparent = parent.parent()?;
        if self.is_container(grandparent) {
            return Some(grandparent);
        }
        None
    }

    fn is_function(&self, node: Node<'_>) -> bool {
        self.language.function_node_types().contains(&node.kind())
    }

    fn is_container(&self, node: Node<'_>) -> bool {
        self.language.container_node_types().contains(&node.kind())
    }

    fn node_text(&self, node: Node<'_>) -> Option<&str> {
        node.utf8_text(self.source.as_bytes()).ok()
    }

    fn chunk_from(&self, node: Node<'_>, content: String) -> ChunkWithoutId {
        ChunkWithoutId {
            content,
            start_line: node.start_position().row,
            end_line: node.end_position().row,
        }
    }
}

/// Collapse runs of blank lines into a single blank line.
fn collapse_blank_runs(text: &str) -> String {
    let mut out: Vec<&str> = Vec::new();
    let mut previous_blank = false;
    for line in text.lines() {
        let blank = line.trim().is_empty();
        if blank && previous_blank {
            continue;
        }
        out.push(line);
        previous_blank = blank;
    }
    out.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn rust_fixture() -> String {
        let functions = (0..6)
            .map(|i| {
                format!(
                    "    pub fn compute_value_{i}(&self, input: usize) -> usize {{\n        let doubled = input * 2;\n        let shifted = doubled + {i};\n        shifted\n    }}"
                )
            })
            .collect::<Vec<_>>()
            .join("\n\n");
        format!("pub struct Calculator;\n\nimpl Calculator {{\n{functions}\n}}\n")
    }

    #[test]
    fn small_file_is_one_chunk() {
        let source = "fn main() {\n    println!(\"hi\");\n}\n";
        let chunks = smart_chunks(source, Language::Rust, 512).unwrap();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].content.trim_end(), source.trim_end());
    }

    #[test]
    fn oversized_impl_produces_collapsed_container() {
        let source = rust_fixture();
        let chunks = smart_chunks(&source, Language::Rust, 60).unwrap();

        let container = chunks
            .iter()
            .find(|c| c.content.starts_with("impl Calculator"))
            .expect("collapsed container chunk");
        assert!(container.content.contains("{ ... }"));
    }

    #[test]
    fn children_of_collapsed_nodes_are_also_represented() {
        let source = rust_fixture();
        let chunks = smart_chunks(&source, Language::Rust, 60).unwrap();

        // Every function body must appear verbatim in some chunk even though
        // the container shows only placeholders.
        for i in 0..6 {
            let needle = format!("let shifted = doubled + {i};");
            assert!(
                chunks.iter().any(|c| c.content.contains(&needle)),
                "function body {i} missing from chunk stream"
            );
        }
    }

    #[test]
    fn oversized_container_trims_placeholders_from_the_end() {
        let source = rust_fixture();
        // Budget so small that not all six placeholders fit.
        let chunks = smart_chunks(&source, Language::Rust, 40).unwrap();

        let container = chunks
            .iter()
            .find(|c| c.content.starts_with("impl Calculator"))
            .expect("collapsed container chunk");
        assert!(container.content.contains("compute_value_0"));
        assert!(!container.content.contains("compute_value_5"));
        assert!(!container.content.contains("\n\n\n"));
    }

    #[test]
    fn python_placeholder_has_no_braces() {
        let body = (0..8)
            .map(|i| format!("        value_{i} = seed + {i}"))
            .collect::<Vec<_>>()
            .join("\n");
        let source = format!(
            "class Widget:\n    def render(self, seed):\n{body}\n        return value_0\n"
        );
        let chunks = smart_chunks(&source, Language::Python, 30).unwrap();

        let collapsed = chunks
            .iter()
            .find(|c| c.content.contains("def render(self, seed): ..."))
            .expect("collapsed python function");
        assert!(!collapsed.content.contains('{'));
    }

    #[test]
    fn nested_function_chunk_carries_container_header() {
        let body = (0..10)
            .map(|i| format!("        total_{i} = base * {i}"))
            .collect::<Vec<_>>()
            .join("\n");
        let source = format!(
            "class Accumulator:\n    def fold(self, base):\n{body}\n        return total_0\n"
        );
        let chunks = smart_chunks(&source, Language::Python, 25).unwrap();

        let nested = chunks
            .iter()
            .find(|c| c.content.contains("\n...\n"))
            .expect("scoped collapsed function");
        assert!(nested.content.starts_with("class Accumulator:"));
        assert!(nested.content.ends_with("def fold(self, base): ..."));
    }

    #[test]
    fn line_ranges_stay_within_file() {
        let source = rust_fixture();
        let line_count = source.lines().count();
        let chunks = smart_chunks(&source, Language::Rust, 60).unwrap();
        for chunk in &chunks {
            assert!(chunk.start_line <= chunk.end_line);
            assert!(chunk.end_line < line_count + 1);
        }
    }

    #[test]
    fn collapse_blank_runs_leaves_single_blanks() {
        let collapsed = collapse_blank_runs("a\n\n\n\nb\n\nc");
        assert_eq!(collapsed, "a\n\nb\n\nc");
    }
}
