use super::{ContextSnippet, DefinitionProvider, SnippetKind};
use crate::types::FileContext;
use sidekick_code_chunker::Language;
use sidekick_protocol::Position;
use std::collections::HashSet;

/// Resolve symbols on the cursor line through the file's import map:
/// identifiers that also appear in an import statement are looked up via
/// go-to-definition, and the definitions become prompt snippets.
pub(crate) async fn import_definition_snippets(
    definitions: &dyn DefinitionProvider,
    filepath: &str,
    ctx: &FileContext,
    language: Language,
) -> Vec<ContextSnippet> {
    let imports = import_lines(&format!("{}{}", ctx.prefix, ctx.suffix), language);
    if imports.is_empty() {
        return Vec::new();
    }

    let mut snippets = Vec::new();
    let mut seen = HashSet::new();
    for symbol in identifiers(ctx.current_line_prefix()) {
        let Some((line_number, column)) = imports
            .iter()
            .find(|(_, _, line)| contains_word(line, &symbol))
            .map(|(line_number, column, _)| (*line_number, *column))
        else {
            continue;
        };
        if !seen.insert(symbol) {
            continue;
        }

        let resolved = definitions
            .goto_definition(filepath, Position::new(line_number as u32, column as u32))
            .await;
        snippets.extend(
            resolved
                .into_iter()
                .filter(|range| !range.contents.trim().is_empty())
                .map(|range| ContextSnippet {
                    filepath: range.filepath,
                    content: range.contents,
                    kind: SnippetKind::Imports,
                }),
        );
    }
    snippets
}

/// Import statements with their line numbers and first-symbol column.
fn import_lines(contents: &str, language: Language) -> Vec<(usize, usize, String)> {
    contents
        .lines()
        .enumerate()
        .filter(|(_, line)| is_import_line(line.trim_start(), language))
        .map(|(number, line)| {
            let column = line.len() - line.trim_start().len();
            (number, column, line.to_string())
        })
        .collect()
}

fn is_import_line(trimmed: &str, language: Language) -> bool {
    match language {
        Language::Rust => trimmed.starts_with("use ") || trimmed.starts_with("extern crate "),
        Language::Python => trimmed.starts_with("import ") || trimmed.starts_with("from "),
        Language::JavaScript | Language::TypeScript | Language::Tsx => {
            trimmed.starts_with("import ") || trimmed.contains("require(")
        }
        Language::Go | Language::Java => trimmed.starts_with("import "),
        Language::CSharp => trimmed.starts_with("using "),
        _ => false,
    }
}

/// Identifier-shaped tokens on a line.
fn identifiers(line: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut current = String::new();
    for c in line.chars() {
        if c.is_alphanumeric() || c == '_' {
            current.push(c);
        } else if !current.is_empty() {
            if !current.chars().next().is_some_and(|c| c.is_ascii_digit()) {
                out.push(std::mem::take(&mut current));
            } else {
                current.clear();
            }
        }
    }
    if !current.is_empty() && !current.chars().next().is_some_and(|c| c.is_ascii_digit()) {
        out.push(current);
    }
    out
}

fn contains_word(line: &str, word: &str) -> bool {
    line.split(|c: char| !(c.is_alphanumeric() || c == '_'))
        .any(|token| token == word)
}
