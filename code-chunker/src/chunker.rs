use crate::basic::basic_chunks;
use crate::language::Language;
use crate::smart::smart_chunks;
use crate::token::TokenCounter;
use crate::{Chunk, ChunkerConfig};
use log::debug;
use std::path::Path;

/// Contents larger than this are never chunked.
const MAX_CHUNKABLE_CHARS: usize = 1_000_000;

/// Chunk one file version.
///
/// Smart-collapse mode is used when a grammar exists for the file's
/// extension, with basic mode as the fallback (including on parse failure).
/// Files that are empty, oversized, or extensionless are skipped. Any chunk
/// that still exceeds the token budget after construction is discarded.
pub fn chunk_document(
    filepath: &str,
    contents: &str,
    config: &ChunkerConfig,
    digest: &str,
) -> Vec<Chunk> {
    if contents.is_empty() {
        return Vec::new();
    }
    if contents.len() > MAX_CHUNKABLE_CHARS {
        debug!("Skipping chunking of {filepath}: contents too large");
        return Vec::new();
    }
    let base_name = Path::new(filepath)
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or("");
    if !base_name.contains('.') {
        return Vec::new();
    }

    let language = Language::from_path(Path::new(filepath));
    let raw = if language.has_tree_sitter_support() {
        match smart_chunks(contents, language, config.max_chunk_size) {
            Some(chunks) => chunks,
            None => {
                debug!("Parse failed for {filepath}; falling back to basic chunking");
                basic_chunks(contents, config.max_chunk_size)
            }
        }
    } else {
        basic_chunks(contents, config.max_chunk_size)
    };

    let counter = TokenCounter::new();
    raw.into_iter()
        .filter(|chunk| {
            !chunk.content.trim().is_empty()
                && counter.count(&chunk.content) <= config.max_chunk_size
        })
        .enumerate()
        .map(|(index, chunk)| Chunk {
            content: chunk.content,
            start_line: chunk.start_line,
            end_line: chunk.end_line,
            filepath: filepath.to_string(),
            digest: digest.to_string(),
            index,
        })
        .collect()
}
