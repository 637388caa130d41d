use crate::token::TokenCounter;
use crate::ChunkWithoutId;

/// Plain line-accumulation chunking, used when no grammar is available.
///
/// Accumulates lines until adding the next one would exceed
/// `max_chunk_size - 5` tokens, then flushes. Lines that alone exceed the
/// budget are dropped, not split.
pub(crate) fn basic_chunks(contents: &str, max_chunk_size: usize) -> Vec<ChunkWithoutId> {
    let counter = TokenCounter::new();
    let budget = max_chunk_size.saturating_sub(5);

    let mut chunks = Vec::new();
    let mut chunk_lines: Vec<&str> = Vec::new();
    let mut chunk_tokens = 0usize;
    let mut start_line = 0usize;

    let mut flush = |lines: &mut Vec<&str>, start: usize, end: usize, out: &mut Vec<ChunkWithoutId>| {
        if !lines.is_empty() {
            out.push(ChunkWithoutId {
                content: lines.join("\n"),
                start_line: start,
                end_line: end,
            });
            lines.clear();
        }
    };

    for (i, line) in contents.lines().enumerate() {
        let line_tokens = counter.count(line);

        if line_tokens > budget {
            // Oversized single line: flush what we have and skip it.
            flush(&mut chunk_lines, start_line, i.saturating_sub(1), &mut chunks);
            chunk_tokens = 0;
            start_line = i + 1;
            continue;
        }

        if chunk_tokens + line_tokens > budget {
            flush(&mut chunk_lines, start_line, i.saturating_sub(1), &mut chunks);
            chunk_tokens = 0;
            start_line = i;
        }

        chunk_lines.push(line);
        chunk_tokens += line_tokens;
    }

    let line_count = contents.lines().count();
    flush(
        &mut chunk_lines,
        start_line,
        line_count.saturating_sub(1),
        &mut chunks,
    );

    chunks
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn short_file_is_one_chunk() {
        let chunks = basic_chunks("line one\nline two\n", 512);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].start_line, 0);
        assert_eq!(chunks[0].end_line, 1);
        assert_eq!(chunks[0].content, "line one\nline two");
    }

    #[test]
    fn splits_when_budget_exceeded() {
        let contents = (0..40)
            .map(|i| format!("let variable_{i} = some_function_call({i});"))
            .collect::<Vec<_>>()
            .join("\n");
        let chunks = basic_chunks(&contents, 64);
        assert!(chunks.len() > 1);

        let counter = TokenCounter::new();
        for chunk in &chunks {
            assert!(counter.count(&chunk.content) <= 64);
            assert!(chunk.start_line <= chunk.end_line);
        }
    }

    #[test]
    fn chunks_cover_contiguous_line_ranges() {
        let contents = (0..30)
            .map(|i| format!("fn generated_function_{i}() {{ body(); }}"))
            .collect::<Vec<_>>()
            .join("\n");
        let chunks = basic_chunks(&contents, 48);

        for pair in chunks.windows(2) {
            assert_eq!(pair[1].start_line, pair[0].end_line + 1);
        }
    }

    #[test]
    fn oversized_line_is_dropped() {
        let long_line = "x".repeat(4096);
        let contents = format!("short line\n{long_line}\nanother short line");
        let chunks = basic_chunks(&contents, 64);

        assert!(chunks.iter().all(|c| !c.content.contains(&long_line)));
        assert!(chunks.iter().any(|c| c.content.contains("short line")));
        assert!(chunks.iter().any(|c| c.content.contains("another short line")));
    }

    #[test]
    fn empty_input_yields_no_chunks() {
        assert!(basic_chunks("", 512).is_empty());
    }
}
