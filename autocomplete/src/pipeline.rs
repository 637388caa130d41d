use crate::filters::bracket::stop_on_unmatched_closing_bracket;
use crate::filters::chars::{
    no_first_char_newline, only_whitespace_after_end_of_line, stop_at_start_of,
    stop_at_stop_tokens,
};
use crate::filters::lines::{
    avoid_empty_comments, avoid_path_line, filter_code_block_lines, filter_english_lines_at_end,
    filter_english_lines_at_start, filter_leading_newline, no_double_new_line,
    remove_trailing_whitespace, show_whatever_we_have_at, skip_wrapper_markers, stop_at_lines,
    stop_at_lines_exact, stop_at_repeating_lines, stop_at_similar_line,
};
use crate::filters::{chars_of, interleave_newlines, lines_of, LineStream};
use crate::stream::ChunkStream;
use futures::StreamExt;
use std::time::Duration;

/// Everything the filter chain needs to know about one completion.
#[derive(Clone, Debug)]
pub struct PipelineOptions {
    pub stop_tokens: Vec<String>,
    /// Text after the cursor; feeds the suffix-repetition cutoff.
    pub suffix: String,
    /// First non-blank line below the cursor.
    pub line_below_cursor: String,
    pub comment_prefix: String,
    pub multiline: bool,
    /// Initial bracket stack (see the bracket-matching service).
    pub bracket_seed: Vec<char>,
    /// Chars that end a statement for this language; enables the
    /// only-whitespace-after filter when non-empty.
    pub end_of_line_chars: Vec<char>,
    /// Soft timeout for the whole chain.
    pub show_whatever_we_have_at: Duration,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            stop_tokens: Vec::new(),
            suffix: String::new(),
            line_below_cursor: String::new(),
            comment_prefix: "//".to_string(),
            multiline: true,
            bracket_seed: Vec::new(),
            end_of_line_chars: Vec::new(),
            show_whatever_we_have_at: Duration::from_millis(1800),
        }
    }
}

/// Run the two-stage filter chain over raw model chunks and hand back
/// display-ready chunks.
///
/// Character stage: stop tokens, suffix repetition, language char filters,
/// bracket matching. Line stage: the full battery in its fixed order, the
/// soft timeout last, then newlines interleaved back in.
pub fn apply_filter_pipeline(raw: ChunkStream, options: PipelineOptions) -> ChunkStream {
    let PipelineOptions {
        stop_tokens,
        suffix,
        line_below_cursor,
        comment_prefix,
        multiline,
        bracket_seed,
        end_of_line_chars,
        show_whatever_we_have_at: soft_timeout,
    } = options;

    // Character stage.
    let mut chars = chars_of(raw);
    chars = stop_at_stop_tokens(chars, stop_tokens);
    chars = stop_at_start_of(chars, &suffix);
    if !multiline {
        chars = no_first_char_newline(chars);
    }
    if !end_of_line_chars.is_empty() {
        chars = only_whitespace_after_end_of_line(chars, end_of_line_chars);
    }
    chars = stop_on_unmatched_closing_bracket(chars, bracket_seed);

    // Line stage.
    let mut lines: LineStream = lines_of(chars);
    lines = stop_at_lines(lines);
    lines = stop_at_lines_exact(lines, &line_below_cursor);
    lines = stop_at_repeating_lines(lines);
    lines = avoid_empty_comments(lines, &comment_prefix);
    lines = avoid_path_line(lines, &comment_prefix);
    lines = skip_wrapper_markers(lines);
    lines = filter_code_block_lines(lines);
    lines = no_double_new_line(lines);
    lines = filter_english_lines_at_start(lines);
    lines = filter_english_lines_at_end(lines);
    lines = filter_leading_newline(lines);
    lines = remove_trailing_whitespace(lines);
    lines = stop_at_similar_line(lines, &line_below_cursor);
    lines = show_whatever_we_have_at(lines, soft_timeout);
    if !multiline {
        lines = Box::pin(lines.take(1));
    }

    interleave_newlines(lines)
}
