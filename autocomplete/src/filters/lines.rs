use super::LineStream;
use futures::StreamExt;
use std::time::Duration;
use tokio::time::Instant;

/// Phrases that mean the model has wandered past useful code.
const LINES_TO_STOP_AT: &[&str] = &["# End of file.", "<STOP EDITING HERE"];

/// Wrapper markers some models copy from their fine-tuning format.
const PREFIXES_TO_SKIP: &[&str] = &["<COMPLETION>", "[CODE]", "<START EDITING HERE>", "{{FILL_HERE}}"];
const LINES_TO_SKIP: &[&str] = &["</COMPLETION>", "[/CODE]", "</START EDITING HERE>"];

/// Conversational openers that mark an English preamble, not code.
const ENGLISH_START_PHRASES: &[&str] = &[
    "here is",
    "here's",
    "sure, here",
    "sure thing",
    "sure!",
    "okay, here",
    "certainly",
    "of course",
];

/// Keywords whose lines legitimately end with a colon.
const CODE_KEYWORDS_ENDING_IN_COLON: &[&str] = &[
    "def", "class", "if", "elif", "else", "try", "except", "finally", "for", "while", "with",
    "case", "default", "match", "switch",
];

/// Maximum Levenshtein distance over line length for the similar-line cut.
const SIMILAR_LINE_RATIO: f64 = 0.1;

enum LineAction {
    Emit(String),
    Skip,
    Stop,
}

/// Drive a per-line state machine over the stream.
fn line_machine(
    inner: LineStream,
    f: impl FnMut(String) -> LineAction + Send + 'static,
) -> LineStream {
    Box::pin(futures::stream::unfold(
        (inner, f, false),
        |(mut inner, mut f, stopped)| async move {
            if stopped {
                return None;
            }
            loop {
                match inner.next().await {
                    Some(line) => match f(line) {
                        LineAction::Emit(line) => return Some((line, (inner, f, false))),
                        LineAction::Skip => continue,
                        LineAction::Stop => return None,
                    },
                    None => return None,
                }
            }
        },
    ))
}

/// End when a line contains one of the fixed stop phrases.
pub fn stop_at_lines(inner: LineStream) -> LineStream {
    line_machine(inner, |line| {
        if LINES_TO_STOP_AT.iter().any(|phrase| line.contains(phrase)) {
            LineAction::Stop
        } else {
            LineAction::Emit(line)
        }
    })
}

/// End on an exact reproduction of the first non-blank line below the
/// cursor.
pub fn stop_at_lines_exact(inner: LineStream, below_cursor_line: &str) -> LineStream {
    let below = below_cursor_line.to_string();
    if below.trim().is_empty() {
        return inner;
    }
    line_machine(inner, move |line| {
        if line == below {
            LineAction::Stop
        } else {
            LineAction::Emit(line)
        }
    })
}

/// End when the same exact line arrives three times in a row; the third
/// repetition is not emitted.
pub fn stop_at_repeating_lines(inner: LineStream) -> LineStream {
    let mut last: Option<String> = None;
    let mut count = 0usize;
    line_machine(inner, move |line| {
        if last.as_deref() == Some(line.as_str()) {
            count += 1;
        } else {
            last = Some(line.clone());
            count = 1;
        }
        if count >= 3 {
            LineAction::Stop
        } else {
            LineAction::Emit(line)
        }
    })
}

/// Drop lines that are nothing but the comment prefix.
pub fn avoid_empty_comments(inner: LineStream, comment_prefix: &str) -> LineStream {
    let prefix = comment_prefix.to_string();
    line_machine(inner, move |line| {
        if line.trim() == prefix {
            LineAction::Skip
        } else {
            LineAction::Emit(line)
        }
    })
}

/// Drop `// Path: …` header lines the model sometimes copies from prompts.
pub fn avoid_path_line(inner: LineStream, comment_prefix: &str) -> LineStream {
    let marker = format!("{comment_prefix} Path: ");
    line_machine(inner, move |line| {
        if line.trim_start().starts_with(&marker) {
            LineAction::Skip
        } else {
            LineAction::Emit(line)
        }
    })
}

/// Strip wrapper markers from the head of the first line and drop lines
/// that are closing wrapper markers.
pub fn skip_wrapper_markers(inner: LineStream) -> LineStream {
    let mut first = true;
    line_machine(inner, move |mut line| {
        if first {
            first = false;
            for prefix in PREFIXES_TO_SKIP {
                if let Some(rest) = line.strip_prefix(prefix) {
                    line = rest.trim_start().to_string();
                    break;
                }
            }
            if line.is_empty() {
                return LineAction::Skip;
            }
        }
        if LINES_TO_SKIP.iter().any(|marker| line.trim() == *marker) {
            LineAction::Skip
        } else {
            LineAction::Emit(line)
        }
    })
}

/// Remove a leading code fence and end at its matching closing fence.
pub fn filter_code_block_lines(inner: LineStream) -> LineStream {
    let mut nesting = 0usize;
    let mut first = true;
    line_machine(inner, move |line| {
        let trimmed = line.trim();
        let is_fence = trimmed.starts_with("```");
        if first {
            first = false;
            if is_fence {
                nesting = 1;
                return LineAction::Skip;
            }
        } else if is_fence && nesting > 0 {
            if trimmed == "```" && nesting == 1 {
                return LineAction::Stop;
            }
            if trimmed == "```" {
                nesting -= 1;
            } else {
                nesting += 1;
            }
            return LineAction::Emit(line);
        }
        LineAction::Emit(line)
    })
}

fn is_english_line(line: &str) -> bool {
    let lowered = line.trim().to_lowercase();
    if lowered.is_empty() {
        return false;
    }
    if ENGLISH_START_PHRASES
        .iter()
        .any(|phrase| lowered.starts_with(phrase))
    {
        return true;
    }
    if lowered.ends_with(':') {
        let first_word = lowered.split_whitespace().next().unwrap_or("");
        let keyword = first_word.trim_end_matches(':');
        return !CODE_KEYWORDS_ENDING_IN_COLON.contains(&keyword);
    }
    false
}

/// Drop a short English preamble (and its trailing blank) from the head of
/// the stream.
pub fn filter_english_lines_at_start(inner: LineStream) -> LineStream {
    let mut at_start = true;
    line_machine(inner, move |line| {
        if at_start {
            if line.trim().is_empty() || is_english_line(&line) {
                return LineAction::Skip;
            }
            at_start = false;
        }
        LineAction::Emit(line)
    })
}

/// After a closing code fence has gone by, drop English postamble lines.
pub fn filter_english_lines_at_end(inner: LineStream) -> LineStream {
    let mut seen_closing_fence = false;
    line_machine(inner, move |line| {
        if line.trim().starts_with("```") {
            seen_closing_fence = true;
            return LineAction::Emit(line);
        }
        if seen_closing_fence && is_english_line(&line) {
            return LineAction::Skip;
        }
        LineAction::Emit(line)
    })
}

/// End at the second consecutive blank line.
pub fn no_double_new_line(inner: LineStream) -> LineStream {
    let mut previous_blank = false;
    line_machine(inner, move |line| {
        let blank = line.trim().is_empty();
        if blank && previous_blank {
            return LineAction::Stop;
        }
        previous_blank = blank;
        LineAction::Emit(line)
    })
}

/// Drop blank lines at the very start of the stream.
pub fn filter_leading_newline(inner: LineStream) -> LineStream {
    let mut at_start = true;
    line_machine(inner, move |line| {
        if at_start {
            if line.trim().is_empty() {
                return LineAction::Skip;
            }
            at_start = false;
        }
        LineAction::Emit(line)
    })
}

/// Trim trailing whitespace from every line. Idempotent.
pub fn remove_trailing_whitespace(inner: LineStream) -> LineStream {
    line_machine(inner, |line| LineAction::Emit(line.trim_end().to_string()))
}

/// End when a line is nearly identical to the first non-blank line below
/// the cursor (relative Levenshtein distance under 10%).
pub fn stop_at_similar_line(inner: LineStream, below_cursor_line: &str) -> LineStream {
    let below = below_cursor_line.trim().to_string();
    if below.is_empty() {
        return inner;
    }
    line_machine(inner, move |line| {
        let trimmed = line.trim();
        if !trimmed.is_empty() {
            let distance = strsim::levenshtein(trimmed, &below) as f64;
            let length = trimmed.chars().count().max(1) as f64;
            if distance / length < SIMILAR_LINE_RATIO {
                return LineAction::Stop;
            }
        }
        LineAction::Emit(line)
    })
}

/// Soft timeout: once `timeout` has elapsed AND at least one non-blank
/// line has been emitted, end instead of waiting for more.
pub fn show_whatever_we_have_at(inner: LineStream, timeout: Duration) -> LineStream {
    let deadline = Instant::now() + timeout;
    Box::pin(futures::stream::unfold(
        (inner, false),
        move |(mut inner, mut emitted_non_blank)| async move {
            if emitted_non_blank && Instant::now() >= deadline {
                return None;
            }
            let next = if emitted_non_blank {
                match tokio::time::timeout_at(deadline, inner.next()).await {
                    Ok(next) => next,
                    Err(_) => return None,
                }
            } else {
                inner.next().await
            };
            let line = next?;
            if !line.trim().is_empty() {
                emitted_non_blank = true;
            }
            Some((line, (inner, emitted_non_blank)))
        },
    ))
}
