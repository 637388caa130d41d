use super::CharStream;
use futures::StreamExt;
use log::debug;
use std::collections::HashMap;
use std::sync::Mutex;

fn opener_for(closer: char) -> Option<char> {
    match closer {
        ')' => Some('('),
        ']' => Some('['),
        '}' => Some('{'),
        _ => None,
    }
}

fn closer_for(opener: char) -> Option<char> {
    match opener {
        '(' => Some(')'),
        '[' => Some(']'),
        '{' => Some('}'),
        _ => None,
    }
}

fn is_opener(c: char) -> bool {
    matches!(c, '(' | '[' | '{')
}

fn is_closer(c: char) -> bool {
    matches!(c, ')' | ']' | '}')
}

/// Cross-request bracket state. When a completion is accepted with
/// unmatched opening brackets, the next stream in the same file is allowed
/// to close them without tripping the unmatched-closer cutoff.
#[derive(Default)]
pub struct BracketMatchingService {
    unmatched_by_file: Mutex<HashMap<String, Vec<char>>>,
}

impl BracketMatchingService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Scan an accepted completion and remember its unmatched openers.
    pub fn on_accept(&self, file_uri: &str, completion: &str) {
        let mut stack: Vec<char> = Vec::new();
        for c in completion.chars() {
            if is_opener(c) {
                stack.push(c);
            } else if is_closer(c) {
                if stack.last().copied().and_then(closer_for) == Some(c) {
                    stack.pop();
                }
            }
        }

        let mut map = self.lock();
        if stack.is_empty() {
            map.remove(file_uri);
        } else {
            debug!("Remembering {} unmatched openers for {file_uri}", stack.len());
            map.insert(file_uri.to_string(), stack);
        }
    }

    /// Build the initial stack for a new stream.
    ///
    /// Multiline completions inherit the openers remembered from the last
    /// accepted completion in this file (consumed here). Single-line
    /// completions start from the unclosed openers of the current line.
    /// Closers sitting at the head of the suffix get matching openers
    /// pushed so the model may legally re-type them.
    pub fn seed(
        &self,
        file_uri: &str,
        multiline: bool,
        current_line_prefix: &str,
        suffix: &str,
    ) -> Vec<char> {
        let mut stack = if multiline {
            self.lock().remove(file_uri).unwrap_or_default()
        } else {
            let mut line_stack: Vec<char> = Vec::new();
            for c in current_line_prefix.chars() {
                if is_opener(c) {
                    line_stack.push(c);
                } else if is_closer(c)
                    && line_stack.last().copied().and_then(closer_for) == Some(c)
                {
                    line_stack.pop();
                }
            }
            line_stack
        };

        let suffix_closers: Vec<char> = suffix
            .trim_start()
            .chars()
            .take_while(|c| is_closer(*c))
            .collect();
        for closer in suffix_closers.iter().rev() {
            if let Some(opener) = opener_for(*closer) {
                stack.push(opener);
            }
        }
        stack
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, Vec<char>>> {
        match self.unmatched_by_file.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

/// Track brackets while streaming: openers push, closers pop; a closer
/// with no matching opener ends the stream just before the offending
/// character. Leading whitespace and closers pass unchecked, since they
/// may belong to the surrounding code.
pub fn stop_on_unmatched_closing_bracket(inner: CharStream, seeded: Vec<char>) -> CharStream {
    Box::pin(futures::stream::unfold(
        (inner, seeded, true),
        |(mut inner, mut stack, mut leading)| async move {
            let c = inner.next().await?;
            if is_opener(c) {
                leading = false;
                stack.push(c);
            } else if is_closer(c) {
                if !leading {
                    if stack.last().copied().and_then(closer_for) == Some(c) {
                        stack.pop();
                    } else {
                        return None;
                    }
                }
            } else if !c.is_whitespace() {
                leading = false;
            }
            Some((c, (inner, stack, leading)))
        },
    ))
}

#[cfg(test)]
mod tests {
    use super::super::test_util::{char_stream, collect_chars};
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn balanced_code_passes_unchanged() {
        let code = "fn main() {\n    let v = vec![1, (2 + 3)];\n}";
        let out = collect_chars(stop_on_unmatched_closing_bracket(
            char_stream(code),
            Vec::new(),
        ))
        .await;
        assert_eq!(out, code);
    }

    #[tokio::test]
    async fn unmatched_closer_ends_before_the_offender() {
        let out = collect_chars(stop_on_unmatched_closing_bracket(
            char_stream("let x = f(a);\n}rest"),
            Vec::new(),
        ))
        .await;
        assert_eq!(out, "let x = f(a);\n");
    }

    #[tokio::test]
    async fn seeded_openers_allow_matching_closers() {
        let out = collect_chars(stop_on_unmatched_closing_bracket(
            char_stream("body();\n}"),
            vec!['{'],
        ))
        .await;
        assert_eq!(out, "body();\n}");
    }

    #[tokio::test]
    async fn leading_closers_pass_unchecked() {
        let out = collect_chars(stop_on_unmatched_closing_bracket(
            char_stream("  )\nnext()"),
            Vec::new(),
        ))
        .await;
        assert_eq!(out, "  )\nnext()");
    }

    #[test]
    fn accept_records_unmatched_openers() {
        let service = BracketMatchingService::new();
        service.on_accept("file:///a.rs", "if ok {\n    start(");
        let seeded = service.seed("file:///a.rs", true, "", "");
        assert_eq!(seeded, vec!['{', '(']);

        // Consumed on use.
        assert!(service.seed("file:///a.rs", true, "", "").is_empty());
    }

    #[test]
    fn balanced_accept_clears_memory() {
        let service = BracketMatchingService::new();
        service.on_accept("file:///a.rs", "start(");
        service.on_accept("file:///a.rs", "fn done() { body(); }");
        assert!(service.seed("file:///a.rs", true, "", "").is_empty());
    }

    #[test]
    fn single_line_seed_uses_current_line() {
        let service = BracketMatchingService::new();
        let seeded = service.seed("file:///a.rs", false, "let v = map.get(key", "");
        assert_eq!(seeded, vec!['(']);
    }

    #[test]
    fn suffix_closers_push_matching_openers() {
        let service = BracketMatchingService::new();
        let seeded = service.seed("file:///a.rs", false, "", ")];\nrest");
        // Innermost closer first in the suffix, so its opener lands on top.
        assert_eq!(seeded, vec!['[', '(']);
    }
}
