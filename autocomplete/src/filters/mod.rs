pub mod bracket;
pub mod chars;
pub mod lines;

use futures::Stream;
use std::pin::Pin;

/// The character stage operates on a flattened stream of chars.
pub type CharStream = Pin<Box<dyn Stream<Item = char> + Send>>;

/// The line stage operates on complete lines without terminators.
pub type LineStream = Pin<Box<dyn Stream<Item = String> + Send>>;

/// Flatten model chunks into a char stream.
pub fn chars_of(
    inner: Pin<Box<dyn Stream<Item = String> + Send>>,
) -> CharStream {
    use futures::StreamExt;
    Box::pin(inner.flat_map(|chunk| {
        futures::stream::iter(chunk.chars().collect::<Vec<_>>())
    }))
}

/// Group chars back into lines; a final unterminated line is emitted as-is.
pub fn lines_of(inner: CharStream) -> LineStream {
    Box::pin(futures::stream::unfold(
        (inner, String::new(), false),
        |(mut inner, mut pending, eof)| async move {
            use futures::StreamExt;
            if eof {
                return None;
            }
            loop {
                match inner.next().await {
                    Some('\n') => {
                        let line = std::mem::take(&mut pending);
                        return Some((line, (inner, pending, false)));
                    }
                    Some(c) => pending.push(c),
                    None => {
                        if pending.is_empty() {
                            return None;
                        }
                        return Some((std::mem::take(&mut pending), (inner, pending, true)));
                    }
                }
            }
        },
    ))
}

/// Join a line stream back into display chunks with interleaved newlines.
pub fn interleave_newlines(inner: LineStream) -> Pin<Box<dyn Stream<Item = String> + Send>> {
    Box::pin(futures::stream::unfold(
        (inner, true),
        |(mut inner, first)| async move {
            use futures::StreamExt;
            let line = inner.next().await?;
            let chunk = if first { line } else { format!("\n{line}") };
            Some((chunk, (inner, false)))
        },
    ))
}


#[cfg(test)]
mod tests {
    use super::test_util::*;
    use super::*;
    use futures::StreamExt;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn chars_round_trip_through_lines() {
        let lines = lines_of(char_stream("let x = 1;\nlet y = 2;\ntail")).collect::<Vec<_>>().await;
        assert_eq!(lines, vec!["let x = 1;", "let y = 2;", "tail"]);
    }

    #[tokio::test]
    async fn trailing_newline_produces_no_empty_line() {
        let lines = lines_of(char_stream("one\n")).collect::<Vec<_>>().await;
        assert_eq!(lines, vec!["one"]);
    }

    #[tokio::test]
    async fn interleave_joins_with_newlines() {
        let out: String = interleave_newlines(line_stream(&["a", "b", "c"]))
            .collect::<String>()
            .await;
        assert_eq!(out, "a\nb\nc");
    }
}
