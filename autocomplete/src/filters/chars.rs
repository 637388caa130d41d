use super::CharStream;
use futures::StreamExt;
use std::collections::VecDeque;

/// Sliding-window size for [`stop_at_start_of`].
const START_OF_SUFFIX_HOLDBACK: usize = 20;

/// Buffer up to the longest stop token; end the stream the moment the
/// buffer starts with any of them. On EOF, stop-token substrings are
/// stripped from the tail before it is flushed.
pub fn stop_at_stop_tokens(inner: CharStream, tokens: Vec<String>) -> CharStream {
    if tokens.is_empty() {
        return inner;
    }
    let max_len = tokens.iter().map(|t| t.chars().count()).max().unwrap_or(0);

    struct State {
        inner: CharStream,
        tokens: Vec<String>,
        max_len: usize,
        buffer: String,
        out: VecDeque<char>,
        eof: bool,
        ended: bool,
    }

    let state = State {
        inner,
        tokens,
        max_len,
        buffer: String::new(),
        out: VecDeque::new(),
        eof: false,
        ended: false,
    };

    Box::pin(futures::stream::unfold(state, |mut st| async move {
        loop {
            if let Some(c) = st.out.pop_front() {
                return Some((c, st));
            }
            if st.ended {
                return None;
            }
            if st.eof {
                let mut tail = std::mem::take(&mut st.buffer);
                for token in &st.tokens {
                    tail = tail.replace(token.as_str(), "");
                }
                st.out.extend(tail.chars());
                st.ended = true;
                continue;
            }
            match st.inner.next().await {
                Some(c) => {
                    st.buffer.push(c);
                    if st.tokens.iter().any(|t| st.buffer.starts_with(t.as_str())) {
                        st.ended = true;
                        st.buffer.clear();
                        continue;
                    }
                    while st.buffer.chars().count() >= st.max_len {
                        if st.tokens.iter().any(|t| st.buffer.starts_with(t.as_str())) {
                            st.ended = true;
                            st.buffer.clear();
                            break;
                        }
                        let first = st.buffer.remove(0);
                        st.out.push_back(first);
                    }
                }
                None => st.eof = true,
            }
        }
    }))
}

/// End the stream when the model starts reproducing the text that already
/// sits after the cursor. Holds back a window of recent output and compares
/// it against the head of the suffix.
pub fn stop_at_start_of(inner: CharStream, suffix: &str) -> CharStream {
    let window: String = suffix
        .trim_start()
        .chars()
        .take(START_OF_SUFFIX_HOLDBACK * 3 / 2)
        .collect();
    let window_len = window.chars().count();
    if window_len < 4 {
        return inner;
    }
    // The held-back run must fit inside the window to ever match it.
    let holdback = START_OF_SUFFIX_HOLDBACK.min(window_len);

    struct State {
        inner: CharStream,
        window: String,
        holdback: usize,
        buffer: String,
        out: VecDeque<char>,
        eof: bool,
        ended: bool,
    }

    let state = State {
        inner,
        window,
        holdback,
        buffer: String::new(),
        out: VecDeque::new(),
        eof: false,
        ended: false,
    };

    Box::pin(futures::stream::unfold(state, |mut st| async move {
        loop {
            if let Some(c) = st.out.pop_front() {
                return Some((c, st));
            }
            if st.ended {
                return None;
            }
            if st.eof {
                if st.buffer.chars().count() < 4 || !st.window.contains(&st.buffer) {
                    st.out.extend(std::mem::take(&mut st.buffer).chars());
                }
                st.ended = true;
                continue;
            }
            match st.inner.next().await {
                Some(c) => {
                    st.buffer.push(c);
                    if st.buffer.chars().count() >= st.holdback {
                        if st.window.contains(&st.buffer) {
                            st.ended = true;
                            st.buffer.clear();
                            continue;
                        }
                        let first = st.buffer.remove(0);
                        st.out.push_back(first);
                    }
                }
                None => st.eof = true,
            }
        }
    }))
}

/// After one of `end_chars` is produced, only whitespace may follow on the
/// same line; anything else ends the stream before the offending char.
pub fn only_whitespace_after_end_of_line(inner: CharStream, end_chars: Vec<char>) -> CharStream {
    Box::pin(futures::stream::unfold(
        (inner, end_chars, false),
        |(mut inner, end_chars, mut armed)| async move {
            let c = inner.next().await?;
            if armed {
                if c == '\n' {
                    armed = false;
                } else if !c.is_whitespace() {
                    return None;
                }
            }
            if end_chars.contains(&c) {
                armed = true;
            }
            Some((c, (inner, end_chars, armed)))
        },
    ))
}

/// A completion that opens with a newline is noise; end immediately.
pub fn no_first_char_newline(inner: CharStream) -> CharStream {
    Box::pin(futures::stream::unfold(
        (inner, true),
        |(mut inner, first)| async move {
            let c = inner.next().await?;
            if first && (c == '\n' || c == '\r') {
                return None;
            }
            Some((c, (inner, false)))
        },
    ))
}
