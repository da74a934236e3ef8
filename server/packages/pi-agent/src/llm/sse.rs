use std::collections::VecDeque;
use std::fmt::Display;
use std::time::Duration;

use futures::{Stream, StreamExt};

/// Payload that marks the end of an OpenAI-style event stream.
pub const DONE_SENTINEL: &str = "[DONE]";

/// Incremental byte-to-line splitter.
///
/// Bytes are held until their `\n` arrives, so chunk boundaries may fall
/// anywhere, including inside a multi-byte character.
#[derive(Debug, Default)]
pub struct LineFramer {
    buffer: Vec<u8>,
}

impl LineFramer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        let mut lines = Vec::new();
        let mut search_from = self.buffer.len();
        self.buffer.extend_from_slice(chunk);
        while let Some(offset) = self.buffer[search_from..].iter().position(|b| *b == b'\n') {
            let end = search_from + offset;
            let raw: Vec<u8> = self.buffer.drain(..=end).collect();
            if let Some(line) = decode_line(&raw[..end]) {
                lines.push(line);
            }
            search_from = 0;
        }
        lines
    }

    /// Flush whatever followed the last newline.
    pub fn finish(&mut self) -> Option<String> {
        let rest = std::mem::take(&mut self.buffer);
        decode_line(&rest)
    }
}

fn decode_line(bytes: &[u8]) -> Option<String> {
    let text = String::from_utf8_lossy(bytes);
    let trimmed = text.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

struct FrameState<S> {
    body: std::pin::Pin<Box<S>>,
    framer: LineFramer,
    pending: VecDeque<String>,
    idle_timeout: Duration,
    done: bool,
}

impl<S> FrameState<S> {
    fn finish(&mut self) {
        self.done = true;
        self.pending.extend(self.framer.finish());
    }
}

/// Lazily frames a response body into trimmed, non-empty lines.
///
/// A read error or an idle gap longer than `idle_timeout` ends the stream
/// early; the buffered tail is still yielded.
pub fn frame_lines<S, B, E>(body: S, idle_timeout: Duration) -> impl Stream<Item = String>
where
    S: Stream<Item = Result<B, E>>,
    B: AsRef<[u8]>,
    E: Display,
{
    let state = FrameState {
        body: Box::pin(body),
        framer: LineFramer::new(),
        pending: VecDeque::new(),
        idle_timeout,
        done: false,
    };
    futures::stream::unfold(state, |mut state| async move {
        loop {
            if let Some(line) = state.pending.pop_front() {
                return Some((line, state));
            }
            if state.done {
                return None;
            }
            match tokio::time::timeout(state.idle_timeout, state.body.next()).await {
                Ok(Some(Ok(chunk))) => {
                    let lines = state.framer.push(chunk.as_ref());
                    state.pending.extend(lines);
                }
                Ok(Some(Err(err))) => {
                    tracing::warn!(error = %err, "upstream stream read failed");
                    state.finish();
                }
                Ok(None) => state.finish(),
                Err(_) => {
                    tracing::warn!(
                        idle_ms = state.idle_timeout.as_millis() as u64,
                        "upstream stream went idle"
                    );
                    state.finish();
                }
            }
        }
    })
}

/// Strip a `data:` prefix; other lines pass through unchanged.
pub fn extract_sse_data(line: &str) -> &str {
    match line.strip_prefix("data:") {
        Some(data) => data.trim(),
        None => line,
    }
}

/// SSE fields other than `data` never carry a provider payload.
pub fn is_sse_field_line(line: &str) -> bool {
    line.starts_with(':')
        || line.starts_with("event:")
        || line.starts_with("id:")
        || line.starts_with("retry:")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn framer_joins_partial_reads() {
        let mut framer = LineFramer::new();
        assert!(framer.push(b"abc").is_empty());
        assert_eq!(framer.push(b"def\n"), vec!["abcdef".to_string()]);
        assert_eq!(framer.push(b"ghi\nxyz"), vec!["ghi".to_string()]);
        assert_eq!(framer.finish(), Some("xyz".to_string()));
        assert_eq!(framer.finish(), None);
    }

    #[test]
    fn framer_skips_blank_lines_and_trims() {
        let mut framer = LineFramer::new();
        let lines = framer.push(b"  data: 1 \r\n\r\n\n data: 2\n");
        assert_eq!(lines, vec!["data: 1".to_string(), "data: 2".to_string()]);
    }

    #[test]
    fn framer_handles_split_utf8() {
        let bytes = "héllo\n".as_bytes();
        let mut framer = LineFramer::new();
        assert!(framer.push(&bytes[..2]).is_empty());
        assert_eq!(framer.push(&bytes[2..]), vec!["héllo".to_string()]);
    }

    #[test]
    fn extractor_strips_prefix() {
        assert_eq!(extract_sse_data("data: {\"a\":1}"), "{\"a\":1}");
        assert_eq!(extract_sse_data("data:[DONE]"), DONE_SENTINEL);
        assert_eq!(extract_sse_data("{\"raw\":true}"), "{\"raw\":true}");
        assert!(is_sse_field_line("event: message_start"));
        assert!(!is_sse_field_line("data: {}"));
    }

    #[tokio::test]
    async fn frame_lines_flushes_tail() {
        let chunks: Vec<Result<&[u8], String>> =
            vec![Ok(b"abc".as_slice()), Ok(b"def\nghi\nxyz".as_slice())];
        let lines: Vec<String> = frame_lines(futures::stream::iter(chunks), Duration::from_secs(5))
            .collect()
            .await;
        assert_eq!(lines, vec!["abcdef", "ghi", "xyz"]);
    }

    #[tokio::test]
    async fn frame_lines_stops_on_read_error() {
        let chunks: Vec<Result<&[u8], String>> = vec![
            Ok(b"one\ntw".as_slice()),
            Err("reset".to_string()),
            Ok(b"never\n".as_slice()),
        ];
        let lines: Vec<String> = frame_lines(futures::stream::iter(chunks), Duration::from_secs(5))
            .collect()
            .await;
        assert_eq!(lines, vec!["one", "tw"]);
    }

    #[tokio::test]
    async fn frame_lines_stops_when_idle() {
        let head = futures::stream::iter(vec![Ok::<_, String>(b"partial".as_slice())]);
        let body = head.chain(futures::stream::pending());
        let lines: Vec<String> = frame_lines(body, Duration::from_millis(20)).collect().await;
        assert_eq!(lines, vec!["partial"]);
    }
}
