//! SSE line parser for chat-completions streaming.
//!
//! The upstream sends lines like:
//!
//! ```text
//! data: {"choices":[{"delta":{"content":"笔"}}]}
//!
//! data: {"choices":[{"delta":{"content":"画"}}]}
//!
//! data: [DONE]
//! ```
//!
//! Each non-empty `data:` line is either a JSON delta chunk or the literal
//! `[DONE]` sentinel. Chunks without content (role announcements, finish
//! markers) are skipped rather than treated as errors.

use serde::Deserialize;

/// The sentinel value that marks the end of an SSE stream.
const DONE_SENTINEL: &str = "[DONE]";

/// Outcome of parsing one SSE line.
#[derive(Debug, Clone, PartialEq)]
pub enum SseLine {
    /// Event boundary, comment, non-data field, or a delta without content.
    Skip,
    /// A text content delta.
    Delta(String),
    /// End-of-stream sentinel.
    Done,
}

#[derive(Debug, Deserialize)]
struct StreamDelta {
    #[serde(default)]
    choices: Vec<StreamDeltaChoice>,
}

#[derive(Debug, Deserialize)]
struct StreamDeltaChoice {
    #[serde(default)]
    delta: StreamDeltaContent,
}

#[derive(Debug, Default, Deserialize)]
struct StreamDeltaContent {
    #[serde(default)]
    content: Option<String>,
}

/// Parse a single SSE line into a [`SseLine`].
///
/// Unparseable `data:` payloads are skipped (some relays interleave
/// keep-alive junk); the stream-level empty-content check catches the case
/// where nothing useful ever arrived.
pub fn parse_sse_line(line: &str) -> SseLine {
    let line = line.trim_end();

    if line.is_empty() || line.starts_with(':') {
        return SseLine::Skip;
    }

    let Some(payload) = line.strip_prefix("data:") else {
        // event:, id:, retry: lines
        return SseLine::Skip;
    };
    let payload = payload.trim_start();

    if payload.is_empty() {
        return SseLine::Skip;
    }
    if payload == DONE_SENTINEL {
        return SseLine::Done;
    }

    match serde_json::from_str::<StreamDelta>(payload) {
        Ok(delta) => {
            let content = delta
                .choices
                .first()
                .and_then(|c| c.delta.content.as_deref())
                .unwrap_or("");
            if content.is_empty() {
                SseLine::Skip
            } else {
                SseLine::Delta(content.to_owned())
            }
        }
        Err(_) => SseLine::Skip,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_content_delta() {
        let line = r#"data: {"choices":[{"delta":{"content":"笔画"}}]}"#;
        assert_eq!(parse_sse_line(line), SseLine::Delta("笔画".into()));
    }

    #[test]
    fn done_sentinel() {
        assert_eq!(parse_sse_line("data: [DONE]"), SseLine::Done);
    }

    #[test]
    fn empty_and_comment_lines_skip() {
        assert_eq!(parse_sse_line(""), SseLine::Skip);
        assert_eq!(parse_sse_line(": keep-alive"), SseLine::Skip);
        assert_eq!(parse_sse_line("event: message"), SseLine::Skip);
    }

    #[test]
    fn role_chunk_without_content_skips() {
        let line = r#"data: {"choices":[{"delta":{"role":"assistant"}}]}"#;
        assert_eq!(parse_sse_line(line), SseLine::Skip);
    }

    #[test]
    fn finish_chunk_with_empty_delta_skips() {
        let line = r#"data: {"choices":[{"delta":{},"finish_reason":"stop"}]}"#;
        assert_eq!(parse_sse_line(line), SseLine::Skip);
    }

    #[test]
    fn malformed_json_skips() {
        assert_eq!(parse_sse_line("data: {not json"), SseLine::Skip);
    }

    #[test]
    fn crlf_terminated_line() {
        let line = "data: {\"choices\":[{\"delta\":{\"content\":\"A\"}}]}\r";
        assert_eq!(parse_sse_line(line), SseLine::Delta("A".into()));
    }
}
