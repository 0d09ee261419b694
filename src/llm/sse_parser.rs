use crate::errors::{PilotError, PilotResult};
use crate::llm::types::{StreamChunk, StreamChunkKind};

/// Parses a raw SSE line (OpenAI-compatible format) into a StreamChunk.
/// Returns None if the line is a keep-alive or non-data line.
pub fn parse_sse_line(line: &str) -> PilotResult<Option<StreamChunk>> {
    if line.is_empty() || line.starts_with(':') {
        return Ok(None);
    }

    let Some(data) = line.strip_prefix("data:") else {
        return Ok(None);
    };
    let data = data.trim();

    if data == "[DONE]" {
        return Ok(Some(StreamChunk {
            kind: StreamChunkKind::Done,
            content: String::new(),
        }));
    }

    let json: serde_json::Value =
        serde_json::from_str(data).map_err(|e| PilotError::SseParsing(e.to_string()))?;

    let Some(first) = json["choices"].as_array().and_then(|c| c.first()) else {
        return Ok(None);
    };
    let delta = &first["delta"];

    // Reasoning content (some models like DeepSeek expose this)
    if let Some(reasoning) = delta["reasoning_content"].as_str() {
        if !reasoning.is_empty() {
            return Ok(Some(StreamChunk {
                kind: StreamChunkKind::Reasoning,
                content: reasoning.to_string(),
            }));
        }
    }

    if let Some(content) = delta["content"].as_str() {
        if !content.is_empty() {
            return Ok(Some(StreamChunk {
                kind: StreamChunkKind::Content,
                content: content.to_string(),
            }));
        }
    }

    if first["finish_reason"].as_str().is_some() {
        return Ok(Some(StreamChunk {
            kind: StreamChunkKind::Done,
            content: String::new(),
        }));
    }

    Ok(None)
}

/// Accumulates streamed content across arbitrarily split byte chunks.
#[derive(Debug, Default)]
pub struct SseAccumulator {
    line_buf: String,
    pub content: String,
    pub reasoning: String,
    pub done: bool,
}

impl SseAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed raw text; complete lines are parsed, the remainder is buffered.
    pub fn feed(&mut self, text: &str) {
        for ch in text.chars() {
            if self.done {
                return;
            }
            if ch != '\n' {
                self.line_buf.push(ch);
                continue;
            }
            let line = self.line_buf.trim().to_string();
            self.line_buf.clear();
            if line.is_empty() {
                continue;
            }
            match parse_sse_line(&line) {
                Ok(Some(chunk)) => match chunk.kind {
                    StreamChunkKind::Reasoning => self.reasoning.push_str(&chunk.content),
                    StreamChunkKind::Content => self.content.push_str(&chunk.content),
                    StreamChunkKind::Done => self.done = true,
                },
                Ok(None) => {}
                Err(e) => tracing::debug!("SSE parse skipped: {e}"),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keepalive_and_comments_are_ignored() {
        assert!(parse_sse_line("").unwrap().is_none());
        assert!(parse_sse_line(": ping").unwrap().is_none());
        assert!(parse_sse_line("event: message").unwrap().is_none());
    }

    #[test]
    fn content_delta() {
        let chunk = parse_sse_line(r#"data: {"choices":[{"delta":{"content":"{\"act"}}]}"#)
            .unwrap()
            .unwrap();
        assert_eq!(chunk.kind, StreamChunkKind::Content);
        assert_eq!(chunk.content, "{\"act");
    }

    #[test]
    fn done_marker_and_finish_reason() {
        assert_eq!(parse_sse_line("data: [DONE]").unwrap().unwrap().kind, StreamChunkKind::Done);
        let chunk = parse_sse_line(r#"data: {"choices":[{"delta":{},"finish_reason":"stop"}]}"#)
            .unwrap()
            .unwrap();
        assert_eq!(chunk.kind, StreamChunkKind::Done);
    }

    #[test]
    fn malformed_json_is_an_error() {
        assert!(matches!(parse_sse_line("data: {nope"), Err(PilotError::SseParsing(_))));
    }

    #[test]
    fn accumulator_joins_split_chunks() {
        let mut acc = SseAccumulator::new();
        acc.feed("data: {\"choices\":[{\"delta\":{\"content\":\"{\\\"actions\\\"");
        acc.feed(":[]}\"}}]}\n\ndata: {\"choices\":[{\"delta\":{\"reasoning_content\":\"hm\"}}]}\n");
        acc.feed("data: [DONE]\n");
        acc.feed("data: {\"choices\":[{\"delta\":{\"content\":\"ignored\"}}]}\n");
        assert_eq!(acc.content, "{\"actions\":[]}");
        assert_eq!(acc.reasoning, "hm");
        assert!(acc.done);
    }
}
