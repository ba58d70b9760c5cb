//! Incremental line buffers for the two wire stream formats
//!
//! Vendor byte streams arrive split at arbitrary points; these buffers
//! accumulate chunks and hand back only complete logical lines. SSE is used
//! by OpenAI, Anthropic, and Gemini; NDJSON by Ollama.

/// Accumulates SSE bytes and extracts complete `data:` payloads.
///
/// Partial lines are retained across pushes. Empty lines, comments, and
/// non-`data:` fields (e.g. `event:`) are skipped; the `[DONE]` sentinel is
/// returned as-is so callers can stop.
#[derive(Debug, Default)]
pub struct SseLineBuffer {
    buf: String,
}

impl SseLineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Push a chunk and drain any complete data payloads.
    pub fn push(&mut self, chunk: &str) -> Vec<String> {
        self.buf.push_str(chunk);
        let mut payloads = Vec::new();

        while let Some(line_end) = self.buf.find('\n') {
            let line = self.buf[..line_end].trim().to_string();
            self.buf.drain(..=line_end);

            if line.is_empty() || !line.starts_with("data:") {
                continue;
            }

            payloads.push(line["data:".len()..].trim_start().to_string());
        }

        payloads
    }
}

/// Accumulates NDJSON bytes and extracts complete JSON lines.
#[derive(Debug, Default)]
pub struct NdjsonBuffer {
    buf: String,
}

impl NdjsonBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Push a chunk and drain any complete non-empty lines.
    pub fn push(&mut self, chunk: &str) -> Vec<String> {
        self.buf.push_str(chunk);
        let mut lines = Vec::new();

        while let Some(line_end) = self.buf.find('\n') {
            let line = self.buf[..line_end].trim().to_string();
            self.buf.drain(..=line_end);

            if !line.is_empty() {
                lines.push(line);
            }
        }

        lines
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sse_extracts_complete_data_lines() {
        let mut buf = SseLineBuffer::new();
        let payloads = buf.push("data: {\"a\":1}\n\ndata: {\"b\":2}\n");
        assert_eq!(payloads, vec![r#"{"a":1}"#, r#"{"b":2}"#]);
    }

    #[test]
    fn sse_retains_partial_line_across_pushes() {
        let mut buf = SseLineBuffer::new();
        assert!(buf.push("data: {\"par").is_empty());
        let payloads = buf.push("tial\":true}\n");
        assert_eq!(payloads, vec![r#"{"partial":true}"#]);
    }

    #[test]
    fn sse_skips_comments_and_event_fields() {
        let mut buf = SseLineBuffer::new();
        let payloads = buf.push(": keep-alive\nevent: message_start\ndata: {}\n");
        assert_eq!(payloads, vec!["{}"]);
    }

    #[test]
    fn sse_passes_done_sentinel_through() {
        let mut buf = SseLineBuffer::new();
        let payloads = buf.push("data: [DONE]\n");
        assert_eq!(payloads, vec!["[DONE]"]);
    }

    #[test]
    fn ndjson_splits_on_newlines_only() {
        let mut buf = NdjsonBuffer::new();
        assert!(buf.push(r#"{"done":"#).is_empty());
        let lines = buf.push("false}\n{\"done\":true}\n");
        assert_eq!(lines, vec![r#"{"done":false}"#, r#"{"done":true}"#]);
    }

    #[test]
    fn ndjson_skips_blank_lines() {
        let mut buf = NdjsonBuffer::new();
        let lines = buf.push("\n\n{\"x\":1}\n\n");
        assert_eq!(lines, vec![r#"{"x":1}"#]);
    }
}
