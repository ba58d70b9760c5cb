//! Shared data model for conversations, streaming, and tool invocations

use serde::{Deserialize, Serialize};

/// Divisor for the cheap length-based token estimate used everywhere a
/// vendor does not report real counts.
pub const APPROX_CHARS_PER_TOKEN: usize = 4;

/// Conversation roles.
///
/// Tool results re-enter the conversation as `User` turns; there is no
/// separate tool role in the shared model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// A content block inside a structured message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Text { text: String },
    /// Base64 image payload, e.g. a page screenshot from a browser tool.
    Image { media_type: String, data: String },
}

/// Message content: plain text or an ordered list of typed blocks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Blocks(Vec<ContentBlock>),
}

/// A single conversation turn. Append-only within a session; only the
/// context trimmer may remove turns, oldest pair first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: MessageContent,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: MessageContent::Text(content.into()),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: MessageContent::Text(content.into()),
        }
    }

    /// Text rendering of the content, used for token estimation and for
    /// vendors without block-structured input.
    pub fn flattened_text(&self) -> String {
        match &self.content {
            MessageContent::Text(text) => text.clone(),
            MessageContent::Blocks(blocks) => blocks
                .iter()
                .filter_map(|b| match b {
                    ContentBlock::Text { text } => Some(text.as_str()),
                    ContentBlock::Image { .. } => None,
                })
                .collect::<Vec<_>>()
                .join("\n"),
        }
    }

    /// Estimated token count for this message.
    pub fn token_estimate(&self) -> usize {
        self.flattened_text().chars().count() / APPROX_CHARS_PER_TOKEN
    }
}

/// Token usage counters for a single model call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

impl TokenUsage {
    pub fn new(prompt_tokens: u32, completion_tokens: u32) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens + completion_tokens,
        }
    }

    /// Best-effort estimate from character lengths, for vendors that do not
    /// report usage.
    pub fn estimate_from_chars(prompt_chars: usize, completion_chars: usize) -> Self {
        let divisor = APPROX_CHARS_PER_TOKEN as u32;
        Self::new(
            prompt_chars as u32 / divisor,
            completion_chars as u32 / divisor,
        )
    }
}

/// One normalized event from a provider stream.
///
/// Every vendor-specific streaming shape (SSE deltas, function-call deltas,
/// candidate/part trees) is flattened into this union inside the adapter;
/// nothing downstream inspects vendor fields.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    /// Incremental model output. The only variant the tool-call scanner sees.
    Text(String),
    /// Vendor "thinking" output. Never scanned for tool calls.
    Reasoning(String),
    /// Token counters, emitted at least once per call.
    Usage(TokenUsage),
}

/// A parsed request to run a tool, derived from the textual grammar.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolInvocation {
    pub name: String,
    pub raw_input: String,
    pub requires_approval: bool,
}

impl ToolInvocation {
    /// Canonical grammar rendering of this invocation. Adapters use this to
    /// normalize native function calls; the session uses it to record the
    /// assistant turn in a vendor-independent form.
    pub fn to_grammar(&self) -> String {
        format!(
            "<tool>{}</tool>\n<input>{}</input>\n<requires_approval>{}</requires_approval>",
            self.name, self.raw_input, self.requires_approval
        )
    }
}

/// Tool metadata advertised to the model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
}

/// Input to a provider call: everything an adapter needs to build its
/// vendor request.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatRequest {
    pub system_prompt: String,
    pub messages: Vec<Message>,
    pub tools: Option<Vec<ToolSpec>>,
}

impl ChatRequest {
    pub fn new(system_prompt: impl Into<String>, messages: Vec<Message>) -> Self {
        Self {
            system_prompt: system_prompt.into(),
            messages,
            tools: None,
        }
    }

    pub fn with_tools(mut self, tools: Vec<ToolSpec>) -> Self {
        self.tools = Some(tools);
        self
    }

    /// Character count of the rendered prompt, for usage estimation.
    pub fn prompt_chars(&self) -> usize {
        self.system_prompt.chars().count()
            + self
                .messages
                .iter()
                .map(|m| m.flattened_text().chars().count())
                .sum::<usize>()
    }
}

/// Output of the non-streaming call shape.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatOutput {
    pub text: String,
    pub usage: TokenUsage,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flattened_text_joins_text_blocks_and_skips_images() {
        let msg = Message {
            role: Role::User,
            content: MessageContent::Blocks(vec![
                ContentBlock::Text {
                    text: "before".to_string(),
                },
                ContentBlock::Image {
                    media_type: "image/png".to_string(),
                    data: "aGVsbG8=".to_string(),
                },
                ContentBlock::Text {
                    text: "after".to_string(),
                },
            ]),
        };

        assert_eq!(msg.flattened_text(), "before\nafter");
    }

    #[test]
    fn token_estimate_uses_char_divisor() {
        let msg = Message::user("x".repeat(400));
        assert_eq!(msg.token_estimate(), 100);
    }

    #[test]
    fn usage_estimate_totals_add_up() {
        let usage = TokenUsage::estimate_from_chars(400, 80);
        assert_eq!(usage.prompt_tokens, 100);
        assert_eq!(usage.completion_tokens, 20);
        assert_eq!(usage.total_tokens, 120);
    }

    #[test]
    fn grammar_rendering_round_trips_fields() {
        let invocation = ToolInvocation {
            name: "navigate".to_string(),
            raw_input: r#"{"url": "https://example.com"}"#.to_string(),
            requires_approval: true,
        };

        let rendered = invocation.to_grammar();
        assert!(rendered.starts_with("<tool>navigate</tool>\n"));
        assert!(rendered.contains(r#"<input>{"url": "https://example.com"}</input>"#));
        assert!(rendered.ends_with("<requires_approval>true</requires_approval>"));
    }
}
