//! Anthropic chat adapter
//!
//! Streams the `messages` SSE protocol: typed events rather than bare
//! deltas. Text deltas become [`StreamEvent::Text`], thinking deltas become
//! [`StreamEvent::Reasoning`], and `tool_use` blocks accumulate their
//! `input_json_delta` fragments until the block stops, at which point the
//! call is rendered into the shared grammar.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::StreamExt;
use serde::Deserialize;
use tiller_core::types::{ChatOutput, ChatRequest, Role, StreamEvent, TokenUsage};
use tiller_core::{ProviderAdapter, ProviderError, ProviderResult};

use crate::providers::{classify_status, render_native_call, tool_parameters_schema};
use crate::stream_buf::SseLineBuffer;

const ANTHROPIC_VERSION: &str = "2023-06-01";
const DEFAULT_MAX_TOKENS: u32 = 4096;

/// Anthropic provider adapter
#[derive(Clone)]
pub struct AnthropicAdapter {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    default_model: String,
    timeout: Duration,
}

impl AnthropicAdapter {
    pub fn new(
        api_key: String,
        base_url: Option<String>,
        model: String,
        timeout_secs: u64,
    ) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key,
            base_url: base_url.unwrap_or_else(|| "https://api.anthropic.com".to_string()),
            default_model: model,
            timeout: Duration::from_secs(timeout_secs),
        }
    }

    fn build_body(&self, request: &ChatRequest, stream: bool) -> serde_json::Value {
        let messages: Vec<serde_json::Value> = request
            .messages
            .iter()
            .map(|m| {
                serde_json::json!({
                    "role": match m.role {
                        Role::User => "user",
                        Role::Assistant => "assistant",
                    },
                    "content": m.flattened_text(),
                })
            })
            .collect();

        let mut body = serde_json::json!({
            "model": self.default_model,
            "max_tokens": DEFAULT_MAX_TOKENS,
            "system": request.system_prompt,
            "messages": messages,
            "stream": stream,
        });

        if let Some(tools) = &request.tools {
            if !tools.is_empty() {
                let payload: Vec<serde_json::Value> = tools
                    .iter()
                    .map(|tool| {
                        serde_json::json!({
                            "name": tool.name,
                            "description": tool.description,
                            "input_schema": tool_parameters_schema(),
                        })
                    })
                    .collect();
                body["tools"] = serde_json::json!(payload);
            }
        }

        body
    }

    fn request_builder(&self, url: &str) -> reqwest::RequestBuilder {
        self.client
            .post(url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("Content-Type", "application/json")
            .timeout(self.timeout)
    }
}

#[async_trait]
impl ProviderAdapter for AnthropicAdapter {
    fn stream_chat(&self, request: ChatRequest) -> BoxStream<'static, ProviderResult<StreamEvent>> {
        use async_stream::stream;

        let adapter = self.clone();
        let url = format!("{}/v1/messages", self.base_url);

        Box::pin(stream! {
            let prompt_chars = request.prompt_chars();
            let body = adapter.build_body(&request, true);

            let response = adapter.request_builder(&url).json(&body).send().await;
            let response = match response {
                Ok(res) => res,
                Err(e) => {
                    yield Err(ProviderError::Http(e.to_string()));
                    return;
                }
            };

            if !response.status().is_success() {
                let status = response.status();
                let error_text = response.text().await.unwrap_or_default();
                yield Err(classify_status(status, &error_text));
                return;
            }

            let mut bytes = response.bytes_stream();
            let mut lines = SseLineBuffer::new();
            let mut open_tools: HashMap<u32, PendingTool> = HashMap::new();
            let mut completion_chars = 0usize;
            let mut input_tokens: Option<u32> = None;
            let mut output_tokens: Option<u32> = None;

            while let Some(chunk_result) = bytes.next().await {
                let chunk = match chunk_result {
                    Ok(bytes) => bytes,
                    Err(e) => {
                        yield Err(ProviderError::Http(e.to_string()));
                        return;
                    }
                };

                for payload in lines.push(&String::from_utf8_lossy(&chunk)) {
                    let event: WireEvent = match serde_json::from_str(&payload) {
                        Ok(event) => event,
                        Err(e) => {
                            yield Err(ProviderError::InvalidResponse(format!(
                                "Failed to parse stream: {e}"
                            )));
                            return;
                        }
                    };

                    match event {
                        WireEvent::MessageStart { message } => {
                            input_tokens = message.usage.map(|u| u.input_tokens);
                        }
                        WireEvent::ContentBlockStart { index, content_block } => {
                            if let WireContentBlock::ToolUse { name } = content_block {
                                open_tools.insert(index, PendingTool {
                                    name,
                                    arguments: String::new(),
                                });
                            }
                        }
                        WireEvent::ContentBlockDelta { index, delta } => match delta {
                            WireBlockDelta::TextDelta { text } => {
                                completion_chars += text.chars().count();
                                yield Ok(StreamEvent::Text(text));
                            }
                            WireBlockDelta::ThinkingDelta { thinking } => {
                                yield Ok(StreamEvent::Reasoning(thinking));
                            }
                            WireBlockDelta::InputJsonDelta { partial_json } => {
                                if let Some(pending) = open_tools.get_mut(&index) {
                                    pending.arguments.push_str(&partial_json);
                                }
                            }
                            WireBlockDelta::Other => {}
                        },
                        WireEvent::ContentBlockStop { index } => {
                            if let Some(pending) = open_tools.remove(&index) {
                                let rendered =
                                    render_native_call(&pending.name, &pending.arguments);
                                completion_chars += rendered.chars().count();
                                yield Ok(StreamEvent::Text(rendered));
                            }
                        }
                        WireEvent::MessageDelta { usage } => {
                            if let Some(usage) = usage {
                                output_tokens = Some(usage.output_tokens);
                            }
                        }
                        WireEvent::MessageStop | WireEvent::Other => {}
                    }
                }
            }

            let usage = match (input_tokens, output_tokens) {
                (Some(prompt), Some(completion)) => TokenUsage::new(prompt, completion),
                _ => TokenUsage::estimate_from_chars(prompt_chars, completion_chars),
            };
            yield Ok(StreamEvent::Usage(usage));
        })
    }

    async fn complete_chat(&self, request: ChatRequest) -> ProviderResult<ChatOutput> {
        let prompt_chars = request.prompt_chars();
        let body = self.build_body(&request, false);
        let url = format!("{}/v1/messages", self.base_url);

        let response = self
            .request_builder(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| ProviderError::Http(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(classify_status(status, &error_text));
        }

        let parsed: WireMessage = response
            .json()
            .await
            .map_err(|e| ProviderError::InvalidResponse(format!("Failed to parse response: {e}")))?;

        let mut text = String::new();
        for block in parsed.content {
            match block {
                WireResponseBlock::Text { text: t } => text.push_str(&t),
                WireResponseBlock::ToolUse { name, input } => {
                    let arguments = input.to_string();
                    if !text.is_empty() && !text.ends_with('\n') {
                        text.push('\n');
                    }
                    text.push_str(&render_native_call(&name, &arguments));
                }
                WireResponseBlock::Other => {}
            }
        }

        let usage = parsed
            .usage
            .map(|u| TokenUsage::new(u.input_tokens, u.output_tokens))
            .unwrap_or_else(|| {
                TokenUsage::estimate_from_chars(prompt_chars, text.chars().count())
            });

        Ok(ChatOutput { text, usage })
    }

    fn provider_name(&self) -> &str {
        "Anthropic"
    }

    fn default_model(&self) -> &str {
        &self.default_model
    }

    async fn health_check(&self) -> ProviderResult<bool> {
        let url = format!("{}/v1/models", self.base_url);
        match self
            .client
            .get(&url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .send()
            .await
        {
            Ok(response) => Ok(response.status().is_success()),
            Err(_) => Ok(false),
        }
    }
}

/// Tool-use block being accumulated across `input_json_delta` fragments.
#[derive(Debug)]
struct PendingTool {
    name: String,
    arguments: String,
}

// Anthropic wire types
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum WireEvent {
    MessageStart {
        message: WireMessageStart,
    },
    ContentBlockStart {
        index: u32,
        content_block: WireContentBlock,
    },
    ContentBlockDelta {
        index: u32,
        delta: WireBlockDelta,
    },
    ContentBlockStop {
        index: u32,
    },
    MessageDelta {
        #[serde(default)]
        usage: Option<WireOutputUsage>,
    },
    MessageStop,
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct WireMessageStart {
    #[serde(default)]
    usage: Option<WireInputUsage>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum WireContentBlock {
    ToolUse {
        name: String,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum WireBlockDelta {
    TextDelta {
        text: String,
    },
    ThinkingDelta {
        thinking: String,
    },
    InputJsonDelta {
        partial_json: String,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct WireInputUsage {
    input_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct WireOutputUsage {
    output_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct WireMessage {
    content: Vec<WireResponseBlock>,
    #[serde(default)]
    usage: Option<WireFullUsage>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum WireResponseBlock {
    Text {
        text: String,
    },
    ToolUse {
        name: String,
        input: serde_json::Value,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct WireFullUsage {
    input_tokens: u32,
    output_tokens: u32,
}
