//! OpenAI chat adapter
//!
//! Streams `chat/completions` SSE deltas and normalizes them to
//! [`StreamEvent`]. Native tool-call deltas are accumulated across chunks
//! (id, name, and argument fragments arrive separately) and rendered into
//! the shared grammar once the turn finishes.

use std::time::Duration;

use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::StreamExt;
use serde::Deserialize;
use tiller_core::types::{ChatOutput, ChatRequest, Role, StreamEvent, TokenUsage, ToolSpec};
use tiller_core::{ProviderAdapter, ProviderError, ProviderResult};

use crate::cache::PromptCache;
use crate::providers::{classify_status, render_native_call, tool_parameters_schema};
use crate::stream_buf::SseLineBuffer;

/// OpenAI provider adapter
#[derive(Clone)]
pub struct OpenAiAdapter {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    default_model: String,
    timeout: Duration,
    cache: PromptCache,
}

impl OpenAiAdapter {
    pub fn new(
        api_key: String,
        base_url: Option<String>,
        model: String,
        timeout_secs: u64,
    ) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key,
            base_url: base_url.unwrap_or_else(|| "https://api.openai.com/v1".to_string()),
            default_model: model,
            timeout: Duration::from_secs(timeout_secs),
            cache: PromptCache::default(),
        }
    }

    fn messages_json(request: &ChatRequest) -> Vec<serde_json::Value> {
        let mut messages = vec![serde_json::json!({
            "role": "system",
            "content": request.system_prompt,
        })];
        for m in &request.messages {
            messages.push(serde_json::json!({
                "role": match m.role {
                    Role::User => "user",
                    Role::Assistant => "assistant",
                },
                "content": m.flattened_text(),
            }));
        }
        messages
    }

    async fn tools_payload(&self, tools: &[ToolSpec]) -> serde_json::Value {
        if let Some(cached) = self.cache.get(&self.default_model).await {
            return cached;
        }

        let payload = serde_json::Value::Array(
            tools
                .iter()
                .map(|tool| {
                    serde_json::json!({
                        "type": "function",
                        "function": {
                            "name": tool.name,
                            "description": tool.description,
                            "parameters": tool_parameters_schema(),
                        }
                    })
                })
                .collect(),
        );
        self.cache.store_detached(&self.default_model, payload.clone());
        payload
    }

    async fn build_body(&self, request: &ChatRequest, stream: bool) -> serde_json::Value {
        let mut body = serde_json::json!({
            "model": self.default_model,
            "messages": Self::messages_json(request),
            "stream": stream,
        });
        if stream {
            body["stream_options"] = serde_json::json!({"include_usage": true});
        }
        if let Some(tools) = &request.tools {
            if !tools.is_empty() {
                body["tools"] = self.tools_payload(tools).await;
            }
        }
        body
    }
}

#[async_trait]
impl ProviderAdapter for OpenAiAdapter {
    fn stream_chat(&self, request: ChatRequest) -> BoxStream<'static, ProviderResult<StreamEvent>> {
        use async_stream::stream;

        let adapter = self.clone();
        let url = format!("{}/chat/completions", self.base_url);

        Box::pin(stream! {
            let prompt_chars = request.prompt_chars();
            let body = adapter.build_body(&request, true).await;

            let response = adapter
                .client
                .post(&url)
                .header("Authorization", format!("Bearer {}", adapter.api_key))
                .header("Content-Type", "application/json")
                .json(&body)
                .timeout(adapter.timeout)
                .send()
                .await;

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
            let mut pending_calls: Vec<PendingCall> = Vec::new();
            let mut completion_chars = 0usize;
            let mut wire_usage: Option<TokenUsage> = None;
            let mut done = false;

            'outer: while let Some(chunk_result) = bytes.next().await {
                let chunk = match chunk_result {
                    Ok(bytes) => bytes,
                    Err(e) => {
                        yield Err(ProviderError::Http(e.to_string()));
                        return;
                    }
                };

                for payload in lines.push(&String::from_utf8_lossy(&chunk)) {
                    if payload == "[DONE]" {
                        done = true;
                        break 'outer;
                    }

                    let parsed: StreamChunk = match serde_json::from_str(&payload) {
                        Ok(parsed) => parsed,
                        Err(e) => {
                            yield Err(ProviderError::InvalidResponse(format!(
                                "Failed to parse stream: {e}"
                            )));
                            return;
                        }
                    };

                    if let Some(usage) = parsed.usage {
                        wire_usage = Some(TokenUsage::new(
                            usage.prompt_tokens,
                            usage.completion_tokens,
                        ));
                    }

                    for choice in parsed.choices {
                        if let Some(content) = choice.delta.content {
                            if !content.is_empty() {
                                completion_chars += content.chars().count();
                                yield Ok(StreamEvent::Text(content));
                            }
                        }
                        if let Some(reasoning) = choice.delta.reasoning_content {
                            if !reasoning.is_empty() {
                                yield Ok(StreamEvent::Reasoning(reasoning));
                            }
                        }
                        if let Some(deltas) = choice.delta.tool_calls {
                            for delta in deltas {
                                let index = delta.index as usize;
                                while pending_calls.len() <= index {
                                    pending_calls.push(PendingCall::default());
                                }
                                if let Some(func) = delta.function {
                                    if let Some(name) = func.name {
                                        pending_calls[index].name.push_str(&name);
                                    }
                                    if let Some(args) = func.arguments {
                                        pending_calls[index].arguments.push_str(&args);
                                    }
                                }
                            }
                        }
                    }
                }
            }

            if !done {
                tracing::debug!("OpenAI stream ended without [DONE] sentinel");
            }

            // Turn finished: render any accumulated native calls into the
            // shared grammar so the downstream scanner sees them as text.
            for call in pending_calls.drain(..) {
                if call.name.is_empty() {
                    continue;
                }
                let rendered = render_native_call(&call.name, &call.arguments);
                completion_chars += rendered.chars().count();
                yield Ok(StreamEvent::Text(rendered));
            }

            let usage = wire_usage.unwrap_or_else(|| {
                TokenUsage::estimate_from_chars(prompt_chars, completion_chars)
            });
            yield Ok(StreamEvent::Usage(usage));
        })
    }

    async fn complete_chat(&self, request: ChatRequest) -> ProviderResult<ChatOutput> {
        let prompt_chars = request.prompt_chars();
        let body = self.build_body(&request, false).await;
        let url = format!("{}/chat/completions", self.base_url);

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| ProviderError::Http(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(classify_status(status, &error_text));
        }

        let parsed: CompletionResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::InvalidResponse(format!("Failed to parse response: {e}")))?;

        let choice = parsed
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| ProviderError::InvalidResponse("No choices in response".to_string()))?;

        let mut text = choice.message.content.unwrap_or_default();
        if let Some(calls) = choice.message.tool_calls {
            for call in calls {
                if !text.is_empty() && !text.ends_with('\n') {
                    text.push('\n');
                }
                text.push_str(&render_native_call(
                    &call.function.name,
                    &call.function.arguments,
                ));
            }
        }

        let usage = parsed
            .usage
            .map(|u| TokenUsage::new(u.prompt_tokens, u.completion_tokens))
            .unwrap_or_else(|| {
                TokenUsage::estimate_from_chars(prompt_chars, text.chars().count())
            });

        Ok(ChatOutput { text, usage })
    }

    fn provider_name(&self) -> &str {
        "OpenAI"
    }

    fn default_model(&self) -> &str {
        &self.default_model
    }

    async fn health_check(&self) -> ProviderResult<bool> {
        let url = format!("{}/models", self.base_url);
        match self
            .client
            .get(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .send()
            .await
        {
            Ok(response) => Ok(response.status().is_success()),
            Err(_) => Ok(false),
        }
    }
}

/// Native tool call accumulated across stream deltas.
#[derive(Debug, Default)]
struct PendingCall {
    name: String,
    arguments: String,
}

// OpenAI wire types
#[derive(Debug, Deserialize)]
struct StreamChunk {
    #[serde(default)]
    choices: Vec<StreamChoice>,
    #[serde(default)]
    usage: Option<WireUsage>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    delta: WireDelta,
}

#[derive(Debug, Default, Deserialize)]
struct WireDelta {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    reasoning_content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<WireToolCallDelta>>,
}

#[derive(Debug, Deserialize)]
struct WireToolCallDelta {
    index: u32,
    #[serde(default)]
    function: Option<WireFunctionDelta>,
}

#[derive(Debug, Default, Deserialize)]
struct WireFunctionDelta {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    arguments: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    choices: Vec<CompletionChoice>,
    #[serde(default)]
    usage: Option<WireUsage>,
}

#[derive(Debug, Deserialize)]
struct CompletionChoice {
    message: CompletionMessage,
}

#[derive(Debug, Deserialize)]
struct CompletionMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<WireToolCall>>,
}

#[derive(Debug, Deserialize)]
struct WireToolCall {
    function: WireFunction,
}

#[derive(Debug, Deserialize)]
struct WireFunction {
    name: String,
    arguments: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn adapter_creation() {
        let adapter =
            OpenAiAdapter::new("sk-test-key".to_string(), None, "gpt-4o".to_string(), 60);

        assert_eq!(adapter.provider_name(), "OpenAI");
        assert_eq!(adapter.default_model(), "gpt-4o");
    }

    #[test]
    fn messages_json_prepends_system_prompt() {
        use tiller_core::types::Message;

        let request = ChatRequest::new(
            "You drive a browser.",
            vec![Message::user("go to example.com")],
        );
        let messages = OpenAiAdapter::messages_json(&request);

        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0]["role"], "system");
        assert_eq!(messages[1]["role"], "user");
        assert_eq!(messages[1]["content"], "go to example.com");
    }
}
