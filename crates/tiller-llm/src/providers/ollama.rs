//! Ollama chat adapter
//!
//! Talks to a local Ollama daemon over its NDJSON chat API. Each line of the
//! response body is a standalone JSON chunk; the final chunk carries
//! `done: true` together with the token counts.

use std::time::Duration;

use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::StreamExt;
use serde::Deserialize;
use tiller_core::types::{ChatOutput, ChatRequest, Role, StreamEvent, TokenUsage};
use tiller_core::{ProviderAdapter, ProviderError, ProviderResult};

use crate::providers::{classify_status, render_native_call, tool_parameters_schema};
use crate::stream_buf::NdjsonBuffer;

/// Ollama provider adapter
#[derive(Clone)]
pub struct OllamaAdapter {
    client: reqwest::Client,
    base_url: String,
    default_model: String,
    timeout: Duration,
}

impl OllamaAdapter {
    pub fn new(base_url: Option<String>, model: String, timeout_secs: u64) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.unwrap_or_else(|| "http://localhost:11434".to_string()),
            default_model: model,
            timeout: Duration::from_secs(timeout_secs),
        }
    }

    fn build_body(&self, request: &ChatRequest, stream: bool) -> serde_json::Value {
        let mut messages = vec![serde_json::json!({
            "role": "system",
            "content": request.system_prompt,
        })];
        messages.extend(request.messages.iter().map(|m| {
            serde_json::json!({
                "role": match m.role {
                    Role::User => "user",
                    Role::Assistant => "assistant",
                },
                "content": m.flattened_text(),
            })
        }));

        let mut body = serde_json::json!({
            "model": self.default_model,
            "messages": messages,
            "stream": stream,
        });

        if let Some(tools) = &request.tools {
            if !tools.is_empty() {
                let tool_defs: Vec<serde_json::Value> = tools
                    .iter()
                    .map(|tool| {
                        serde_json::json!({
                            "type": "function",
                            "function": {
                                "name": tool.name,
                                "description": tool.description,
                                "parameters": tool_parameters_schema(),
                            },
                        })
                    })
                    .collect();
                body["tools"] = serde_json::json!(tool_defs);
            }
        }

        body
    }

    fn chunk_events(chunk: &WireChunk, events: &mut Vec<StreamEvent>) -> usize {
        let mut completion_chars = 0usize;
        let Some(message) = &chunk.message else {
            return 0;
        };

        if let Some(thinking) = &message.thinking {
            if !thinking.is_empty() {
                events.push(StreamEvent::Reasoning(thinking.clone()));
            }
        }
        if !message.content.is_empty() {
            completion_chars += message.content.chars().count();
            events.push(StreamEvent::Text(message.content.clone()));
        }
        for call in &message.tool_calls {
            let rendered =
                render_native_call(&call.function.name, &call.function.arguments.to_string());
            completion_chars += rendered.chars().count();
            events.push(StreamEvent::Text(rendered));
        }

        completion_chars
    }
}

#[async_trait]
impl ProviderAdapter for OllamaAdapter {
    fn stream_chat(&self, request: ChatRequest) -> BoxStream<'static, ProviderResult<StreamEvent>> {
        use async_stream::stream;

        let adapter = self.clone();
        let url = format!("{}/api/chat", self.base_url);

        Box::pin(stream! {
            let prompt_chars = request.prompt_chars();
            let body = adapter.build_body(&request, true);

            let response = adapter
                .client
                .post(&url)
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
            let mut lines = NdjsonBuffer::new();
            let mut completion_chars = 0usize;
            let mut wire_usage: Option<TokenUsage> = None;

            'outer: while let Some(chunk_result) = bytes.next().await {
                let chunk = match chunk_result {
                    Ok(bytes) => bytes,
                    Err(e) => {
                        yield Err(ProviderError::Http(e.to_string()));
                        return;
                    }
                };

                for line in lines.push(&String::from_utf8_lossy(&chunk)) {
                    let parsed: WireChunk = match serde_json::from_str(&line) {
                        Ok(parsed) => parsed,
                        Err(e) => {
                            yield Err(ProviderError::InvalidResponse(format!(
                                "Failed to parse stream: {e}"
                            )));
                            return;
                        }
                    };

                    let mut events = Vec::new();
                    completion_chars += Self::chunk_events(&parsed, &mut events);
                    for event in events {
                        yield Ok(event);
                    }

                    if parsed.done {
                        if let (Some(prompt), Some(completion)) =
                            (parsed.prompt_eval_count, parsed.eval_count)
                        {
                            wire_usage = Some(TokenUsage::new(prompt, completion));
                        }
                        break 'outer;
                    }
                }
            }

            let usage = wire_usage.unwrap_or_else(|| {
                TokenUsage::estimate_from_chars(prompt_chars, completion_chars)
            });
            yield Ok(StreamEvent::Usage(usage));
        })
    }

    async fn complete_chat(&self, request: ChatRequest) -> ProviderResult<ChatOutput> {
        let prompt_chars = request.prompt_chars();
        let body = self.build_body(&request, false);
        let url = format!("{}/api/chat", self.base_url);

        let response = self
            .client
            .post(&url)
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

        let parsed: WireChunk = response
            .json()
            .await
            .map_err(|e| ProviderError::InvalidResponse(format!("Failed to parse response: {e}")))?;

        let wire_usage = match (parsed.prompt_eval_count, parsed.eval_count) {
            (Some(prompt), Some(completion)) => Some(TokenUsage::new(prompt, completion)),
            _ => None,
        };

        let mut events = Vec::new();
        Self::chunk_events(&parsed, &mut events);

        let mut text = String::new();
        for event in events {
            if let StreamEvent::Text(t) = event {
                if !text.is_empty() && !text.ends_with('\n') && t.starts_with("<tool>") {
                    text.push('\n');
                }
                text.push_str(&t);
            }
        }

        let usage = wire_usage.unwrap_or_else(|| {
            TokenUsage::estimate_from_chars(prompt_chars, text.chars().count())
        });

        Ok(ChatOutput { text, usage })
    }

    fn provider_name(&self) -> &str {
        "Ollama"
    }

    fn default_model(&self) -> &str {
        &self.default_model
    }

    async fn health_check(&self) -> ProviderResult<bool> {
        let url = format!("{}/api/tags", self.base_url);
        match self.client.get(&url).send().await {
            Ok(response) => Ok(response.status().is_success()),
            Err(_) => Ok(false),
        }
    }
}

// Ollama wire types
#[derive(Debug, Deserialize)]
struct WireChunk {
    #[serde(default)]
    message: Option<WireMessage>,
    #[serde(default)]
    done: bool,
    #[serde(default)]
    prompt_eval_count: Option<u32>,
    #[serde(default)]
    eval_count: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct WireMessage {
    #[serde(default)]
    content: String,
    #[serde(default)]
    thinking: Option<String>,
    #[serde(default)]
    tool_calls: Vec<WireToolCall>,
}

#[derive(Debug, Deserialize)]
struct WireToolCall {
    function: WireFunction,
}

#[derive(Debug, Deserialize)]
struct WireFunction {
    name: String,
    #[serde(default)]
    arguments: serde_json::Value,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn adapter_creation_defaults_to_localhost() {
        let adapter = OllamaAdapter::new(None, "qwen3:8b".to_string(), 120);

        assert_eq!(adapter.provider_name(), "Ollama");
        assert_eq!(adapter.base_url, "http://localhost:11434");
    }

    #[test]
    fn chunk_events_maps_content_thinking_and_calls() {
        let chunk: WireChunk = serde_json::from_str(
            r##"{"message":{
                "content":"hello",
                "thinking":"hmm",
                "tool_calls":[{"function":{"name":"click","arguments":{"input":"#submit"}}}]
            },"done":false}"##,
        )
        .unwrap();

        let mut events = Vec::new();
        let chars = OllamaAdapter::chunk_events(&chunk, &mut events);

        assert!(chars > "hello".len());
        assert_eq!(events[0], StreamEvent::Reasoning("hmm".to_string()));
        assert_eq!(events[1], StreamEvent::Text("hello".to_string()));
        let StreamEvent::Text(rendered) = &events[2] else {
            panic!("expected rendered tool call");
        };
        assert!(rendered.starts_with("<tool>click</tool>"));
        assert!(rendered.contains("<input>#submit</input>"));
    }

    #[test]
    fn done_chunk_carries_counts() {
        let chunk: WireChunk =
            serde_json::from_str(r#"{"done":true,"prompt_eval_count":12,"eval_count":7}"#).unwrap();

        assert!(chunk.done);
        assert_eq!(chunk.prompt_eval_count, Some(12));
        assert_eq!(chunk.eval_count, Some(7));
    }
}
