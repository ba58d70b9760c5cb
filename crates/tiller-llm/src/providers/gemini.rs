//! Gemini chat adapter
//!
//! Gemini streams whole `GenerateContentResponse` objects over SSE, each a
//! candidate/part tree rather than a flat delta. The adapter walks
//! `candidates[0].content.parts`, mapping text parts to [`StreamEvent::Text`]
//! (or `Reasoning` for thought parts) and `functionCall` parts through the
//! shared grammar renderer.

use std::time::Duration;

use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::StreamExt;
use serde::Deserialize;
use tiller_core::types::{ChatOutput, ChatRequest, Role, StreamEvent, TokenUsage};
use tiller_core::{ProviderAdapter, ProviderError, ProviderResult};

use crate::providers::{classify_status, render_native_call, tool_parameters_schema};
use crate::stream_buf::SseLineBuffer;

/// Gemini provider adapter
#[derive(Clone)]
pub struct GeminiAdapter {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    default_model: String,
    timeout: Duration,
}

impl GeminiAdapter {
    pub fn new(
        api_key: String,
        base_url: Option<String>,
        model: String,
        timeout_secs: u64,
    ) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key,
            base_url: base_url
                .unwrap_or_else(|| "https://generativelanguage.googleapis.com".to_string()),
            default_model: model,
            timeout: Duration::from_secs(timeout_secs),
        }
    }

    fn build_body(&self, request: &ChatRequest) -> serde_json::Value {
        let contents: Vec<serde_json::Value> = request
            .messages
            .iter()
            .map(|m| {
                serde_json::json!({
                    "role": match m.role {
                        Role::User => "user",
                        Role::Assistant => "model",
                    },
                    "parts": [{"text": m.flattened_text()}],
                })
            })
            .collect();

        let mut body = serde_json::json!({
            "system_instruction": {"parts": [{"text": request.system_prompt}]},
            "contents": contents,
        });

        if let Some(tools) = &request.tools {
            if !tools.is_empty() {
                let declarations: Vec<serde_json::Value> = tools
                    .iter()
                    .map(|tool| {
                        serde_json::json!({
                            "name": tool.name,
                            "description": tool.description,
                            "parameters": tool_parameters_schema(),
                        })
                    })
                    .collect();
                body["tools"] = serde_json::json!([{"function_declarations": declarations}]);
            }
        }

        body
    }

    /// Map one response tree into normalized events, returning the number of
    /// completion characters produced.
    fn walk_parts(response: WireResponse, events: &mut Vec<StreamEvent>) -> usize {
        let mut completion_chars = 0usize;

        for candidate in response.candidates {
            let Some(content) = candidate.content else {
                continue;
            };
            for part in content.parts {
                if let Some(text) = part.text {
                    if part.thought {
                        events.push(StreamEvent::Reasoning(text));
                    } else {
                        completion_chars += text.chars().count();
                        events.push(StreamEvent::Text(text));
                    }
                }
                if let Some(call) = part.function_call {
                    let rendered = render_native_call(&call.name, &call.args.to_string());
                    completion_chars += rendered.chars().count();
                    events.push(StreamEvent::Text(rendered));
                }
            }
        }

        completion_chars
    }
}

#[async_trait]
impl ProviderAdapter for GeminiAdapter {
    fn stream_chat(&self, request: ChatRequest) -> BoxStream<'static, ProviderResult<StreamEvent>> {
        use async_stream::stream;

        let adapter = self.clone();
        let url = format!(
            "{}/v1beta/models/{}:streamGenerateContent?alt=sse",
            self.base_url, self.default_model
        );

        Box::pin(stream! {
            let prompt_chars = request.prompt_chars();
            let body = adapter.build_body(&request);

            let response = adapter
                .client
                .post(&url)
                .header("x-goog-api-key", &adapter.api_key)
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
            let mut completion_chars = 0usize;
            let mut wire_usage: Option<TokenUsage> = None;

            while let Some(chunk_result) = bytes.next().await {
                let chunk = match chunk_result {
                    Ok(bytes) => bytes,
                    Err(e) => {
                        yield Err(ProviderError::Http(e.to_string()));
                        return;
                    }
                };

                for payload in lines.push(&String::from_utf8_lossy(&chunk)) {
                    let parsed: WireResponse = match serde_json::from_str(&payload) {
                        Ok(parsed) => parsed,
                        Err(e) => {
                            yield Err(ProviderError::InvalidResponse(format!(
                                "Failed to parse stream: {e}"
                            )));
                            return;
                        }
                    };

                    if let Some(metadata) = &parsed.usage_metadata {
                        wire_usage = Some(TokenUsage::new(
                            metadata.prompt_token_count,
                            metadata.candidates_token_count,
                        ));
                    }

                    let mut events = Vec::new();
                    completion_chars += Self::walk_parts(parsed, &mut events);
                    for event in events {
                        yield Ok(event);
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
        let body = self.build_body(&request);
        let url = format!(
            "{}/v1beta/models/{}:generateContent",
            self.base_url, self.default_model
        );

        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
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

        let parsed: WireResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::InvalidResponse(format!("Failed to parse response: {e}")))?;

        let wire_usage = parsed.usage_metadata.as_ref().map(|m| {
            TokenUsage::new(m.prompt_token_count, m.candidates_token_count)
        });

        let mut events = Vec::new();
        Self::walk_parts(parsed, &mut events);

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
        "Gemini"
    }

    fn default_model(&self) -> &str {
        &self.default_model
    }

    async fn health_check(&self) -> ProviderResult<bool> {
        let url = format!("{}/v1beta/models", self.base_url);
        match self
            .client
            .get(&url)
            .header("x-goog-api-key", &self.api_key)
            .send()
            .await
        {
            Ok(response) => Ok(response.status().is_success()),
            Err(_) => Ok(false),
        }
    }
}

// Gemini wire types
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireResponse {
    #[serde(default)]
    candidates: Vec<WireCandidate>,
    #[serde(default)]
    usage_metadata: Option<WireUsageMetadata>,
}

#[derive(Debug, Deserialize)]
struct WireCandidate {
    #[serde(default)]
    content: Option<WireContent>,
}

#[derive(Debug, Deserialize)]
struct WireContent {
    #[serde(default)]
    parts: Vec<WirePart>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WirePart {
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    thought: bool,
    #[serde(default)]
    function_call: Option<WireFunctionCall>,
}

#[derive(Debug, Deserialize)]
struct WireFunctionCall {
    name: String,
    #[serde(default)]
    args: serde_json::Value,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireUsageMetadata {
    #[serde(default)]
    prompt_token_count: u32,
    #[serde(default)]
    candidates_token_count: u32,
}
