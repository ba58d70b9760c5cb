//! End-to-end streaming tests against mock HTTP servers
//!
//! Each test stands up a wiremock server that replays a canned vendor
//! response and asserts on the normalized event sequence the adapter emits.

use futures_util::StreamExt;
use tiller_core::types::{ChatRequest, Message, StreamEvent};
use tiller_core::{ProviderAdapter, ProviderError};
use tiller_llm::{AnthropicAdapter, GeminiAdapter, OllamaAdapter, OpenAiAdapter};
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn simple_request() -> ChatRequest {
    ChatRequest::new(
        "You are a helpful assistant.".to_string(),
        vec![Message::user("hello")],
    )
}

async fn collect_events(
    adapter: &dyn ProviderAdapter,
    request: ChatRequest,
) -> Vec<Result<StreamEvent, ProviderError>> {
    adapter.stream_chat(request).collect().await
}

#[tokio::test]
async fn ollama_ndjson_stream_is_normalized() {
    let server = MockServer::start().await;

    let body = concat!(
        r#"{"message":{"content":"Hel"},"done":false}"#,
        "\n",
        r#"{"message":{"content":"lo!","thinking":"let me think"},"done":false}"#,
        "\n",
        r#"{"message":{"content":""},"done":true,"prompt_eval_count":11,"eval_count":4}"#,
        "\n",
    );

    Mock::given(method("POST"))
        .and(path("/api/chat"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(body, "application/x-ndjson"))
        .mount(&server)
        .await;

    let adapter = OllamaAdapter::new(Some(server.uri()), "qwen3:8b".to_string(), 30);
    let events = collect_events(&adapter, simple_request()).await;

    let events: Vec<StreamEvent> = events.into_iter().map(|e| e.unwrap()).collect();
    assert_eq!(events[0], StreamEvent::Text("Hel".to_string()));
    assert_eq!(events[1], StreamEvent::Reasoning("let me think".to_string()));
    assert_eq!(events[2], StreamEvent::Text("lo!".to_string()));

    let StreamEvent::Usage(usage) = events.last().unwrap() else {
        panic!("stream must end with a usage event");
    };
    assert_eq!(usage.prompt_tokens, 11);
    assert_eq!(usage.completion_tokens, 4);
    assert_eq!(usage.total_tokens, 15);
}

#[tokio::test]
async fn ollama_native_tool_call_becomes_grammar_text() {
    let server = MockServer::start().await;

    let body = concat!(
        r#"{"message":{"content":"","tool_calls":[{"function":{"name":"navigate","arguments":{"input":"https://example.com","requires_approval":true}}}]},"done":false}"#,
        "\n",
        r#"{"message":{"content":""},"done":true,"prompt_eval_count":8,"eval_count":20}"#,
        "\n",
    );

    Mock::given(method("POST"))
        .and(path("/api/chat"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(body, "application/x-ndjson"))
        .mount(&server)
        .await;

    let adapter = OllamaAdapter::new(Some(server.uri()), "qwen3:8b".to_string(), 30);
    let events = collect_events(&adapter, simple_request()).await;

    let StreamEvent::Text(rendered) = events[0].as_ref().unwrap() else {
        panic!("expected a text event carrying the rendered call");
    };
    assert_eq!(
        rendered,
        "<tool>navigate</tool>\n<input>https://example.com</input>\n<requires_approval>true</requires_approval>"
    );
}

#[tokio::test]
async fn openai_sse_stream_is_normalized() {
    let server = MockServer::start().await;

    let body = concat!(
        "data: {\"choices\":[{\"delta\":{\"content\":\"Hi \"}}]}\n\n",
        "data: {\"choices\":[{\"delta\":{\"reasoning_content\":\"pondering\"}}]}\n\n",
        "data: {\"choices\":[{\"delta\":{\"content\":\"there\"}}]}\n\n",
        "data: {\"choices\":[],\"usage\":{\"prompt_tokens\":9,\"completion_tokens\":3}}\n\n",
        "data: [DONE]\n\n",
    );

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(body, "text/event-stream"))
        .mount(&server)
        .await;

    let adapter = OpenAiAdapter::new(
        "sk-test".to_string(),
        Some(server.uri()),
        "gpt-4o".to_string(),
        30,
    );
    let events = collect_events(&adapter, simple_request()).await;

    let events: Vec<StreamEvent> = events.into_iter().map(|e| e.unwrap()).collect();
    assert_eq!(events[0], StreamEvent::Text("Hi ".to_string()));
    assert_eq!(events[1], StreamEvent::Reasoning("pondering".to_string()));
    assert_eq!(events[2], StreamEvent::Text("there".to_string()));

    let StreamEvent::Usage(usage) = events.last().unwrap() else {
        panic!("stream must end with a usage event");
    };
    assert_eq!(usage.prompt_tokens, 9);
    assert_eq!(usage.completion_tokens, 3);
}

#[tokio::test]
async fn openai_stream_without_usage_falls_back_to_estimate() {
    let server = MockServer::start().await;

    let body = concat!(
        "data: {\"choices\":[{\"delta\":{\"content\":\"1234\"}}]}\n\n",
        "data: [DONE]\n\n",
    );

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(body, "text/event-stream"))
        .mount(&server)
        .await;

    let adapter = OpenAiAdapter::new(
        "sk-test".to_string(),
        Some(server.uri()),
        "gpt-4o".to_string(),
        30,
    );
    let events = collect_events(&adapter, simple_request()).await;

    let StreamEvent::Usage(usage) = events.last().unwrap().as_ref().unwrap() else {
        panic!("stream must end with a usage event");
    };
    // 4 completion chars / 4 chars per token
    assert_eq!(usage.completion_tokens, 1);
    assert!(usage.prompt_tokens > 0);
}

#[tokio::test]
async fn openai_fragmented_tool_call_deltas_are_assembled() {
    let server = MockServer::start().await;

    let body = concat!(
        "data: {\"choices\":[{\"delta\":{\"tool_calls\":[{\"index\":0,\"function\":{\"name\":\"click\",\"arguments\":\"{\\\"inp\"}}]}}]}\n\n",
        "data: {\"choices\":[{\"delta\":{\"tool_calls\":[{\"index\":0,\"function\":{\"arguments\":\"ut\\\": \\\"#go\\\"}\"}}]}}]}\n\n",
        "data: [DONE]\n\n",
    );

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(body, "text/event-stream"))
        .mount(&server)
        .await;

    let adapter = OpenAiAdapter::new(
        "sk-test".to_string(),
        Some(server.uri()),
        "gpt-4o".to_string(),
        30,
    );
    let events = collect_events(&adapter, simple_request()).await;

    let texts: Vec<&StreamEvent> = events
        .iter()
        .map(|e| e.as_ref().unwrap())
        .filter(|e| matches!(e, StreamEvent::Text(_)))
        .collect();
    assert_eq!(texts.len(), 1);
    let StreamEvent::Text(rendered) = texts[0] else {
        unreachable!()
    };
    assert!(rendered.starts_with("<tool>click</tool>"));
    assert!(rendered.contains("<input>#go</input>"));
    assert!(rendered.ends_with("<requires_approval>false</requires_approval>"));
}

#[tokio::test]
async fn anthropic_typed_events_are_normalized() {
    let server = MockServer::start().await;

    let body = concat!(
        "data: {\"type\":\"message_start\",\"message\":{\"usage\":{\"input_tokens\":14}}}\n\n",
        "data: {\"type\":\"content_block_start\",\"index\":0,\"content_block\":{\"type\":\"text\",\"text\":\"\"}}\n\n",
        "data: {\"type\":\"content_block_delta\",\"index\":0,\"delta\":{\"type\":\"thinking_delta\",\"thinking\":\"hmm\"}}\n\n",
        "data: {\"type\":\"content_block_delta\",\"index\":0,\"delta\":{\"type\":\"text_delta\",\"text\":\"Sure.\"}}\n\n",
        "data: {\"type\":\"content_block_stop\",\"index\":0}\n\n",
        "data: {\"type\":\"message_delta\",\"delta\":{},\"usage\":{\"output_tokens\":2}}\n\n",
        "data: {\"type\":\"message_stop\"}\n\n",
    );

    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(body, "text/event-stream"))
        .mount(&server)
        .await;

    let adapter = AnthropicAdapter::new(
        "sk-ant-test".to_string(),
        Some(server.uri()),
        "claude-sonnet-4-5".to_string(),
        30,
    );
    let events = collect_events(&adapter, simple_request()).await;

    let events: Vec<StreamEvent> = events.into_iter().map(|e| e.unwrap()).collect();
    assert_eq!(events[0], StreamEvent::Reasoning("hmm".to_string()));
    assert_eq!(events[1], StreamEvent::Text("Sure.".to_string()));

    let StreamEvent::Usage(usage) = events.last().unwrap() else {
        panic!("stream must end with a usage event");
    };
    assert_eq!(usage.prompt_tokens, 14);
    assert_eq!(usage.completion_tokens, 2);
}

#[tokio::test]
async fn gemini_candidate_trees_are_normalized() {
    let server = MockServer::start().await;

    let body = concat!(
        "data: {\"candidates\":[{\"content\":{\"parts\":[{\"text\":\"weighing options\",\"thought\":true}],\"role\":\"model\"}}]}\n\n",
        "data: {\"candidates\":[{\"content\":{\"parts\":[{\"text\":\"Opening the page. \"}],\"role\":\"model\"}}]}\n\n",
        "data: {\"candidates\":[{\"content\":{\"parts\":[{\"functionCall\":{\"name\":\"navigate\",\"args\":{\"input\":\"https://example.com\"}}}],\"role\":\"model\"}}],\"usageMetadata\":{\"promptTokenCount\":17,\"candidatesTokenCount\":6}}\n\n",
    );

    Mock::given(method("POST"))
        .and(path("/v1beta/models/gemini-2.0-flash:streamGenerateContent"))
        .and(query_param("alt", "sse"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(body, "text/event-stream"))
        .mount(&server)
        .await;

    let adapter = GeminiAdapter::new(
        "test-key".to_string(),
        Some(server.uri()),
        "gemini-2.0-flash".to_string(),
        30,
    );
    let events = collect_events(&adapter, simple_request()).await;

    let events: Vec<StreamEvent> = events.into_iter().map(|e| e.unwrap()).collect();
    assert_eq!(
        events[0],
        StreamEvent::Reasoning("weighing options".to_string())
    );
    assert_eq!(events[1], StreamEvent::Text("Opening the page. ".to_string()));

    let StreamEvent::Text(rendered) = &events[2] else {
        panic!("expected a text event carrying the rendered call");
    };
    assert_eq!(
        rendered,
        "<tool>navigate</tool>\n<input>https://example.com</input>\n<requires_approval>false</requires_approval>"
    );

    let StreamEvent::Usage(usage) = events.last().unwrap() else {
        panic!("stream must end with a usage event");
    };
    assert_eq!(usage.prompt_tokens, 17);
    assert_eq!(usage.completion_tokens, 6);
    assert_eq!(usage.total_tokens, 23);
}

#[tokio::test]
async fn unauthorized_response_surfaces_auth_error() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(401).set_body_string("invalid api key"))
        .mount(&server)
        .await;

    let adapter = OpenAiAdapter::new(
        "sk-bad".to_string(),
        Some(server.uri()),
        "gpt-4o".to_string(),
        30,
    );
    let events = collect_events(&adapter, simple_request()).await;

    assert_eq!(events.len(), 1);
    assert!(matches!(events[0], Err(ProviderError::Auth(_))));
}

#[tokio::test]
async fn rate_limit_response_surfaces_rate_limited_error() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .respond_with(ResponseTemplate::new(429).set_body_string("slow down"))
        .mount(&server)
        .await;

    let adapter = AnthropicAdapter::new(
        "sk-ant-test".to_string(),
        Some(server.uri()),
        "claude-sonnet-4-5".to_string(),
        30,
    );
    let events = collect_events(&adapter, simple_request()).await;

    assert_eq!(events.len(), 1);
    assert!(matches!(events[0], Err(ProviderError::RateLimited(_))));
}

#[tokio::test]
async fn non_streaming_completion_appends_rendered_calls() {
    let server = MockServer::start().await;

    let body = serde_json::json!({
        "choices": [{
            "message": {
                "content": "On it.",
                "tool_calls": [{
                    "function": {
                        "name": "read_page",
                        "arguments": "{\"input\": \"\"}"
                    }
                }]
            }
        }],
        "usage": {"prompt_tokens": 21, "completion_tokens": 6}
    });

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(&body))
        .mount(&server)
        .await;

    let adapter = OpenAiAdapter::new(
        "sk-test".to_string(),
        Some(server.uri()),
        "gpt-4o".to_string(),
        30,
    );
    let output = adapter.complete_chat(simple_request()).await.unwrap();

    assert!(output.text.starts_with("On it."));
    assert!(output.text.contains("<tool>read_page</tool>"));
    assert_eq!(output.usage.prompt_tokens, 21);
    assert_eq!(output.usage.completion_tokens, 6);
}
