//! Provider adapter abstraction
//!
//! A provider adapter is a pure translation layer between the shared
//! conversation model and one vendor's wire protocol. Adapters carry no
//! session state beyond an optional per-model response cache.

use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};

use crate::types::{ChatOutput, ChatRequest, StreamEvent};

/// Result type for provider operations
pub type ProviderResult<T> = Result<T, ProviderError>;

/// Transport and vendor-protocol errors.
///
/// During the streaming path, the first `ProviderError` triggers exactly one
/// fallback to the non-streaming call shape; adapters must surface errors,
/// never swallow them.
#[derive(Debug, Clone, Serialize, Deserialize, thiserror::Error)]
pub enum ProviderError {
    #[error("HTTP error: {0}")]
    Http(String),

    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("Rate limited: {0}")]
    RateLimited(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

/// A finite, non-restartable sequence of normalized stream events.
pub type EventStream = BoxStream<'static, ProviderResult<StreamEvent>>;

/// Polymorphic capability: produce a token stream from
/// (system prompt, conversation, tool specs).
///
/// Each adapter maps the shared [`crate::types::Message`] shape to its
/// vendor's wire shape and maps native function/tool-call representations
/// into the shared textual tool-call grammar, so downstream components never
/// special-case vendors. Every call emits a `Usage` event at least once,
/// estimated from character length when the vendor does not report counts.
#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    /// Streaming call shape.
    fn stream_chat(&self, request: ChatRequest) -> EventStream;

    /// Non-streaming call shape. The execution session uses this for its
    /// one-time fallback after a streaming failure.
    async fn complete_chat(&self, request: ChatRequest) -> ProviderResult<ChatOutput>;

    fn provider_name(&self) -> &str;

    fn default_model(&self) -> &str;

    /// Cheap reachability probe against the vendor's list endpoint.
    async fn health_check(&self) -> ProviderResult<bool>;
}
