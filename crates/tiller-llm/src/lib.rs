//! Provider adapters for Tiller
//!
//! One [`tiller_core::ProviderAdapter`] implementation per model vendor,
//! each a pure translation layer between the shared conversation model and
//! that vendor's wire protocol:
//!
//! - [`providers::OpenAiAdapter`] — SSE `chat/completions` deltas
//! - [`providers::AnthropicAdapter`] — SSE `messages` event types
//! - [`providers::GeminiAdapter`] — SSE candidate/part trees
//! - [`providers::OllamaAdapter`] — NDJSON `api/chat` lines
//!
//! Native function-call representations are normalized into the shared
//! textual tool-call grammar before leaving the adapter, so the engine never
//! special-cases vendors.

pub mod cache;
pub mod config;
pub mod providers;
pub mod stream_buf;

pub use cache::PromptCache;
pub use config::{build_adapter, ProviderConfig, ProviderKind};
pub use providers::{AnthropicAdapter, GeminiAdapter, OllamaAdapter, OpenAiAdapter};
