//! Core abstractions for Tiller's dependency-inversion architecture
//!
//! This crate defines the shared types and traits the rest of the workspace
//! builds against:
//! - Core defines traits (abstractions)
//! - Implementations (vendor adapters, tool registries, approval gates)
//!   depend on core for trait definitions
//! - The execution engine orchestrates through trait interfaces, never
//!   through concrete implementations
//!
//! ## Architecture Pattern
//!
//! ```text
//! ┌──────────────────┐
//! │ ExecutionSession │  ← orchestrator (tiller-agents)
//! │     (uses)       │
//! │  - ProviderAdapter
//! │  - ToolRegistry  │
//! │  - ApprovalGate  │
//! │  - MemoryStore   │
//! └────────┬─────────┘
//!          │ trait bounds
//!          ▼
//! ┌──────────────────┐
//! │ Implementations  │  ← depend on core for trait definitions
//! │  - OpenAI/Anthropic/Gemini/Ollama adapters (tiller-llm)
//! │  - Browser tool registry (tiller-tools)
//! └──────────────────┘
//! ```

pub mod traits;
pub mod types;
pub mod usage;

pub use traits::approval::{ApprovalGate, ApprovalRequest};
pub use traits::memory::{MemoryError, MemoryResult, MemoryStore, TaskMemory};
pub use traits::provider::{EventStream, ProviderAdapter, ProviderError, ProviderResult};
pub use traits::tools::{ToolError, ToolResult, ToolSummary};
pub use types::{
    ChatOutput, ChatRequest, ContentBlock, Message, MessageContent, Role, StreamEvent, TokenUsage,
    ToolInvocation, ToolSpec, APPROX_CHARS_PER_TOKEN,
};
pub use usage::UsageMeter;
