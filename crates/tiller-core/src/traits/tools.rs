//! Tool execution error taxonomy and registry surface types
//!
//! Concrete browser tools live outside this workspace; the engine only sees
//! the registry collaborator interface defined in `tiller-tools`.

use serde::{Deserialize, Serialize};

/// Result type for tool operations
pub type ToolResult<T> = Result<T, ToolError>;

/// Tool execution errors
#[derive(Debug, Clone, Serialize, Deserialize, thiserror::Error)]
pub enum ToolError {
    /// The invoked name is absent from the registry. Recovered locally by
    /// the session with a corrective turn, never fatal.
    #[error("Tool not found: {0}")]
    NotFound(String),

    /// The tool's own internal failure. Recorded as error-shaped result
    /// text so the model can self-correct.
    #[error("Tool execution failed: {0}")]
    ExecutionFailed(String),
}

/// Registry listing entry: `list() -> [{name, description}]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolSummary {
    pub name: String,
    pub description: String,
}
