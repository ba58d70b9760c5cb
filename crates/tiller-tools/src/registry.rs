//! Name → capability registry consumed by the execution session

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use tiller_core::traits::tools::{ToolError, ToolResult, ToolSummary};
use tiller_core::types::ToolSpec;

/// A named, callable browser-automation capability with a
/// string-in/string-out contract.
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    /// Run the tool. Internal failures map to
    /// [`ToolError::ExecutionFailed`].
    async fn invoke(&self, input: &str) -> ToolResult<String>;
}

/// Fixed mapping from tool name to capability.
///
/// Registration happens once at construction; the map never changes while a
/// session runs. `BTreeMap` keeps `list()` output in a stable order for
/// prompts and corrective messages.
#[derive(Default)]
pub struct ToolRegistry {
    tools: BTreeMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        self.tools.insert(tool.name().to_string(), tool);
    }

    pub fn with_tool(mut self, tool: Arc<dyn Tool>) -> Self {
        self.register(tool);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Tool metadata for discovery and prompt construction.
    pub fn list(&self) -> Vec<ToolSummary> {
        self.tools
            .values()
            .map(|t| ToolSummary {
                name: t.name().to_string(),
                description: t.description().to_string(),
            })
            .collect()
    }

    /// The same listing in the shape adapters advertise to the model.
    pub fn specs(&self) -> Vec<ToolSpec> {
        self.tools
            .values()
            .map(|t| ToolSpec {
                name: t.name().to_string(),
                description: t.description().to_string(),
            })
            .collect()
    }

    pub fn names(&self) -> Vec<String> {
        self.tools.keys().cloned().collect()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    /// Execute a tool by name.
    pub async fn invoke(&self, name: &str, input: &str) -> ToolResult<String> {
        let tool = self
            .tools
            .get(name)
            .ok_or_else(|| ToolError::NotFound(name.to_string()))?;

        tracing::debug!(tool = name, input_len = input.len(), "Invoking tool");
        tool.invoke(input).await
    }
}
