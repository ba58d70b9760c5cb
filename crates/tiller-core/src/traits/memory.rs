//! Long-term memory collaborator interface
//!
//! The engine only ever calls `store` and `query_by_domain`; persistence
//! details belong to the host.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Result type for memory operations
pub type MemoryResult<T> = Result<T, MemoryError>;

#[derive(Debug, Clone, Serialize, Deserialize, thiserror::Error)]
pub enum MemoryError {
    #[error("Storage error: {0}")]
    Storage(String),
}

/// One reflection record: what worked for a task on a given site.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskMemory {
    /// Site domain the task ran against, e.g. "github.com".
    pub domain: String,
    pub task_description: String,
    /// Ordered tool names that completed the task.
    pub tool_sequence: Vec<String>,
    #[serde(default = "Utc::now")]
    pub recorded_at: DateTime<Utc>,
}

#[async_trait]
pub trait MemoryStore: Send + Sync {
    async fn store(&self, record: TaskMemory) -> MemoryResult<()>;

    async fn query_by_domain(&self, domain: &str) -> MemoryResult<Vec<TaskMemory>>;
}
