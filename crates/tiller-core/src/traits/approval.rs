//! Approval gate trait for pluggable sensitive-action decisions

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A pending user decision, owned by the gate and correlated by generated id.
/// The execution session never holds a reference to this record, only the
/// boolean decision returned from [`ApprovalGate::request_approval`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalRequest {
    pub id: String,
    pub tool_name: String,
    pub input: String,
    pub reason: String,
    pub resolved: bool,
    pub approved: bool,
}

impl ApprovalRequest {
    pub fn new(
        tool_name: impl Into<String>,
        input: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            tool_name: tool_name.into(),
            input: input.into(),
            reason: reason.into(),
            resolved: false,
            approved: false,
        }
    }
}

/// A pluggable approval decision gate.
///
/// Implementations surface the request to a human and resolve it exactly
/// once. The session suspends with no timeout: an unanswered request is a
/// deliberate indefinite pause, not an error.
#[async_trait]
pub trait ApprovalGate: Send + Sync {
    /// Request approval for a sensitive tool invocation. Returns the user's
    /// decision.
    async fn request_approval(&self, tool_name: &str, input: &str, reason: &str) -> bool;
}
