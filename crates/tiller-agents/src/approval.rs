//! Approval gate implementations
//!
//! A session suspends indefinitely on [`ApprovalGate::request_approval`]
//! for any invocation flagged sensitive. [`PendingApprovals`] is the
//! front-end facing half: it parks each request under a generated id and
//! resolves it exactly once when the human decides.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tiller_core::{ApprovalGate, ApprovalRequest};
use tokio::sync::{oneshot, Mutex};

/// Gate that approves everything. Used in tests and headless runs.
#[derive(Debug, Default, Clone)]
pub struct AutoApprove;

#[async_trait]
impl ApprovalGate for AutoApprove {
    async fn request_approval(&self, _tool_name: &str, _input: &str, _reason: &str) -> bool {
        true
    }
}

struct PendingEntry {
    request: ApprovalRequest,
    decide: oneshot::Sender<bool>,
}

/// Shared ledger of unresolved approval requests.
///
/// The session side blocks on [`request_approval`](ApprovalGate); a UI or
/// driver polls [`pending`](PendingApprovals::pending) and calls
/// [`resolve`](PendingApprovals::resolve) with the user's decision. Each id
/// resolves at most once; resolving an unknown id is a no-op returning
/// `false`.
#[derive(Clone, Default)]
pub struct PendingApprovals {
    entries: Arc<Mutex<HashMap<String, PendingEntry>>>,
}

impl PendingApprovals {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of requests still awaiting a decision.
    pub async fn pending(&self) -> Vec<ApprovalRequest> {
        let entries = self.entries.lock().await;
        entries.values().map(|e| e.request.clone()).collect()
    }

    /// Resolve a request by id. Returns `true` if the id was pending.
    pub async fn resolve(&self, id: &str, approved: bool) -> bool {
        let entry = {
            let mut entries = self.entries.lock().await;
            entries.remove(id)
        };
        match entry {
            Some(entry) => {
                tracing::info!(id, approved, tool = %entry.request.tool_name, "approval resolved");
                // Receiver may have been dropped by a cancelled session.
                let _ = entry.decide.send(approved);
                true
            }
            None => false,
        }
    }
}

#[async_trait]
impl ApprovalGate for PendingApprovals {
    async fn request_approval(&self, tool_name: &str, input: &str, reason: &str) -> bool {
        let request = ApprovalRequest::new(tool_name, input, reason);
        let id = request.id.clone();
        let (tx, rx) = oneshot::channel();

        {
            let mut entries = self.entries.lock().await;
            entries.insert(
                id.clone(),
                PendingEntry {
                    request,
                    decide: tx,
                },
            );
        }
        tracing::info!(%id, tool = tool_name,  "approval requested");

        // No timeout: this is a deliberate indefinite pause. A dropped
        // sender (ledger torn down) counts as denial.
        rx.await.unwrap_or(false)
    }
}
