//! Session execution engine
//!
//! Everything needed to turn one natural-language task into a bounded
//! model/tool dialogue:
//!
//! - [`session::ExecutionSession`] — the state machine driving the loop
//! - [`scanner::ToolCallScanner`] — incremental tool-call detection
//! - [`context::SlidingWindowContext`] — budgeted conversation history
//! - [`approval`] — approval gates for sensitive tool calls
//! - [`cancel::CancelToken`] — cooperative cancellation
//! - [`reflection::Reflector`] — post-task memory extraction
//!
//! Collaborators (provider adapter, tool registry, approval gate, memory
//! store) are injected at construction; a session owns no globals, so
//! concurrent sessions are isolated except for an optionally shared
//! [`tiller_core::UsageMeter`].

pub mod approval;
pub mod cancel;
pub mod context;
pub mod error;
pub mod reflection;
pub mod scanner;
pub mod session;

pub use approval::{AutoApprove, PendingApprovals};
pub use cancel::CancelToken;
pub use context::SlidingWindowContext;
pub use error::{SessionError, SessionResult};
pub use reflection::Reflector;
pub use scanner::{ScanStep, ToolCallScanner};
pub use session::{
    ExecutionSession, NullObserver, SessionConfig, SessionObserver, SessionStatus,
};
