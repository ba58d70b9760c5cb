//! Trait definitions consumed across the workspace

pub mod approval;
pub mod memory;
pub mod provider;
pub mod tools;

pub use approval::{ApprovalGate, ApprovalRequest};
pub use memory::{MemoryStore, TaskMemory};
pub use provider::ProviderAdapter;
