//! Tool registry: a fixed mapping from tool name to an executable capability
//!
//! Concrete browser tools (navigate, click, type, screenshot, ...) are
//! provided by the host at construction time; the engine only depends on the
//! string-in/string-out contract here.

pub mod registry;

pub use registry::{Tool, ToolRegistry};
