//! Sliding-window conversation context
//!
//! Holds the message history for one session and keeps its estimated token
//! footprint under a budget by dropping the oldest user/assistant pair.
//! The most recent exchange is never dropped, so a trim pass either fits
//! the budget or bottoms out at the minimum retained window.

use tiller_core::types::Message;

/// Minimum number of messages always retained (one user/assistant exchange).
const MIN_RETAINED: usize = 2;

#[derive(Debug, Default)]
pub struct SlidingWindowContext {
    messages: Vec<Message>,
}

impl SlidingWindowContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_message(&mut self, message: Message) {
        self.messages.push(message);
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn message_count(&self) -> usize {
        self.messages.len()
    }

    /// Estimated token count across all messages.
    pub fn token_estimate(&self) -> usize {
        self.messages.iter().map(|m| m.token_estimate()).sum()
    }

    /// Drop oldest pairs until the estimate fits `budget` or only the
    /// minimum window remains. Idempotent; a lone trailing message is never
    /// dropped on its own.
    pub fn trim_to_budget(&mut self, budget: usize) {
        while self.token_estimate() > budget && self.messages.len() > MIN_RETAINED {
            let dropped: Vec<Message> = self.messages.drain(..2).collect();
            tracing::debug!(
                dropped = dropped.len(),
                remaining = self.messages.len(),
                "trimmed oldest exchange from context"
            );
        }
    }
}
