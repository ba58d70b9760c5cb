//! Process-wide token usage accumulator
//!
//! Sessions are otherwise fully isolated; this counter is the only shared
//! state between them, so it is updated with atomic adds rather than
//! read-modify-write.

use std::sync::atomic::{AtomicU64, Ordering};

use crate::types::TokenUsage;

/// Atomic prompt/completion token counters shared across sessions.
#[derive(Debug, Default)]
pub struct UsageMeter {
    prompt_tokens: AtomicU64,
    completion_tokens: AtomicU64,
}

impl UsageMeter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, usage: &TokenUsage) {
        self.prompt_tokens
            .fetch_add(u64::from(usage.prompt_tokens), Ordering::Relaxed);
        self.completion_tokens
            .fetch_add(u64::from(usage.completion_tokens), Ordering::Relaxed);
    }

    pub fn prompt_tokens(&self) -> u64 {
        self.prompt_tokens.load(Ordering::Relaxed)
    }

    pub fn completion_tokens(&self) -> u64 {
        self.completion_tokens.load(Ordering::Relaxed)
    }

    pub fn total_tokens(&self) -> u64 {
        self.prompt_tokens() + self.completion_tokens()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn records_accumulate() {
        let meter = UsageMeter::new();
        meter.record(&TokenUsage::new(100, 20));
        meter.record(&TokenUsage::new(50, 5));

        assert_eq!(meter.prompt_tokens(), 150);
        assert_eq!(meter.completion_tokens(), 25);
        assert_eq!(meter.total_tokens(), 175);
    }

    #[tokio::test]
    async fn concurrent_records_do_not_lose_updates() {
        let meter = Arc::new(UsageMeter::new());
        let mut handles = Vec::new();

        for _ in 0..8 {
            let meter = Arc::clone(&meter);
            handles.push(tokio::spawn(async move {
                for _ in 0..100 {
                    meter.record(&TokenUsage::new(1, 1));
                }
            }));
        }

        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(meter.prompt_tokens(), 800);
        assert_eq!(meter.completion_tokens(), 800);
    }
}
