//! Cooperative cancellation token
//!
//! A cheap clone-able flag checked at every suspension point of a session.
//! Cancellation is cooperative: setting the flag guarantees no new tool
//! execution starts, but work already dispatched runs to completion and its
//! result is discarded.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the flag. Idempotent.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}
