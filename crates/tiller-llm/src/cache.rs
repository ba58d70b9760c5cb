//! Opportunistic prompt-payload cache with TTL
//!
//! Adapters render the same tool-spec payload on every call; this cache
//! keeps the rendered JSON keyed by model id so repeat calls skip the work.
//! Population is fire-and-forget and must never block the primary stream.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use tokio::sync::RwLock;

/// A cached rendered payload with timestamp.
#[derive(Debug, Clone)]
pub struct CachedPayload {
    pub payload: serde_json::Value,
    pub cached_at: SystemTime,
}

impl CachedPayload {
    pub fn is_expired(&self, ttl: Duration) -> bool {
        SystemTime::now()
            .duration_since(self.cached_at)
            .map(|age| age > ttl)
            .unwrap_or(true) // time went backwards, treat as expired
    }
}

/// Per-model-id payload cache.
#[derive(Debug, Clone)]
pub struct PromptCache {
    cache: Arc<RwLock<HashMap<String, CachedPayload>>>,
    ttl: Duration,
}

impl PromptCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            cache: Arc::new(RwLock::new(HashMap::new())),
            ttl,
        }
    }

    /// Fresh cached payload for a model id, if any.
    pub async fn get(&self, model: &str) -> Option<serde_json::Value> {
        let cache = self.cache.read().await;
        cache
            .get(model)
            .filter(|entry| !entry.is_expired(self.ttl))
            .map(|entry| entry.payload.clone())
    }

    /// Populate the cache on a detached task. Callers do not wait.
    pub fn store_detached(&self, model: &str, payload: serde_json::Value) {
        let cache = Arc::clone(&self.cache);
        let model = model.to_string();
        tokio::spawn(async move {
            cache.write().await.insert(
                model,
                CachedPayload {
                    payload,
                    cached_at: SystemTime::now(),
                },
            );
        });
    }
}

impl Default for PromptCache {
    fn default() -> Self {
        // Tool specs are fixed per session; five minutes matches how long a
        // model id realistically stays active.
        Self::new(Duration::from_secs(300))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn get_returns_fresh_entry() {
        let cache = PromptCache::new(Duration::from_secs(60));
        cache.store_detached("gpt-4o", serde_json::json!({"tools": []}));

        // Detached insert; yield until it lands.
        for _ in 0..100 {
            if cache.get("gpt-4o").await.is_some() {
                break;
            }
            tokio::task::yield_now().await;
        }

        assert_eq!(
            cache.get("gpt-4o").await,
            Some(serde_json::json!({"tools": []}))
        );
    }

    #[tokio::test]
    async fn expired_entries_are_misses() {
        let cache = PromptCache::new(Duration::from_millis(0));
        cache.store_detached("gpt-4o", serde_json::json!(1));
        tokio::time::sleep(Duration::from_millis(10)).await;

        assert!(cache.get("gpt-4o").await.is_none());
    }

    #[tokio::test]
    async fn unknown_model_is_a_miss() {
        let cache = PromptCache::new(Duration::from_secs(60));
        assert!(cache.get("claude-sonnet").await.is_none());
    }
}
