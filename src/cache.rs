//! In-memory TTL cache used for subscription and key resolution.
//!
//! One `tokio::sync::Mutex` guards the whole map.  [`TtlCache::get_or_set`]
//! keeps the lock while the factory runs, so a missing key is computed once
//! even when several callers race on it; the cost is that unrelated misses
//! wait for each other.  Expiry is checked lazily on access and expired
//! entries are dropped when touched; nothing sweeps in the background.

use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;

use serde_json::Value;
use tokio::sync::Mutex;
use tokio::time::Instant;

/// TTL used when a caller has no opinion.
pub const DEFAULT_TTL: Duration = Duration::from_secs(60 * 60);

#[derive(Debug, Clone)]
struct CacheEntry<V> {
    value: V,
    expires_at: Instant,
}

impl<V> CacheEntry<V> {
    fn is_live(&self, now: Instant) -> bool {
        now < self.expires_at
    }
}

#[derive(Debug)]
pub struct TtlCache<V = Value> {
    entries: Mutex<HashMap<String, CacheEntry<V>>>,
}

impl<V> Default for TtlCache<V> {
    fn default() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }
}

impl<V: Clone> TtlCache<V> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the live value for `key`, if any.
    pub async fn get(&self, key: &str) -> Option<V> {
        let mut entries = self.entries.lock().await;
        live_value(&mut entries, key)
    }

    /// Insert or overwrite `key`.
    pub async fn set(&self, key: impl Into<String>, value: V, ttl: Duration) {
        let mut entries = self.entries.lock().await;
        entries.insert(
            key.into(),
            CacheEntry {
                value,
                expires_at: Instant::now() + ttl,
            },
        );
    }

    /// Return the cached value or compute, store and return it.
    ///
    /// `factory` only runs on a miss.  A factory error is returned to the
    /// caller and nothing is stored.
    pub async fn get_or_set<F, Fut, E>(&self, key: &str, factory: F, ttl: Duration) -> Result<V, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>>,
    {
        let mut entries = self.entries.lock().await;
        if let Some(value) = live_value(&mut entries, key) {
            tracing::debug!(key, "cache hit");
            return Ok(value);
        }

        tracing::debug!(key, "cache miss");
        let value = factory().await?;
        entries.insert(
            key.to_string(),
            CacheEntry {
                value: value.clone(),
                expires_at: Instant::now() + ttl,
            },
        );
        Ok(value)
    }

    pub async fn invalidate(&self, key: &str) {
        self.entries.lock().await.remove(key);
    }

    pub async fn clear(&self) {
        self.entries.lock().await.clear();
    }

    /// Number of stored entries, including expired ones not yet touched.
    pub async fn size(&self) -> usize {
        self.entries.lock().await.len()
    }
}

fn live_value<V: Clone>(entries: &mut HashMap<String, CacheEntry<V>>, key: &str) -> Option<V> {
    let entry = entries.get(key)?;
    if entry.is_live(Instant::now()) {
        return Some(entry.value.clone());
    }
    entries.remove(key);
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[tokio::test(start_paused = true)]
    async fn set_then_get_until_expiry() {
        let cache: TtlCache<Value> = TtlCache::new();
        cache.set("k", json!("v"), Duration::from_secs(1)).await;
        assert_eq!(cache.get("k").await, Some(json!("v")));

        tokio::time::sleep(Duration::from_millis(1100)).await;
        assert_eq!(cache.get("k").await, None);
    }

    #[tokio::test(start_paused = true)]
    async fn get_or_set_calls_factory_once_within_ttl() {
        let cache: TtlCache<String> = TtlCache::new();
        let counter = AtomicUsize::new(0);
        let calls = &counter;
        let factory = move || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok::<_, ()>("sub-id".to_string())
        };

        let first = cache
            .get_or_set("subscription:prod:default", factory, DEFAULT_TTL)
            .await
            .unwrap();
        let second = cache
            .get_or_set("subscription:prod:default", factory, DEFAULT_TTL)
            .await
            .unwrap();

        assert_eq!(first, second);
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn get_or_set_recomputes_after_expiry() {
        let cache: TtlCache<u32> = TtlCache::new();
        let counter = AtomicUsize::new(0);
        let calls = &counter;
        let factory = move || async move { Ok::<_, ()>(calls.fetch_add(1, Ordering::SeqCst) as u32) };

        assert_eq!(cache.get_or_set("k", factory, Duration::from_secs(5)).await, Ok(0));
        tokio::time::advance(Duration::from_secs(6)).await;
        assert_eq!(cache.get("k").await, None);
        assert_eq!(cache.get_or_set("k", factory, Duration::from_secs(5)).await, Ok(1));
    }

    #[tokio::test]
    async fn factory_errors_are_not_cached() {
        let cache: TtlCache<u32> = TtlCache::new();
        let failed: Result<u32, &str> = cache
            .get_or_set("k", || async { Err("boom") }, DEFAULT_TTL)
            .await;
        assert_eq!(failed, Err("boom"));
        assert_eq!(cache.size().await, 0);

        let ok: Result<u32, &str> = cache.get_or_set("k", || async { Ok(7) }, DEFAULT_TTL).await;
        assert_eq!(ok, Ok(7));
    }

    #[tokio::test]
    async fn racing_misses_compute_once() {
        let cache: Arc<TtlCache<u32>> = Arc::new(TtlCache::new());
        let calls = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let cache = cache.clone();
            let calls = calls.clone();
            handles.push(tokio::spawn(async move {
                cache
                    .get_or_set(
                        "shared",
                        || async move {
                            calls.fetch_add(1, Ordering::SeqCst);
                            tokio::time::sleep(Duration::from_millis(10)).await;
                            Ok::<_, ()>(42)
                        },
                        DEFAULT_TTL,
                    )
                    .await
            }));
        }
        for handle in handles {
            assert_eq!(handle.await.unwrap(), Ok(42));
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn invalidate_clear_and_size() {
        let cache: TtlCache<Value> = TtlCache::new();
        cache.set("a", json!(1), DEFAULT_TTL).await;
        cache.set("b", json!(2), DEFAULT_TTL).await;
        assert_eq!(cache.size().await, 2);

        cache.invalidate("a").await;
        assert_eq!(cache.get("a").await, None);
        assert_eq!(cache.size().await, 1);

        cache.set("b", json!(3), DEFAULT_TTL).await;
        assert_eq!(cache.get("b").await, Some(json!(3)));

        cache.clear().await;
        assert_eq!(cache.size().await, 0);
    }
}
