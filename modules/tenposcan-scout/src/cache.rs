//! TTL cache for inference responses.
//!
//! Inference calls are the expensive tier, and investigation retries
//! tend to re-ask the same question about the same evidence. Keyed by a
//! fingerprint of the full request so distinct prompts never collide.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use sha2::{Digest, Sha256};
use tokio::sync::Mutex;
use tracing::debug;

pub const DEFAULT_TTL: Duration = Duration::from_secs(3600);
pub const DEFAULT_MAX_SIZE: usize = 500;

struct CacheEntry {
    value: String,
    stored_at: Instant,
    ttl: Duration,
}

impl CacheEntry {
    fn is_expired(&self) -> bool {
        self.stored_at.elapsed() >= self.ttl
    }
}

#[derive(Debug, Clone, Copy)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub entries: usize,
}

impl CacheStats {
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// In-memory response cache with per-entry TTL. Expired entries are
/// never returned; they are evicted lazily on lookup.
pub struct ResponseCache {
    entries: Mutex<HashMap<String, CacheEntry>>,
    max_size: usize,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl Default for ResponseCache {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_SIZE)
    }
}

impl ResponseCache {
    pub fn new(max_size: usize) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            max_size: max_size.max(1),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Stable key for an inference request: the exact prompt, model,
    /// and temperature all participate.
    pub fn fingerprint(prompt: &str, model: &str, temperature: f32) -> String {
        let mut hasher = Sha256::new();
        hasher.update(prompt.as_bytes());
        hasher.update(b"\x00");
        hasher.update(model.as_bytes());
        hasher.update(b"\x00");
        hasher.update(temperature.to_le_bytes());
        hex::encode(hasher.finalize())
    }

    pub async fn get(&self, key: &str) -> Option<String> {
        let mut entries = self.entries.lock().await;
        match entries.get(key) {
            Some(entry) if !entry.is_expired() => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(entry.value.clone())
            }
            Some(_) => {
                entries.remove(key);
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    pub async fn put(&self, key: &str, value: String, ttl: Duration) {
        let mut entries = self.entries.lock().await;
        if entries.len() >= self.max_size && !entries.contains_key(key) {
            Self::evict_one(&mut entries);
        }
        entries.insert(
            key.to_string(),
            CacheEntry {
                value,
                stored_at: Instant::now(),
                ttl,
            },
        );
    }

    /// Cached value for `key`, or the result of `compute`. The lock is
    /// not held across the compute await, so a slow computation does
    /// not stall unrelated lookups.
    pub async fn get_or_compute<F, Fut, E>(
        &self,
        key: &str,
        ttl: Duration,
        compute: F,
    ) -> Result<String, E>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<String, E>>,
    {
        if let Some(value) = self.get(key).await {
            debug!(key = &key[..12.min(key.len())], "cache hit");
            return Ok(value);
        }
        let value = compute().await?;
        self.put(key, value.clone(), ttl).await;
        Ok(value)
    }

    pub async fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            entries: self.entries.lock().await.len(),
        }
    }

    fn evict_one(entries: &mut HashMap<String, CacheEntry>) {
        // Prefer dropping something already expired; otherwise the
        // oldest entry goes.
        if let Some(key) = entries
            .iter()
            .find(|(_, e)| e.is_expired())
            .map(|(k, _)| k.clone())
        {
            entries.remove(&key);
            return;
        }
        if let Some(key) = entries
            .iter()
            .min_by_key(|(_, e)| e.stored_at)
            .map(|(k, _)| k.clone())
        {
            entries.remove(&key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn hit_after_put() {
        let cache = ResponseCache::new(10);
        cache.put("k", "v".into(), Duration::from_secs(60)).await;
        assert_eq!(cache.get("k").await.as_deref(), Some("v"));
        assert_eq!(cache.get("missing").await, None);
        let stats = cache.stats().await;
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.hit_rate(), 0.5);
    }

    #[tokio::test]
    async fn expired_entry_is_never_returned() {
        let cache = ResponseCache::new(10);
        cache.put("k", "v".into(), Duration::ZERO).await;
        assert_eq!(cache.get("k").await, None);
        assert_eq!(cache.stats().await.entries, 0);
    }

    #[tokio::test]
    async fn eviction_keeps_size_bounded() {
        let cache = ResponseCache::new(2);
        cache.put("a", "1".into(), Duration::from_secs(60)).await;
        tokio::time::sleep(Duration::from_millis(5)).await;
        cache.put("b", "2".into(), Duration::from_secs(60)).await;
        cache.put("c", "3".into(), Duration::from_secs(60)).await;
        assert_eq!(cache.stats().await.entries, 2);
        // Oldest was evicted.
        assert_eq!(cache.get("a").await, None);
        assert_eq!(cache.get("c").await.as_deref(), Some("3"));
    }

    #[tokio::test]
    async fn get_or_compute_caches_result() {
        let cache = ResponseCache::new(10);
        let mut calls = 0u32;
        for _ in 0..3 {
            let value = cache
                .get_or_compute("k", Duration::from_secs(60), || {
                    calls += 1;
                    async { Ok::<_, std::convert::Infallible>("computed".to_string()) }
                })
                .await
                .unwrap();
            assert_eq!(value, "computed");
        }
        assert_eq!(calls, 1);
    }

    #[tokio::test]
    async fn expired_entry_is_recomputed() {
        let cache = ResponseCache::new(10);
        let mut calls = 0u32;
        for _ in 0..2 {
            cache
                .get_or_compute("k", Duration::ZERO, || {
                    calls += 1;
                    async { Ok::<_, std::convert::Infallible>("v".to_string()) }
                })
                .await
                .unwrap();
        }
        assert_eq!(calls, 2);
    }

    #[test]
    fn fingerprint_varies_with_every_input() {
        let base = ResponseCache::fingerprint("p", "m", 0.1);
        assert_ne!(base, ResponseCache::fingerprint("q", "m", 0.1));
        assert_ne!(base, ResponseCache::fingerprint("p", "n", 0.1));
        assert_ne!(base, ResponseCache::fingerprint("p", "m", 0.2));
        assert_eq!(base, ResponseCache::fingerprint("p", "m", 0.1));
    }
}
