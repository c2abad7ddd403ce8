//! Response Cache
//!
//! Process-wide memo of gateway results keyed by (normalized question, schema
//! fingerprint). Capacity-bounded with least-recently-used eviction, safe for
//! concurrent sessions, and single-flight per key: concurrent identical
//! questions issue at most one provider call. Loading a new dataset changes
//! the schema fingerprint, so stale entries simply never match again and age
//! out through the LRU.

use crate::error::Result;
use crate::schema::Tier;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use lru::LruCache;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::future::Future;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};

/// A memoized answer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    pub answer: String,
    pub confidence: f64,
    pub provider: String,
    pub created_at: DateTime<Utc>,
}

impl CacheEntry {
    pub fn age_seconds(&self) -> i64 {
        (Utc::now() - self.created_at).num_seconds()
    }
}

fn row_bucket(row_count: usize) -> u32 {
    // Order-of-magnitude bucket: 0, 1-9, 10-99, ... collide within a bucket.
    let mut bucket = 0;
    let mut n = row_count;
    while n > 0 {
        bucket += 1;
        n /= 10;
    }
    bucket
}

/// Stable hash over column names, tier and row-count bucket, never raw data.
pub fn schema_fingerprint(columns: &[String], tier: Tier, row_count: usize) -> String {
    let mut names: Vec<String> = columns.iter().map(|c| c.to_lowercase()).collect();
    names.sort();
    let mut hasher = Sha256::new();
    hasher.update(names.join("|"));
    hasher.update([tier.level()]);
    hasher.update(row_bucket(row_count).to_le_bytes());
    format!("{:x}", hasher.finalize())
}

/// Cache key for one (question, schema) pair.
pub fn question_fingerprint(normalized_question: &str, schema_fp: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(normalized_question);
    hasher.update("|");
    hasher.update(schema_fp);
    format!("{:x}", hasher.finalize())
}

pub struct ResponseCache {
    entries: Mutex<LruCache<String, CacheEntry>>,
    inflight: DashMap<String, Arc<tokio::sync::Mutex<()>>>,
}

impl ResponseCache {
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity.max(1)).expect("non-zero capacity");
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
            inflight: DashMap::new(),
        }
    }

    pub fn get(&self, key: &str) -> Option<CacheEntry> {
        let mut entries = self.entries.lock().expect("cache lock");
        entries.get(key).cloned()
    }

    pub fn put(&self, key: &str, entry: CacheEntry) {
        let mut entries = self.entries.lock().expect("cache lock");
        entries.put(key.to_string(), entry);
    }

    pub fn len(&self) -> usize {
        self.entries.lock().expect("cache lock").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Return the cached entry for `key`, or run `compute` to fill it.
    /// The boolean is true on a cache hit. At most one computation per key is
    /// in flight at a time; waiters re-check the cache once the leader stores.
    pub async fn get_or_compute<F, Fut>(&self, key: &str, compute: F) -> Result<(CacheEntry, bool)>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<CacheEntry>>,
    {
        if let Some(entry) = self.get(key) {
            return Ok((entry, true));
        }

        let guard = self
            .inflight
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone();
        let lock = guard.lock().await;

        // A concurrent leader may have stored while we waited.
        if let Some(entry) = self.get(key) {
            drop(lock);
            return Ok((entry, true));
        }

        let result = compute().await;
        match result {
            Ok(entry) => {
                self.put(key, entry.clone());
                drop(lock);
                self.inflight.remove(key);
                Ok((entry, false))
            }
            Err(e) => {
                drop(lock);
                self.inflight.remove(key);
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn entry(answer: &str) -> CacheEntry {
        CacheEntry {
            answer: answer.to_string(),
            confidence: 0.8,
            provider: "primary".to_string(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn evicts_least_recently_used() {
        let cache = ResponseCache::new(2);
        cache.put("a", entry("a"));
        cache.put("b", entry("b"));
        // Touch "a" so "b" becomes the eviction candidate.
        assert!(cache.get("a").is_some());
        cache.put("c", entry("c"));
        assert!(cache.get("a").is_some());
        assert!(cache.get("b").is_none());
        assert!(cache.get("c").is_some());
    }

    #[test]
    fn schema_fingerprint_ignores_column_order_and_exact_rows() {
        let ab = schema_fingerprint(&["A".into(), "B".into()], Tier::Tier1, 55);
        let ba = schema_fingerprint(&["b".into(), "a".into()], Tier::Tier1, 72);
        assert_eq!(ab, ba);

        let other_tier = schema_fingerprint(&["A".into(), "B".into()], Tier::Tier2, 55);
        assert_ne!(ab, other_tier);

        let other_bucket = schema_fingerprint(&["A".into(), "B".into()], Tier::Tier1, 550);
        assert_ne!(ab, other_bucket);
    }

    #[tokio::test]
    async fn get_or_compute_is_single_flight() {
        let cache = Arc::new(ResponseCache::new(8));
        let calls = Arc::new(AtomicUsize::new(0));

        let compute = |calls: Arc<AtomicUsize>| async move {
            calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(50)).await;
            Ok(entry("computed"))
        };

        let first = {
            let cache = Arc::clone(&cache);
            let calls = Arc::clone(&calls);
            tokio::spawn(async move { cache.get_or_compute("k", || compute(calls)).await })
        };
        let second = {
            let cache = Arc::clone(&cache);
            let calls = Arc::clone(&calls);
            tokio::spawn(async move { cache.get_or_compute("k", || compute(calls)).await })
        };

        let (first, second) = (first.await.unwrap().unwrap(), second.await.unwrap().unwrap());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(first.0.answer, "computed");
        assert_eq!(second.0.answer, "computed");
        // Exactly one of the two was the computing leader.
        assert_ne!(first.1, second.1);
    }
}
