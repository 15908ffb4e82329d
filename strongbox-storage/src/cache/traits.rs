//! Cache trait, hit/miss metrics and usage statistics.

use std::sync::atomic::{AtomicU64, Ordering};

/// Key/value cache with monotonic per-key versions.
///
/// Implementations must be safe under arbitrary concurrent callers and
/// uphold two rules:
///
/// - `add` is rejected when `version` is older than the key's stored
///   version or older than the highest version ever passed to `remove`.
/// - `remove` raises that removal watermark even when the key is absent,
///   so a read that started before a delete cannot resurrect the record.
pub trait Cache<K, V>: Send + Sync {
    /// Store `value` under `key` at `version`. Returns whether it was stored.
    fn add(&self, key: K, value: V, version: u64) -> bool;

    /// A copy of the cached value for `key`.
    fn get(&self, key: &K) -> Option<V>;

    /// Invalidate `key` as of `version`. Returns whether an entry was dropped.
    fn remove(&self, key: &K, version: u64) -> bool;

    /// Number of cached entries.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Outcome of a cache lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheEvent {
    Hit,
    Miss,
}

impl CacheEvent {
    pub fn as_str(self) -> &'static str {
        match self {
            CacheEvent::Hit => "hit",
            CacheEvent::Miss => "miss",
        }
    }
}

/// Sink for cache hit/miss events, labelled by bucket name.
pub trait CacheMetrics: Send + Sync {
    fn record(&self, bucket: &str, event: CacheEvent);
}

impl<F> CacheMetrics for F
where
    F: Fn(&str, CacheEvent) + Send + Sync,
{
    fn record(&self, bucket: &str, event: CacheEvent) {
        self(bucket, event)
    }
}

/// Discards every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopMetrics;

impl CacheMetrics for NoopMetrics {
    fn record(&self, _bucket: &str, _event: CacheEvent) {}
}

/// Counts hits and misses across all buckets.
#[derive(Debug, Default)]
pub struct CacheStatsRecorder {
    hits: AtomicU64,
    misses: AtomicU64,
}

impl CacheStatsRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }
}

impl CacheMetrics for CacheStatsRecorder {
    fn record(&self, _bucket: &str, event: CacheEvent) {
        let counter = match event {
            CacheEvent::Hit => &self.hits,
            CacheEvent::Miss => &self.misses,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

/// Statistics about cache usage.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Number of cache hits.
    pub hits: u64,
    /// Number of cache misses.
    pub misses: u64,
}

impl CacheStats {
    /// Calculate the hit rate (0.0 to 1.0).
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}
