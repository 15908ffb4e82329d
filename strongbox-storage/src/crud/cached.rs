//! Read-through / write-through cache in front of a [`MessageCrud`].
//!
//! The store stays the source of truth. Freshness is decided by versions:
//!
//! - a read snapshots `read_version` *before* fetching and caches what it
//!   fetched under that snapshot, so a fetch that raced a newer write or a
//!   delete is rejected by the cache instead of clobbering it;
//! - a write caches (or, for deletes, removes) under the version the crud
//!   layer drew for it, then advances `read_version` by the attempts the
//!   write consumed, whether it committed or not.
//!
//! `read_version` therefore never runs ahead of the versions that have
//! actually settled.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::de::DeserializeOwned;
use serde::Serialize;
use strongbox_core::{StrongboxResult, WriteResult};
use tracing::{debug, trace};

use super::generic::BatchRead;
use super::message::MessageCrud;
use crate::bucket::BucketRef;
use crate::cache::{Cache, CacheEvent, CacheMetrics, MapCache, NoopMetrics};

/// A [`MessageCrud`] fronted by a versioned cache.
pub struct CachedMessageCrud<T, C = MapCache<Vec<u8>, T>> {
    crud: MessageCrud<T>,
    cache: C,
    metrics: Box<dyn CacheMetrics>,
    read_version: AtomicU64,
    bucket_name: String,
}

impl<T, C> fmt::Debug for CachedMessageCrud<T, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CachedMessageCrud")
            .field("bucket", &self.bucket_name)
            .field("read_version", &self.read_version.load(Ordering::SeqCst))
            .finish_non_exhaustive()
    }
}

impl<T> CachedMessageCrud<T, MapCache<Vec<u8>, T>>
where
    T: Serialize + DeserializeOwned + Clone + Send + Sync,
{
    /// Wrap `crud` with an empty [`MapCache`].
    pub fn new(crud: MessageCrud<T>, metrics: impl CacheMetrics + 'static) -> Self {
        Self::with_cache(crud, MapCache::new(), metrics)
    }

    /// Wrap `crud` with an empty [`MapCache`] and no metrics.
    pub fn without_metrics(crud: MessageCrud<T>) -> Self {
        Self::new(crud, NoopMetrics)
    }
}

impl<T, C> CachedMessageCrud<T, C>
where
    T: Serialize + DeserializeOwned + Clone + Send + Sync,
    C: Cache<Vec<u8>, T>,
{
    /// Wrap `crud` with an injected cache.
    pub fn with_cache(
        crud: MessageCrud<T>,
        cache: C,
        metrics: impl CacheMetrics + 'static,
    ) -> Self {
        let bucket_name = crud.bucket().path();
        Self {
            crud,
            cache,
            metrics: Box::new(metrics),
            read_version: AtomicU64::new(0),
            bucket_name,
        }
    }

    pub fn bucket(&self) -> &BucketRef {
        self.crud.bucket()
    }

    pub fn cache(&self) -> &C {
        &self.cache
    }

    pub fn inner(&self) -> &MessageCrud<T> {
        &self.crud
    }

    pub fn key_of(&self, item: &T) -> Vec<u8> {
        self.crud.key_of(item)
    }

    /// Versions whose writes have settled.
    pub fn read_version(&self) -> u64 {
        self.read_version.load(Ordering::SeqCst)
    }

    // ------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------

    pub fn read(&self, key: &[u8]) -> StrongboxResult<Option<T>> {
        let key = key.to_vec();
        if let Some(value) = self.cache.get(&key) {
            self.record(&key, CacheEvent::Hit);
            return Ok(Some(value));
        }
        self.record(&key, CacheEvent::Miss);

        let version = self.read_version();
        let value = self.crud.read(&key)?;
        if let Some(value) = &value {
            self.cache_fetched(key, value.clone(), version);
        }
        Ok(value)
    }

    /// Hits come from the cache; the misses are fetched in one underlying
    /// batch. The result keeps the [`BatchRead`] ordering contract.
    pub fn read_batch<K: AsRef<[u8]>>(&self, keys: &[K]) -> StrongboxResult<BatchRead<T>> {
        let mut slots: Vec<Option<T>> = Vec::with_capacity(keys.len());
        let mut misses = Vec::new();
        for (index, key) in keys.iter().enumerate() {
            let key = key.as_ref().to_vec();
            match self.cache.get(&key) {
                Some(value) => {
                    self.record(&key, CacheEvent::Hit);
                    slots.push(Some(value));
                }
                None => {
                    self.record(&key, CacheEvent::Miss);
                    slots.push(None);
                    misses.push(index);
                }
            }
        }

        if !misses.is_empty() {
            let version = self.read_version();
            let miss_keys: Vec<&[u8]> = misses.iter().map(|&i| keys[i].as_ref()).collect();
            let fetched = self.crud.read_batch(miss_keys.as_slice())?.into_slots(misses.len());
            for (&index, value) in misses.iter().zip(fetched) {
                if let Some(value) = value {
                    self.cache_fetched(keys[index].as_ref().to_vec(), value.clone(), version);
                    slots[index] = Some(value);
                }
            }
        }

        let mut out = BatchRead::new();
        for (index, slot) in slots.into_iter().enumerate() {
            match slot {
                Some(value) => out.values.push(value),
                None => out.missing.push(index),
            }
        }
        Ok(out)
    }

    /// Always reads the store, refreshing the cache with what it found.
    pub fn read_all(&self) -> StrongboxResult<Vec<T>> {
        let version = self.read_version();
        let values = self.crud.read_all()?;
        for value in &values {
            self.cache_fetched(self.crud.key_of(value), value.clone(), version);
        }
        Ok(values)
    }

    pub fn count(&self) -> StrongboxResult<u64> {
        self.crud.count()
    }

    pub fn exists(&self, key: &[u8]) -> StrongboxResult<bool> {
        self.crud.exists(key)
    }

    // ------------------------------------------------------------------
    // Writes
    // ------------------------------------------------------------------

    pub fn create(&self, item: &T) -> WriteResult {
        let result = self.crud.create(item);
        self.settle_put(std::slice::from_ref(item), result)
    }

    pub fn create_batch(&self, items: &[T]) -> WriteResult {
        let result = self.crud.create_batch(items);
        self.settle_put(items, result)
    }

    pub fn update(&self, item: &T) -> WriteResult {
        let result = self.crud.update(item);
        self.settle_put(std::slice::from_ref(item), result)
    }

    pub fn update_batch(&self, items: &[T]) -> WriteResult {
        let result = self.crud.update_batch(items);
        self.settle_put(items, result)
    }

    pub fn upsert(&self, item: &T) -> WriteResult {
        let result = self.crud.upsert(item);
        self.settle_put(std::slice::from_ref(item), result)
    }

    pub fn upsert_batch(&self, items: &[T]) -> WriteResult {
        let result = self.crud.upsert_batch(items);
        self.settle_put(items, result)
    }

    pub fn delete(&self, key: &[u8]) -> WriteResult {
        let result = self.crud.delete(key);
        self.settle_delete(&[key], result)
    }

    pub fn delete_batch<K: AsRef<[u8]>>(&self, keys: &[K]) -> WriteResult {
        let result = self.crud.delete_batch(keys);
        self.settle_delete(keys, result)
    }

    fn settle_put(&self, items: &[T], result: WriteResult) -> WriteResult {
        match &result {
            Ok(outcome) => {
                for item in items {
                    let key = self.crud.key_of(item);
                    if !self.cache.add(key.clone(), item.clone(), outcome.version) {
                        debug!(
                            bucket = %self.bucket_name,
                            key = %String::from_utf8_lossy(&key),
                            version = outcome.version,
                            "Cache rejected written value"
                        );
                    }
                }
                self.read_version.fetch_add(outcome.attempts, Ordering::SeqCst);
            }
            Err(error) => {
                self.read_version.fetch_add(error.attempts, Ordering::SeqCst);
            }
        }
        result
    }

    fn settle_delete<K: AsRef<[u8]>>(&self, keys: &[K], result: WriteResult) -> WriteResult {
        match &result {
            Ok(outcome) => {
                for key in keys {
                    self.cache.remove(&key.as_ref().to_vec(), outcome.version);
                }
                self.read_version.fetch_add(outcome.attempts, Ordering::SeqCst);
            }
            Err(error) => {
                self.read_version.fetch_add(error.attempts, Ordering::SeqCst);
            }
        }
        result
    }

    fn cache_fetched(&self, key: Vec<u8>, value: T, version: u64) {
        if !self.cache.add(key, value, version) {
            debug!(bucket = %self.bucket_name, version, "Cache rejected stale read");
        }
    }

    fn record(&self, key: &[u8], event: CacheEvent) {
        trace!(
            bucket = %self.bucket_name,
            key = %String::from_utf8_lossy(key),
            event = event.as_str(),
            "Cache lookup"
        );
        self.metrics.record(&self.bucket_name, event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::CacheStatsRecorder;
    use crate::store::Store;
    use serde::Deserialize;
    use std::sync::Arc;
    use strongbox_core::StorageConfig;
    use tempfile::TempDir;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Policy {
        id: String,
        severity: u8,
    }

    fn policy_key(p: &Policy) -> Vec<u8> {
        p.id.as_bytes().to_vec()
    }

    fn policy(id: &str, severity: u8) -> Policy {
        Policy {
            id: id.to_string(),
            severity,
        }
    }

    struct Fixture {
        cached: CachedMessageCrud<Policy>,
        stats: Arc<CacheStatsRecorder>,
        _temp_dir: TempDir,
    }

    fn fixture() -> Fixture {
        let temp_dir = TempDir::new().expect("TempDir creation should succeed");
        let config = StorageConfig::new(temp_dir.path().join("store.db")).with_map_size_mb(16);
        let store = Store::open(&config).expect("store open should succeed");
        let bucket = store.ensure_bucket("policies").expect("registration");
        let stats = Arc::new(CacheStatsRecorder::new());
        let sink = Arc::clone(&stats);
        let cached = CachedMessageCrud::new(
            MessageCrud::new(bucket, policy_key),
            move |bucket: &str, event: CacheEvent| sink.record(bucket, event),
        );
        Fixture {
            cached,
            stats,
            _temp_dir: temp_dir,
        }
    }

    #[test]
    fn test_write_populates_cache() {
        let f = fixture();
        f.cached.create(&policy("p1", 3)).expect("create");
        assert_eq!(f.cached.cache().len(), 1);

        assert_eq!(f.cached.read(b"p1").expect("read"), Some(policy("p1", 3)));
        assert_eq!(f.stats.snapshot().hits, 1);
        assert_eq!(f.stats.snapshot().misses, 0);
        assert_eq!(f.cached.read_version(), 1);
    }

    #[test]
    fn test_miss_then_hit() {
        let f = fixture();
        f.cached.inner().upsert(&policy("p1", 1)).expect("upsert behind the cache");

        assert_eq!(f.cached.read(b"p1").expect("read"), Some(policy("p1", 1)));
        assert_eq!(f.cached.read(b"p1").expect("read"), Some(policy("p1", 1)));
        assert_eq!(f.cached.read(b"nope").expect("read"), None);

        let stats = f.stats.snapshot();
        assert_eq!((stats.hits, stats.misses), (1, 2));
    }

    #[test]
    fn test_delete_invalidates() {
        let f = fixture();
        f.cached.upsert(&policy("p1", 1)).expect("upsert");
        f.cached.delete(b"p1").expect("delete");
        assert!(f.cached.cache().is_empty());
        assert_eq!(f.cached.read(b"p1").expect("read"), None);
        assert_eq!(f.cached.cache().last_removed_version(), 2);
    }

    #[test]
    fn test_failed_write_advances_read_version() {
        let f = fixture();
        f.cached.create(&policy("p1", 1)).expect("create");
        let err = f.cached.create(&policy("p1", 9)).expect_err("conflict");
        assert!(err.is_conflict());
        assert_eq!(f.cached.read_version(), 2);
        assert_eq!(f.cached.read(b"p1").expect("read"), Some(policy("p1", 1)));
    }

    #[test]
    fn test_read_batch_merges_hits_and_misses() {
        let f = fixture();
        f.cached.upsert(&policy("a", 1)).expect("upsert");
        f.cached.inner().upsert(&policy("c", 3)).expect("upsert behind the cache");

        let batch = f.cached.read_batch(&["a", "b", "c"]).expect("read batch");
        assert_eq!(batch.values, vec![policy("a", 1), policy("c", 3)]);
        assert_eq!(batch.missing, vec![1]);
        assert_eq!(f.cached.cache().len(), 2, "fetched miss is now cached");
    }

    #[test]
    fn test_read_all_repopulates() {
        let f = fixture();
        f.cached.inner().upsert_batch(&[policy("a", 1), policy("b", 2)]).expect("upsert");
        assert!(f.cached.cache().is_empty());
        assert_eq!(f.cached.read_all().expect("read all").len(), 2);
        assert_eq!(f.cached.cache().len(), 2);
    }

    #[test]
    fn test_batch_delete_removes_every_key() {
        let f = fixture();
        f.cached
            .upsert_batch(&[policy("a", 1), policy("b", 2), policy("c", 3)])
            .expect("upsert");
        f.cached.delete_batch(&["a", "b"]).expect("delete");
        assert_eq!(f.cached.cache().len(), 1);
        assert_eq!(f.cached.count().expect("count"), 1);
    }
}
