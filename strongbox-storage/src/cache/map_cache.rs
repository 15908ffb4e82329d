//! In-process map-backed [`Cache`].

use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;
use std::sync::{Mutex, MutexGuard, PoisonError};

use super::traits::Cache;

struct Inner<K, V> {
    entries: HashMap<K, (V, u64)>,
    last_removed_version: u64,
}

/// One mutex guards both the entries and the removal watermark, so every
/// version comparison sees a consistent pair.
pub struct MapCache<K, V> {
    inner: Mutex<Inner<K, V>>,
}

impl<K, V> MapCache<K, V> {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                entries: HashMap::new(),
                last_removed_version: 0,
            }),
        }
    }

    /// Highest version ever passed to `remove`.
    pub fn last_removed_version(&self) -> u64 {
        self.lock().last_removed_version
    }

    // Every mutation is a single insert/remove plus a max(), so a poisoned
    // guard still holds a consistent map.
    fn lock(&self) -> MutexGuard<'_, Inner<K, V>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<K, V> Default for MapCache<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> fmt::Debug for MapCache<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.lock();
        f.debug_struct("MapCache")
            .field("len", &inner.entries.len())
            .field("last_removed_version", &inner.last_removed_version)
            .finish()
    }
}

impl<K, V> Cache<K, V> for MapCache<K, V>
where
    K: Eq + Hash + Send,
    V: Clone + Send,
{
    fn add(&self, key: K, value: V, version: u64) -> bool {
        let mut inner = self.lock();
        if version < inner.last_removed_version {
            return false;
        }
        if let Some((_, current)) = inner.entries.get(&key) {
            if version < *current {
                return false;
            }
        }
        inner.entries.insert(key, (value, version));
        true
    }

    fn get(&self, key: &K) -> Option<V> {
        self.lock().entries.get(key).map(|(value, _)| value.clone())
    }

    fn remove(&self, key: &K, version: u64) -> bool {
        let mut inner = self.lock();
        inner.last_removed_version = inner.last_removed_version.max(version);
        match inner.entries.get(key) {
            Some((_, current)) if *current <= version => {
                inner.entries.remove(key);
                true
            }
            _ => false,
        }
    }

    fn len(&self) -> usize {
        self.lock().entries.len()
    }
}
