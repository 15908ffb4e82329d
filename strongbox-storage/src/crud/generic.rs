//! Key-path addressed CRUD over serialized entries.
//!
//! Every operation runs in exactly one transaction. Reads treat an absent
//! intermediate container like an absent leaf; writes create intermediate
//! containers on demand (`create`, `upsert`) or require them (`update`).

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use heed::{RoTxn, RwTxn};
use strongbox_core::{
    Entry, KeyPath, StorageError, StrongboxResult, WriteError, WriteOutcome, WriteResult,
};
use tracing::debug;

use crate::bucket::{Bucket, BucketRef};
use crate::store::EngineResultExt;

/// Turns items into `(key, value)` pairs and values back into items.
pub trait EntryCodec: Send + Sync {
    type Item;

    fn encode(&self, item: &Self::Item) -> StrongboxResult<(Vec<u8>, Vec<u8>)>;

    fn decode(&self, bytes: &[u8]) -> StrongboxResult<Self::Item>;
}

/// Result of a batch read.
///
/// `values` holds the found entries in input order with the gaps removed;
/// `missing` holds the input indices that were not found. The two lists do
/// not line up positionally with the input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchRead<T> {
    pub values: Vec<T>,
    pub missing: Vec<usize>,
}

impl<T> BatchRead<T> {
    pub fn new() -> Self {
        Self {
            values: Vec::new(),
            missing: Vec::new(),
        }
    }

    /// Walk the input positions in order, yielding `Some` for found entries
    /// and `None` for missing ones.
    pub fn into_slots(self, input_len: usize) -> Vec<Option<T>> {
        let mut values = self.values.into_iter();
        let mut missing = self.missing.into_iter().peekable();
        (0..input_len)
            .map(|i| {
                if missing.peek() == Some(&i) {
                    missing.next();
                    None
                } else {
                    values.next()
                }
            })
            .collect()
    }
}

impl<T> Default for BatchRead<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Generic CRUD bound to one container and one codec.
pub struct Crud<C> {
    bucket: BucketRef,
    codec: C,
    write_version: Arc<AtomicU64>,
}

impl<C> fmt::Debug for Crud<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Crud")
            .field("bucket", &self.bucket.path())
            .field("write_version", &self.write_version.load(Ordering::SeqCst))
            .finish()
    }
}

impl<C: EntryCodec> Crud<C> {
    pub fn new(bucket: BucketRef, codec: C) -> Self {
        Self {
            bucket,
            codec,
            write_version: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn bucket(&self) -> &BucketRef {
        &self.bucket
    }

    pub fn codec(&self) -> &C {
        &self.codec
    }

    /// Latest version handed to a write attempt.
    pub fn write_version(&self) -> u64 {
        self.write_version.load(Ordering::SeqCst)
    }

    // ------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------

    /// The entry at `path`, or `None` if it or any container above it is absent.
    pub fn read(&self, path: &KeyPath) -> StrongboxResult<Option<C::Item>> {
        let leaf = leaf_of(path)?;
        self.bucket.view(|txn, root| {
            match descend(txn, root, path.containers())? {
                Some(parent) => self.decode_leaf(txn, &parent, leaf),
                None => Ok(None),
            }
        })
    }

    /// Entries for every path that exists, in input order with gaps removed,
    /// plus the indices of the ones that do not.
    pub fn read_batch(&self, paths: &[KeyPath]) -> StrongboxResult<BatchRead<C::Item>> {
        for path in paths {
            leaf_of(path)?;
        }
        self.bucket.view(|txn, root| {
            let mut out = BatchRead::new();
            for (index, path) in paths.iter().enumerate() {
                let found = match descend(txn, root, path.containers())? {
                    Some(parent) => self.decode_leaf(txn, &parent, leaf_of(path)?)?,
                    None => None,
                };
                match found {
                    Some(item) => out.values.push(item),
                    None => out.missing.push(index),
                }
            }
            Ok(out)
        })
    }

    pub fn exists(&self, path: &KeyPath) -> StrongboxResult<bool> {
        let leaf = leaf_of(path)?;
        self.bucket.view(|txn, root| match descend(txn, root, path.containers())? {
            Some(parent) => Ok(parent.get(txn, leaf)?.is_some()),
            None => Ok(false),
        })
    }

    /// Every entry at or below `prefix`, down to `max_depth` further levels
    /// of nesting (`None` for unlimited). Keys are relative to `prefix`;
    /// direct leaves come before the contents of nested containers.
    pub fn read_all(
        &self,
        max_depth: Option<usize>,
        prefix: &KeyPath,
    ) -> StrongboxResult<Vec<Entry<C::Item>>> {
        self.bucket.view(|txn, root| {
            let mut out = Vec::new();
            if let Some(start) = descend(txn, root, prefix.as_slice())? {
                walk(txn, &start, &KeyPath::root(), max_depth, &mut |key, value| {
                    out.push(Entry {
                        key,
                        value: self.codec.decode(value)?,
                    });
                    Ok(())
                })?;
            }
            Ok(out)
        })
    }

    /// Relative key paths of every entry [`Crud::read_all`] would return,
    /// without decoding any value.
    pub fn read_keys(
        &self,
        max_depth: Option<usize>,
        prefix: &KeyPath,
    ) -> StrongboxResult<Vec<KeyPath>> {
        self.bucket.view(|txn, root| {
            let mut out = Vec::new();
            if let Some(start) = descend(txn, root, prefix.as_slice())? {
                walk(txn, &start, &KeyPath::root(), max_depth, &mut |key, _| {
                    out.push(key);
                    Ok(())
                })?;
            }
            Ok(out)
        })
    }

    /// Number of entries at or below `prefix`, without decoding them.
    pub fn count_leaves(&self, max_depth: Option<usize>, prefix: &KeyPath) -> StrongboxResult<u64> {
        self.bucket.view(|txn, root| match descend(txn, root, prefix.as_slice())? {
            Some(start) => count(txn, &start, max_depth),
            None => Ok(0),
        })
    }

    fn decode_leaf(
        &self,
        txn: &RoTxn<'_>,
        parent: &Bucket,
        leaf: &[u8],
    ) -> StrongboxResult<Option<C::Item>> {
        match parent.get(txn, leaf)? {
            Some(bytes) => self.codec.decode(bytes).map(Some),
            None => Ok(None),
        }
    }

    // ------------------------------------------------------------------
    // Writes
    // ------------------------------------------------------------------

    /// Store `item` under `nesting`; fails if its key is already present.
    pub fn create(&self, item: &C::Item, nesting: &KeyPath) -> WriteResult {
        self.create_batch(std::slice::from_ref(item), nesting)
    }

    pub fn create_batch(&self, items: &[C::Item], nesting: &KeyPath) -> WriteResult {
        self.write("create", |txn, root| {
            let parent = ensure_path(txn, root, nesting.as_slice())?;
            for item in items {
                let (key, value) = self.codec.encode(item)?;
                if parent.get(txn, &key)?.is_some() {
                    return Err(StorageError::AlreadyExists {
                        path: format!("{}/{}", parent.path(), String::from_utf8_lossy(&key)),
                    }
                    .into());
                }
                parent.put(txn, &key, &value)?;
            }
            Ok(())
        })
    }

    /// Replace `item` under `nesting`; fails if its key is absent.
    pub fn update(&self, item: &C::Item, nesting: &KeyPath) -> WriteResult {
        self.update_batch(std::slice::from_ref(item), nesting)
    }

    pub fn update_batch(&self, items: &[C::Item], nesting: &KeyPath) -> WriteResult {
        self.write("update", |txn, root| {
            let parent = descend(txn, root, nesting.as_slice())?.ok_or_else(|| {
                StorageError::NotFound {
                    path: format!("{}/{nesting}", root.path()),
                }
            })?;
            for item in items {
                let (key, value) = self.codec.encode(item)?;
                if parent.get(txn, &key)?.is_none() {
                    return Err(StorageError::NotFound {
                        path: format!("{}/{}", parent.path(), String::from_utf8_lossy(&key)),
                    }
                    .into());
                }
                parent.put(txn, &key, &value)?;
            }
            Ok(())
        })
    }

    /// Store `item` under `nesting` whether or not its key is present.
    pub fn upsert(&self, item: &C::Item, nesting: &KeyPath) -> WriteResult {
        self.upsert_batch(std::slice::from_ref(item), nesting)
    }

    pub fn upsert_batch(&self, items: &[C::Item], nesting: &KeyPath) -> WriteResult {
        self.write("upsert", |txn, root| {
            let parent = ensure_path(txn, root, nesting.as_slice())?;
            for item in items {
                let (key, value) = self.codec.encode(item)?;
                parent.put(txn, &key, &value)?;
            }
            Ok(())
        })
    }

    /// Remove the entry at `path`. Succeeds if it is already absent.
    pub fn delete(&self, path: &KeyPath) -> WriteResult {
        self.delete_batch(std::slice::from_ref(path))
    }

    pub fn delete_batch(&self, paths: &[KeyPath]) -> WriteResult {
        self.write("delete", |txn, root| {
            for path in paths {
                let leaf = leaf_of(path)?;
                if let Some(parent) = descend(txn, root, path.containers())? {
                    parent.delete(txn, leaf)?;
                }
            }
            Ok(())
        })
    }

    /// Remove the nested container at `path` with everything below it.
    /// Succeeds if it is already absent.
    pub fn delete_container(&self, path: &KeyPath) -> WriteResult {
        self.write("delete_container", |txn, root| {
            let name = leaf_of(path)?;
            if let Some(parent) = descend(txn, root, path.containers())? {
                parent.delete_nested(txn, name)?;
            }
            Ok(())
        })
    }

    /// Run `op` in one write transaction.
    ///
    /// The version is drawn after the transaction is open, so it is taken
    /// while holding the engine's writer lock, and before the outcome is
    /// known. A transaction that cannot be opened consumes no version.
    fn write<F>(&self, op: &'static str, f: F) -> WriteResult
    where
        F: FnOnce(&mut RwTxn<'_>, &Bucket) -> StrongboxResult<()>,
    {
        let store = self.bucket.store();
        let mut txn = store.write_txn().map_err(|error| WriteError::new(0, error))?;
        let version = self.write_version.fetch_add(1, Ordering::SeqCst) + 1;

        if let Err(error) = self.bucket.update_in(&mut txn, f) {
            debug!(bucket = %self.bucket.path(), op, version, error = %error, "Write aborted");
            return Err(WriteError::new(1, error));
        }
        txn.commit().engine().map_err(|error| WriteError::new(1, error))?;

        debug!(bucket = %self.bucket.path(), op, version, "Write committed");
        Ok(WriteOutcome {
            version,
            attempts: 1,
        })
    }
}

fn leaf_of(path: &KeyPath) -> StrongboxResult<&[u8]> {
    path.leaf().ok_or_else(|| {
        StorageError::InvalidKey {
            reason: "key path must name a leaf".to_string(),
        }
        .into()
    })
}

/// Follow `containers` down from `root` without creating anything.
fn descend(
    txn: &RoTxn<'_>,
    root: &Bucket,
    containers: &[Vec<u8>],
) -> StrongboxResult<Option<Bucket>> {
    let mut current = root.clone();
    for name in containers {
        match current.nested(txn, name)? {
            Some(next) => current = next,
            None => return Ok(None),
        }
    }
    Ok(Some(current))
}

/// Follow `containers` down from `root`, creating missing ones.
fn ensure_path(
    txn: &mut RwTxn<'_>,
    root: &Bucket,
    containers: &[Vec<u8>],
) -> StrongboxResult<Bucket> {
    let mut current = root.clone();
    for name in containers {
        current = current.create_nested_if_missing(txn, name)?;
    }
    Ok(current)
}

fn walk<F>(
    txn: &RoTxn<'_>,
    bucket: &Bucket,
    at: &KeyPath,
    max_depth: Option<usize>,
    visit: &mut F,
) -> StrongboxResult<()>
where
    F: FnMut(KeyPath, &[u8]) -> StrongboxResult<()>,
{
    for (key, value) in bucket.leaves(txn)? {
        visit(at.child(key), value)?;
    }
    let Some(depth) = deeper(max_depth) else {
        return Ok(());
    };
    for name in bucket.nested_names(txn)? {
        if let Some(child) = bucket.nested(txn, &name)? {
            walk(txn, &child, &at.child(&name), depth, visit)?;
        }
    }
    Ok(())
}

fn count(txn: &RoTxn<'_>, bucket: &Bucket, max_depth: Option<usize>) -> StrongboxResult<u64> {
    let mut total = bucket.leaf_count(txn)?;
    let Some(depth) = deeper(max_depth) else {
        return Ok(total);
    };
    for name in bucket.nested_names(txn)? {
        if let Some(child) = bucket.nested(txn, &name)? {
            total += count(txn, &child, depth)?;
        }
    }
    Ok(total)
}

/// Depth budget for the next level down, or `None` if there is no next level.
fn deeper(max_depth: Option<usize>) -> Option<Option<usize>> {
    match max_depth {
        None => Some(None),
        Some(0) => None,
        Some(n) => Some(Some(n - 1)),
    }
}
