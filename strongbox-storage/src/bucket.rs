//! Addressable handles to (possibly nested) containers.
//!
//! A [`BucketRef`] is a capability, not data: it names a container that must
//! already exist and resolves it inside whatever transaction the caller runs.
//! It never creates containers. Resolution yields an `Option<Bucket>` so that
//! absence is a checked case; `view`/`update` turn absence into
//! `StorageError::NoSuchContainer`.

use std::fmt;
use std::sync::Arc;

use heed::{RoTxn, RwTxn};
use strongbox_core::{StorageError, StrongboxResult};

use crate::layout::{self, KeyKind};
use crate::store::{EngineResultExt, RawDb, Store};

/// Reference to a top-level or nested container.
#[derive(Debug, Clone)]
pub enum BucketRef {
    /// A named database resolved directly from the store.
    TopLevel { store: Store, name: String },
    /// A named sub-container inside its parent's container.
    Nested { parent: Arc<BucketRef>, name: Vec<u8> },
}

impl BucketRef {
    pub fn top_level(store: Store, name: impl Into<String>) -> Self {
        BucketRef::TopLevel {
            store,
            name: name.into(),
        }
    }

    pub fn nested(parent: &BucketRef, name: impl AsRef<[u8]>) -> Self {
        BucketRef::Nested {
            parent: Arc::new(parent.clone()),
            name: name.as_ref().to_vec(),
        }
    }

    pub fn store(&self) -> &Store {
        match self {
            BucketRef::TopLevel { store, .. } => store,
            BucketRef::Nested { parent, .. } => parent.store(),
        }
    }

    /// Human-readable path, e.g. `clusters/c1`.
    pub fn path(&self) -> String {
        match self {
            BucketRef::TopLevel { name, .. } => name.clone(),
            BucketRef::Nested { parent, name } => {
                format!("{}/{}", parent.path(), String::from_utf8_lossy(name))
            }
        }
    }

    /// Resolve the container inside `txn`, or `None` if it does not exist.
    pub fn resolve(&self, txn: &RoTxn<'_>) -> StrongboxResult<Option<Bucket>> {
        match self {
            BucketRef::TopLevel { store, name } => {
                Ok(store.database(name)?.map(|db| Bucket::top_level(db, name)))
            }
            BucketRef::Nested { parent, name } => match parent.resolve(txn)? {
                Some(bucket) => bucket.nested(txn, name),
                None => Ok(None),
            },
        }
    }

    pub(crate) fn resolve_required(&self, txn: &RoTxn<'_>) -> StrongboxResult<Bucket> {
        self.resolve(txn)?.ok_or_else(|| {
            StorageError::NoSuchContainer { path: self.path() }.into()
        })
    }

    /// Apply `f` to the container inside a read-only transaction.
    pub fn view<R>(
        &self,
        f: impl FnOnce(&RoTxn<'_>, &Bucket) -> StrongboxResult<R>,
    ) -> StrongboxResult<R> {
        self.store().view(|txn| {
            let bucket = self.resolve_required(txn)?;
            f(txn, &bucket)
        })
    }

    /// Apply `f` to the container inside a read-write transaction.
    pub fn update<R>(
        &self,
        f: impl FnOnce(&mut RwTxn<'_>, &Bucket) -> StrongboxResult<R>,
    ) -> StrongboxResult<R> {
        self.store().update(|txn| self.update_in(txn, f))
    }

    /// Apply `f` to the container inside a caller-owned write transaction.
    pub fn update_in<R>(
        &self,
        txn: &mut RwTxn<'_>,
        f: impl FnOnce(&mut RwTxn<'_>, &Bucket) -> StrongboxResult<R>,
    ) -> StrongboxResult<R> {
        let bucket = self.resolve_required(txn)?;
        f(txn, &bucket)
    }
}

/// A container resolved inside a transaction.
#[derive(Clone)]
pub struct Bucket {
    db: RawDb,
    prefix: Vec<u8>,
    path: String,
}

impl fmt::Debug for Bucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Bucket").field("path", &self.path).finish()
    }
}

impl Bucket {
    fn top_level(db: RawDb, name: &str) -> Self {
        Self {
            db,
            prefix: Vec::new(),
            path: name.to_string(),
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    fn child_path(&self, key: &[u8]) -> String {
        format!("{}/{}", self.path, String::from_utf8_lossy(key))
    }

    fn incompatible(&self, key: &[u8], expected: KeyKind, found: KeyKind) -> StorageError {
        StorageError::IncompatibleValue {
            path: self.child_path(key),
            expected: expected.describe(),
            found: found.describe(),
        }
    }

    /// The stored value of leaf `key`, or `None`.
    pub fn get<'t>(&self, txn: &'t RoTxn<'_>, key: &[u8]) -> StrongboxResult<Option<&'t [u8]>> {
        layout::validate_key(key)?;
        let raw = layout::leaf_key(&self.prefix, key);
        self.db.get(txn, raw.as_slice()).engine()
    }

    fn has_container(&self, txn: &RoTxn<'_>, name: &[u8]) -> StrongboxResult<bool> {
        let raw = layout::container_key(&self.prefix, name);
        Ok(self.db.get(txn, raw.as_slice()).engine()?.is_some())
    }

    /// The nested container `name`, or `None` if absent.
    pub fn nested(&self, txn: &RoTxn<'_>, name: &[u8]) -> StrongboxResult<Option<Bucket>> {
        layout::validate_key(name)?;
        if !self.has_container(txn, name)? {
            return Ok(None);
        }
        Ok(Some(Bucket {
            db: self.db,
            prefix: layout::nested_prefix(&self.prefix, name)?,
            path: self.child_path(name),
        }))
    }

    /// The nested container `name`, creating it if needed. Fails if `name`
    /// already holds a value.
    pub fn create_nested_if_missing(
        &self,
        txn: &mut RwTxn<'_>,
        name: &[u8],
    ) -> StrongboxResult<Bucket> {
        if let Some(existing) = self.nested(txn, name)? {
            return Ok(existing);
        }
        if self.get(txn, name)?.is_some() {
            return Err(self.incompatible(name, KeyKind::Container, KeyKind::Leaf).into());
        }
        let marker = layout::container_key(&self.prefix, name);
        let empty: &[u8] = &[];
        self.db.put(txn, marker.as_slice(), empty).engine()?;
        Ok(Bucket {
            db: self.db,
            prefix: layout::nested_prefix(&self.prefix, name)?,
            path: self.child_path(name),
        })
    }

    /// Store `value` at leaf `key`. Fails if `key` names a nested container.
    pub fn put(&self, txn: &mut RwTxn<'_>, key: &[u8], value: &[u8]) -> StrongboxResult<()> {
        layout::validate_key(key)?;
        if self.has_container(txn, key)? {
            return Err(self.incompatible(key, KeyKind::Leaf, KeyKind::Container).into());
        }
        let raw = layout::leaf_key(&self.prefix, key);
        self.db.put(txn, raw.as_slice(), value).engine()
    }

    /// Remove leaf `key`; returns whether it existed.
    pub fn delete(&self, txn: &mut RwTxn<'_>, key: &[u8]) -> StrongboxResult<bool> {
        layout::validate_key(key)?;
        if self.has_container(txn, key)? {
            return Err(self.incompatible(key, KeyKind::Leaf, KeyKind::Container).into());
        }
        let raw = layout::leaf_key(&self.prefix, key);
        self.db.delete(txn, raw.as_slice()).engine()
    }

    /// Remove the nested container `name` and everything below it; returns
    /// whether it existed.
    pub fn delete_nested(&self, txn: &mut RwTxn<'_>, name: &[u8]) -> StrongboxResult<bool> {
        if !self.has_container(txn, name)? {
            return Ok(false);
        }
        let inner = layout::nested_prefix(&self.prefix, name)?;
        let keys = {
            let mut keys = Vec::new();
            for item in self.db.prefix_iter(txn, inner.as_slice()).engine()? {
                let (key, _) = item.engine()?;
                keys.push(key.to_vec());
            }
            keys
        };
        for key in keys {
            self.db.delete(txn, key.as_slice()).engine()?;
        }
        let marker = layout::container_key(&self.prefix, name);
        self.db.delete(txn, marker.as_slice()).engine()?;
        Ok(true)
    }

    /// Direct leaves as `(key, value)` pairs in key order.
    pub fn leaves<'t>(&self, txn: &'t RoTxn<'_>) -> StrongboxResult<Vec<(&'t [u8], &'t [u8])>> {
        let range = layout::leaf_range(&self.prefix);
        let mut out = Vec::new();
        for item in self.db.prefix_iter(txn, range.as_slice()).engine()? {
            let (key, value) = item.engine()?;
            out.push((&key[range.len()..], value));
        }
        Ok(out)
    }

    /// Names of the direct nested containers in key order.
    pub fn nested_names(&self, txn: &RoTxn<'_>) -> StrongboxResult<Vec<Vec<u8>>> {
        let range = layout::container_range(&self.prefix);
        let mut out = Vec::new();
        for item in self.db.prefix_iter(txn, range.as_slice()).engine()? {
            let (key, _) = item.engine()?;
            out.push(key[range.len()..].to_vec());
        }
        Ok(out)
    }

    pub fn has_nested(&self, txn: &RoTxn<'_>) -> StrongboxResult<bool> {
        let range = layout::container_range(&self.prefix);
        let mut iter = self.db.prefix_iter(txn, range.as_slice()).engine()?;
        match iter.next() {
            Some(item) => item.engine().map(|_| true),
            None => Ok(false),
        }
    }

    /// Number of direct leaves, without decoding any value.
    ///
    /// A top-level container without nested containers holds nothing but
    /// leaves, so the engine's entry count answers in O(1).
    pub fn leaf_count(&self, txn: &RoTxn<'_>) -> StrongboxResult<u64> {
        if self.prefix.is_empty() && !self.has_nested(txn)? {
            return self.db.len(txn).engine();
        }
        let range = layout::leaf_range(&self.prefix);
        let mut count = 0u64;
        for item in self.db.prefix_iter(txn, range.as_slice()).engine()? {
            item.engine()?;
            count += 1;
        }
        Ok(count)
    }

    /// Decode every stored key below this container; returns how many there are.
    pub fn check_layout(&self, txn: &RoTxn<'_>) -> StrongboxResult<usize> {
        let mut checked = 0usize;
        let mut check = |item: heed::Result<(&[u8], &[u8])>| -> StrongboxResult<()> {
            let (key, _) = item.engine()?;
            layout::decode_relative(&self.prefix, key)?;
            checked += 1;
            Ok(())
        };
        // LMDB rejects an empty range key, so a top-level container scans the whole database.
        if self.prefix.is_empty() {
            for item in self.db.iter(txn).engine()? {
                check(item)?;
            }
        } else {
            for item in self.db.prefix_iter(txn, self.prefix.as_slice()).engine()? {
                check(item)?;
            }
        }
        Ok(checked)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strongbox_core::{ErrorKind, StorageConfig};
    use tempfile::TempDir;

    fn create_test_store() -> (Store, TempDir) {
        let temp_dir = TempDir::new().expect("TempDir creation should succeed");
        let config = StorageConfig::new(temp_dir.path().join("store.db")).with_map_size_mb(16);
        let store = Store::open(&config).expect("store open should succeed");
        (store, temp_dir)
    }

    #[test]
    fn test_unregistered_bucket_fails() {
        let (store, _temp_dir) = create_test_store();
        let err = store
            .bucket("missing")
            .view(|_, _| Ok(()))
            .expect_err("unregistered bucket should fail");
        assert!(err.is_not_found());
        assert!(err.to_string().contains("missing"));
    }

    #[test]
    fn test_nested_ref_requires_container() {
        let (store, _temp_dir) = create_test_store();
        let parent = store.ensure_bucket("clusters").expect("registration");
        let child = BucketRef::nested(&parent, "c1");

        let err = child
            .update(|txn, b| b.put(txn, b"k", b"v"))
            .expect_err("nested ref must not auto-create");
        assert!(err.is_not_found());
        assert_eq!(child.path(), "clusters/c1");

        parent
            .update(|txn, b| b.create_nested_if_missing(txn, b"c1").map(|_| ()))
            .expect("create nested");
        child
            .update(|txn, b| b.put(txn, b"k", b"v"))
            .expect("put into nested");
        let value = child
            .view(|txn, b| Ok(b.get(txn, b"k")?.map(<[u8]>::to_vec)))
            .expect("view nested");
        assert_eq!(value, Some(b"v".to_vec()));
    }

    #[test]
    fn test_leaf_and_container_cannot_share_a_key() {
        let (store, _temp_dir) = create_test_store();
        let bucket = store.ensure_bucket("mixed").expect("registration");

        bucket
            .update(|txn, b| b.put(txn, b"x", b"value"))
            .expect("put leaf");
        let err = bucket
            .update(|txn, b| b.create_nested_if_missing(txn, b"x").map(|_| ()))
            .expect_err("container over leaf should fail");
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);

        bucket
            .update(|txn, b| b.create_nested_if_missing(txn, b"y").map(|_| ()))
            .expect("create container");
        let err = bucket
            .update(|txn, b| b.put(txn, b"y", b"value"))
            .expect_err("leaf over container should fail");
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    }

    #[test]
    fn test_leaf_count_uses_stats_and_walk() {
        let (store, _temp_dir) = create_test_store();
        let bucket = store.ensure_bucket("counted").expect("registration");

        bucket
            .update(|txn, b| {
                for i in 0..5u8 {
                    b.put(txn, &[b'k', i], b"v")?;
                }
                Ok(())
            })
            .expect("puts");
        let flat = bucket.view(|txn, b| b.leaf_count(txn)).expect("count");
        assert_eq!(flat, 5);

        bucket
            .update(|txn, b| {
                let child = b.create_nested_if_missing(txn, b"child")?;
                child.put(txn, b"inner", b"v")
            })
            .expect("nested put");
        let direct = bucket.view(|txn, b| b.leaf_count(txn)).expect("count");
        assert_eq!(direct, 5, "nested leaves are not direct leaves");
    }

    #[test]
    fn test_delete_nested_removes_subtree() {
        let (store, _temp_dir) = create_test_store();
        let bucket = store.ensure_bucket("tree").expect("registration");

        bucket
            .update(|txn, b| {
                let child = b.create_nested_if_missing(txn, b"child")?;
                child.put(txn, b"a", b"1")?;
                let grandchild = child.create_nested_if_missing(txn, b"gc")?;
                grandchild.put(txn, b"b", b"2")?;
                b.put(txn, b"sibling", b"3")
            })
            .expect("build tree");

        let removed = bucket
            .update(|txn, b| b.delete_nested(txn, b"child"))
            .expect("delete subtree");
        assert!(removed);

        let (names, remaining) = bucket
            .view(|txn, b| Ok((b.nested_names(txn)?, b.check_layout(txn)?)))
            .expect("view");
        assert!(names.is_empty());
        assert_eq!(remaining, 1, "only the sibling leaf remains");
    }

    #[test]
    fn test_check_layout_on_flat_top_level_bucket() {
        let (store, _temp_dir) = create_test_store();
        let bucket = store.ensure_bucket("flat").expect("registration");

        let empty = bucket.view(|txn, b| b.check_layout(txn)).expect("empty bucket");
        assert_eq!(empty, 0);

        bucket
            .update(|txn, b| {
                b.put(txn, b"a", b"1")?;
                b.put(txn, b"b", b"2")
            })
            .expect("puts");
        let checked = bucket.view(|txn, b| b.check_layout(txn)).expect("check layout");
        assert_eq!(checked, 2);

        let nested = bucket
            .update(|txn, b| {
                let child = b.create_nested_if_missing(txn, b"child")?;
                child.put(txn, b"inner", b"3")?;
                Ok(child)
            })
            .expect("nested put");
        let inner = bucket
            .view(|txn, _| nested.check_layout(txn))
            .expect("check nested layout");
        assert_eq!(inner, 1);
    }

    #[test]
    fn test_leaves_are_sorted_and_stripped() {
        let (store, _temp_dir) = create_test_store();
        let bucket = store.ensure_bucket("sorted").expect("registration");
        bucket
            .update(|txn, b| {
                b.put(txn, b"b", b"2")?;
                b.put(txn, b"a", b"1")?;
                b.put(txn, b"c", b"3")
            })
            .expect("puts");

        let keys = bucket
            .view(|txn, b| {
                Ok(b.leaves(txn)?
                    .into_iter()
                    .map(|(k, _)| k.to_vec())
                    .collect::<Vec<_>>())
            })
            .expect("leaves");
        assert_eq!(keys, vec![b"a".to_vec(), b"b".to_vec(), b"c".to_vec()]);
    }
}
