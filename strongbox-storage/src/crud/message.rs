//! Typed CRUD for one record type.
//!
//! [`MessageCrud`] binds a key function and JSON payloads onto [`Crud`] so
//! domain stores work with their record type directly. It operates on the
//! direct leaves of its bucket; nested per-parent collections get their own
//! `MessageCrud` over a nested [`BucketRef`].

use std::fmt;
use std::marker::PhantomData;

use serde::de::DeserializeOwned;
use serde::Serialize;
use strongbox_core::{KeyPath, StrongboxError, StrongboxResult, WriteResult};

use super::generic::{BatchRead, Crud, EntryCodec};
use crate::bucket::BucketRef;

/// Extracts the primary key of a record.
pub type KeyFn<T> = fn(&T) -> Vec<u8>;

/// JSON payloads keyed by a [`KeyFn`].
pub struct JsonCodec<T> {
    key_fn: KeyFn<T>,
    _marker: PhantomData<fn() -> T>,
}

impl<T> JsonCodec<T> {
    pub fn new(key_fn: KeyFn<T>) -> Self {
        Self {
            key_fn,
            _marker: PhantomData,
        }
    }

    pub fn key_of(&self, item: &T) -> Vec<u8> {
        (self.key_fn)(item)
    }
}

impl<T> EntryCodec for JsonCodec<T>
where
    T: Serialize + DeserializeOwned,
{
    type Item = T;

    fn encode(&self, item: &T) -> StrongboxResult<(Vec<u8>, Vec<u8>)> {
        let value = serde_json::to_vec(item).map_err(StrongboxError::serialization)?;
        Ok((self.key_of(item), value))
    }

    fn decode(&self, bytes: &[u8]) -> StrongboxResult<T> {
        serde_json::from_slice(bytes).map_err(StrongboxError::serialization)
    }
}

/// CRUD over records of type `T` stored under their primary key.
pub struct MessageCrud<T> {
    crud: Crud<JsonCodec<T>>,
}

impl<T> fmt::Debug for MessageCrud<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MessageCrud")
            .field("crud", &self.crud)
            .finish()
    }
}

impl<T> MessageCrud<T>
where
    T: Serialize + DeserializeOwned,
{
    pub fn new(bucket: BucketRef, key_fn: KeyFn<T>) -> Self {
        Self {
            crud: Crud::new(bucket, JsonCodec::new(key_fn)),
        }
    }

    pub fn bucket(&self) -> &BucketRef {
        self.crud.bucket()
    }

    /// The underlying key-path CRUD.
    pub fn crud(&self) -> &Crud<JsonCodec<T>> {
        &self.crud
    }

    pub fn key_of(&self, item: &T) -> Vec<u8> {
        self.crud.codec().key_of(item)
    }

    pub fn write_version(&self) -> u64 {
        self.crud.write_version()
    }

    pub fn read(&self, key: &[u8]) -> StrongboxResult<Option<T>> {
        self.crud.read(&KeyPath::from(key))
    }

    /// See [`BatchRead`]: consume `values` and `missing` in lockstep with
    /// `keys`, never by indexing `values` with an input position.
    pub fn read_batch<K: AsRef<[u8]>>(&self, keys: &[K]) -> StrongboxResult<BatchRead<T>> {
        let paths: Vec<KeyPath> = keys.iter().map(|k| KeyPath::from(k.as_ref())).collect();
        self.crud.read_batch(&paths)
    }

    /// Every record in the bucket, in primary-key byte order.
    pub fn read_all(&self) -> StrongboxResult<Vec<T>> {
        Ok(self
            .crud
            .read_all(Some(0), &KeyPath::root())?
            .into_iter()
            .map(|entry| entry.value)
            .collect())
    }

    pub fn count(&self) -> StrongboxResult<u64> {
        self.crud.count_leaves(Some(0), &KeyPath::root())
    }

    pub fn exists(&self, key: &[u8]) -> StrongboxResult<bool> {
        self.crud.exists(&KeyPath::from(key))
    }

    pub fn create(&self, item: &T) -> WriteResult {
        self.crud.create(item, &KeyPath::root())
    }

    pub fn create_batch(&self, items: &[T]) -> WriteResult {
        self.crud.create_batch(items, &KeyPath::root())
    }

    pub fn update(&self, item: &T) -> WriteResult {
        self.crud.update(item, &KeyPath::root())
    }

    pub fn update_batch(&self, items: &[T]) -> WriteResult {
        self.crud.update_batch(items, &KeyPath::root())
    }

    pub fn upsert(&self, item: &T) -> WriteResult {
        self.crud.upsert(item, &KeyPath::root())
    }

    pub fn upsert_batch(&self, items: &[T]) -> WriteResult {
        self.crud.upsert_batch(items, &KeyPath::root())
    }

    pub fn delete(&self, key: &[u8]) -> WriteResult {
        self.crud.delete(&KeyPath::from(key))
    }

    pub fn delete_batch<K: AsRef<[u8]>>(&self, keys: &[K]) -> WriteResult {
        let paths: Vec<KeyPath> = keys.iter().map(|k| KeyPath::from(k.as_ref())).collect();
        self.crud.delete_batch(&paths)
    }
}
