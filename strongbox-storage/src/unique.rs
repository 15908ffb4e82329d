//! Secondary unique-key index.
//!
//! Each unique-key bucket `b` has two companion containers:
//!
//! - `b-unique`: secondary key -> empty sentinel (global uniqueness)
//! - `b-mapper`: primary key -> secondary key (lookup by primary key)
//!
//! At every committed state `b-mapper` is the exact inverse of the key set
//! of `b-unique`. Every operation runs inside the caller's write transaction
//! so the index moves together with the record it guards; an error leaves
//! both maps untouched once the caller aborts.

use std::fmt;

use heed::{RoTxn, RwTxn};
use strongbox_core::{StorageError, StrongboxError, StrongboxResult};
use tracing::debug;

use crate::store::{EngineResultExt, RawDb};

const SENTINEL: &[u8] = &[];

/// Forward and reverse maps of one bucket's secondary key.
#[derive(Clone)]
pub struct UniqueKeyIndex {
    bucket: String,
    unique: RawDb,
    mapper: RawDb,
}

impl fmt::Debug for UniqueKeyIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UniqueKeyIndex")
            .field("bucket", &self.bucket)
            .finish()
    }
}

impl UniqueKeyIndex {
    pub(crate) fn new(bucket: &str, unique: RawDb, mapper: RawDb) -> Self {
        Self {
            bucket: bucket.to_string(),
            unique,
            mapper,
        }
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    /// Register `secondary_key` for `primary_key`.
    ///
    /// Re-registering the identical pair is a no-op. Fails if the secondary
    /// key is taken, or if the primary key already maps to a different
    /// secondary key (renames go through [`UniqueKeyIndex::update_key`]).
    pub fn check_and_insert(
        &self,
        txn: &mut RwTxn<'_>,
        primary_key: &str,
        secondary_key: &str,
    ) -> StrongboxResult<()> {
        validate(primary_key, "primary key")?;
        validate(secondary_key, "unique key")?;

        match self.current_key(txn, primary_key)? {
            Some(current) if current == secondary_key => return Ok(()),
            Some(current) => {
                debug!(
                    bucket = %self.bucket,
                    primary_key,
                    current = %current,
                    "Primary key already has a unique key"
                );
                return Err(StorageError::AlreadyExists {
                    path: format!("{}{}/{primary_key}", self.bucket, crate::store::MAPPER_SUFFIX),
                }
                .into());
            }
            None => {}
        }

        self.ensure_free(txn, secondary_key)?;
        self.insert(txn, primary_key, secondary_key)
    }

    /// The secondary key currently mapped from `primary_key`, if any.
    pub fn current_key(
        &self,
        txn: &RoTxn<'_>,
        primary_key: &str,
    ) -> StrongboxResult<Option<String>> {
        match self.mapper.get(txn, primary_key.as_bytes()).engine()? {
            Some(bytes) => String::from_utf8(bytes.to_vec())
                .map(Some)
                .map_err(StrongboxError::serialization),
            None => Ok(None),
        }
    }

    /// Move `primary_key` to `new_secondary_key`, dropping its old mapping.
    ///
    /// The collision check runs before the old mapping is touched, so a
    /// failed rename changes nothing even if the caller ignores the error.
    pub fn update_key(
        &self,
        txn: &mut RwTxn<'_>,
        primary_key: &str,
        new_secondary_key: &str,
    ) -> StrongboxResult<()> {
        validate(primary_key, "primary key")?;
        validate(new_secondary_key, "unique key")?;

        let current = self.current_key(txn, primary_key)?;
        if current.as_deref() == Some(new_secondary_key) {
            return Ok(());
        }
        self.ensure_free(txn, new_secondary_key)?;

        if let Some(old) = current {
            self.unique.delete(txn, old.as_bytes()).engine()?;
        }
        self.insert(txn, primary_key, new_secondary_key)
    }

    /// Drop the mapping of `primary_key`. Fails if there is none.
    pub fn remove_key(&self, txn: &mut RwTxn<'_>, primary_key: &str) -> StrongboxResult<()> {
        let current = self.current_key(txn, primary_key)?.ok_or_else(|| {
            StorageError::UniqueKeyNotFound {
                bucket: self.bucket.clone(),
                primary_key: primary_key.to_string(),
            }
        })?;
        self.unique.delete(txn, current.as_bytes()).engine()?;
        self.mapper.delete(txn, primary_key.as_bytes()).engine()?;
        Ok(())
    }

    /// Whether `secondary_key` is registered to any primary key.
    pub fn is_taken(&self, txn: &RoTxn<'_>, secondary_key: &str) -> StrongboxResult<bool> {
        Ok(self
            .unique
            .get(txn, secondary_key.as_bytes())
            .engine()?
            .is_some())
    }

    fn ensure_free(&self, txn: &RoTxn<'_>, secondary_key: &str) -> StrongboxResult<()> {
        if self.is_taken(txn, secondary_key)? {
            debug!(bucket = %self.bucket, key = secondary_key, "Unique key collision");
            return Err(StorageError::UniqueKeyConflict {
                bucket: self.bucket.clone(),
                key: secondary_key.to_string(),
            }
            .into());
        }
        Ok(())
    }

    fn insert(
        &self,
        txn: &mut RwTxn<'_>,
        primary_key: &str,
        secondary_key: &str,
    ) -> StrongboxResult<()> {
        self.unique
            .put(txn, secondary_key.as_bytes(), SENTINEL)
            .engine()?;
        self.mapper
            .put(txn, primary_key.as_bytes(), secondary_key.as_bytes())
            .engine()
    }
}

fn validate(key: &str, what: &str) -> StrongboxResult<()> {
    if key.is_empty() {
        return Err(StorageError::InvalidKey {
            reason: format!("{what} must not be empty"),
        }
        .into());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Store;
    use strongbox_core::StorageConfig;
    use tempfile::TempDir;

    fn create_test_index() -> (Store, UniqueKeyIndex, TempDir) {
        let temp_dir = TempDir::new().expect("TempDir creation should succeed");
        let config = StorageConfig::new(temp_dir.path().join("store.db")).with_map_size_mb(16);
        let store = Store::open(&config).expect("store open should succeed");
        let (_, index) = store
            .ensure_unique_bucket("roles")
            .expect("unique bucket registration");
        (store, index, temp_dir)
    }

    #[test]
    fn test_insert_and_lookup() {
        let (store, index, _temp_dir) = create_test_index();
        store
            .update(|txn| index.check_and_insert(txn, "id1", "admin"))
            .expect("insert");
        let current = store
            .view(|txn| index.current_key(txn, "id1"))
            .expect("lookup");
        assert_eq!(current.as_deref(), Some("admin"));
    }

    #[test]
    fn test_collision_with_other_primary_key() {
        let (store, index, _temp_dir) = create_test_index();
        store
            .update(|txn| index.check_and_insert(txn, "id1", "name"))
            .expect("insert");
        let err = store
            .update(|txn| index.check_and_insert(txn, "id2", "name"))
            .expect_err("collision should fail");
        assert!(err.is_conflict());

        let id2 = store
            .view(|txn| index.current_key(txn, "id2"))
            .expect("lookup");
        assert!(id2.is_none(), "failed insert must leave no mapping");
    }

    #[test]
    fn test_reinsert_same_pair_is_noop() {
        let (store, index, _temp_dir) = create_test_index();
        store
            .update(|txn| index.check_and_insert(txn, "id1", "name"))
            .expect("insert");
        store
            .update(|txn| index.check_and_insert(txn, "id1", "name"))
            .expect("same pair again");
    }

    #[test]
    fn test_second_key_for_same_primary_is_conflict() {
        let (store, index, _temp_dir) = create_test_index();
        store
            .update(|txn| index.check_and_insert(txn, "id1", "first"))
            .expect("insert");
        let err = store
            .update(|txn| index.check_and_insert(txn, "id1", "second"))
            .expect_err("second key should fail");
        assert!(err.is_conflict());
        let taken = store
            .view(|txn| index.is_taken(txn, "second"))
            .expect("lookup");
        assert!(!taken);
    }

    #[test]
    fn test_update_frees_old_key() {
        let (store, index, _temp_dir) = create_test_index();
        store
            .update(|txn| index.check_and_insert(txn, "a", "x"))
            .expect("insert");
        store
            .update(|txn| index.update_key(txn, "a", "z"))
            .expect("rename");

        let (current, old_taken) = store
            .view(|txn| Ok((index.current_key(txn, "a")?, index.is_taken(txn, "x")?)))
            .expect("lookup");
        assert_eq!(current.as_deref(), Some("z"));
        assert!(!old_taken);
    }

    #[test]
    fn test_update_collision_leaves_mapping() {
        let (store, index, _temp_dir) = create_test_index();
        store
            .update(|txn| {
                index.check_and_insert(txn, "a", "x")?;
                index.check_and_insert(txn, "b", "y")
            })
            .expect("inserts");

        // Swallow the error and commit anyway: nothing may have changed.
        store
            .update(|txn| {
                let err = index
                    .update_key(txn, "a", "y")
                    .expect_err("rename onto taken key should fail");
                assert!(err.is_conflict());
                Ok(())
            })
            .expect("commit");

        let current = store
            .view(|txn| index.current_key(txn, "a"))
            .expect("lookup");
        assert_eq!(current.as_deref(), Some("x"));
    }

    #[test]
    fn test_remove_requires_mapping() {
        let (store, index, _temp_dir) = create_test_index();
        let err = store
            .update(|txn| index.remove_key(txn, "ghost"))
            .expect_err("remove without mapping should fail");
        assert!(err.is_not_found());

        store
            .update(|txn| index.check_and_insert(txn, "id1", "name"))
            .expect("insert");
        store
            .update(|txn| index.remove_key(txn, "id1"))
            .expect("remove");
        store
            .update(|txn| index.check_and_insert(txn, "id2", "name"))
            .expect("name is free again");
    }
}
