//! Root storage context over one LMDB environment.
//!
//! A [`Store`] is opened once at process start and handed to every domain
//! store explicitly. It owns the environment and a registry of the named
//! databases (top-level containers) registered so far.
//!
//! # Thread Safety
//!
//! LMDB allows one write transaction at a time and any number of concurrent
//! read transactions. Database handles are created only inside
//! [`Store::ensure_bucket`] / [`Store::ensure_unique_bucket`] and then looked
//! up from the registry, so no transaction other than registration ever
//! opens a database handle.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, RwLock};

use heed::types::Bytes;
use heed::{Database, Env, EnvFlags, EnvOpenOptions, RoTxn, RwTxn};
use strongbox_core::{StorageConfig, StorageError, StrongboxError, StrongboxResult};
use tracing::info;

use crate::bucket::BucketRef;
use crate::unique::UniqueKeyIndex;

/// Raw byte database, one per top-level container.
pub(crate) type RawDb = Database<Bytes, Bytes>;

/// Suffix of the forward (secondary key -> sentinel) index container.
pub const UNIQUE_SUFFIX: &str = "-unique";
/// Suffix of the reverse (primary key -> secondary key) index container.
pub const MAPPER_SUFFIX: &str = "-mapper";

/// Map engine failures onto [`StorageError::TransactionFailed`].
pub(crate) trait EngineResultExt<T> {
    fn engine(self) -> StrongboxResult<T>;
}

impl<T> EngineResultExt<T> for Result<T, heed::Error> {
    fn engine(self) -> StrongboxResult<T> {
        self.map_err(StrongboxError::transaction)
    }
}

/// Process-wide handle to the embedded store. Cheap to clone.
#[derive(Clone)]
pub struct Store {
    inner: Arc<StoreInner>,
}

struct StoreInner {
    env: Env,
    config: StorageConfig,
    buckets: RwLock<HashMap<String, RawDb>>,
}

impl fmt::Debug for Store {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Store")
            .field("path", &self.inner.config.path)
            .finish_non_exhaustive()
    }
}

impl Store {
    /// Open (or create) the store described by `config`.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The config fails validation
    /// - The parent directory cannot be created
    /// - The LMDB environment cannot be opened
    pub fn open(config: &StorageConfig) -> StrongboxResult<Self> {
        config.validate()?;

        if let Some(parent) = config.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(StrongboxError::transaction)?;
            }
        }

        // SAFETY: the data file is only ever opened through this type, once per
        // process, and is not truncated or modified by anything else while mapped.
        let env = unsafe {
            EnvOpenOptions::new()
                .map_size(config.map_size_bytes())
                .max_dbs(config.max_dbs)
                .max_readers(config.max_readers)
                .flags(EnvFlags::NO_SUB_DIR)
                .open(&config.path)
        }
        .engine()?;

        info!(
            path = %config.path.display(),
            map_size_mb = config.map_size_mb,
            max_dbs = config.max_dbs,
            "Opened store"
        );

        Ok(Self {
            inner: Arc::new(StoreInner {
                env,
                config: config.clone(),
                buckets: RwLock::new(HashMap::new()),
            }),
        })
    }

    pub fn config(&self) -> &StorageConfig {
        &self.inner.config
    }

    pub fn path(&self) -> &std::path::Path {
        &self.inner.config.path
    }

    /// Make sure the top-level container `name` exists and return a ref to it.
    ///
    /// Idempotent; meant to be called once when a domain store is built.
    pub fn ensure_bucket(&self, name: &str) -> StrongboxResult<BucketRef> {
        self.register(&[name.to_string()])?;
        Ok(self.bucket(name))
    }

    /// Register `name` together with its `-unique` and `-mapper` index
    /// containers in one transaction.
    pub fn ensure_unique_bucket(&self, name: &str) -> StrongboxResult<(BucketRef, UniqueKeyIndex)> {
        self.register(&[
            name.to_string(),
            format!("{name}{UNIQUE_SUFFIX}"),
            format!("{name}{MAPPER_SUFFIX}"),
        ])?;
        Ok((self.bucket(name), self.unique_index(name)?))
    }

    /// A ref to the top-level container `name`. Does not create it; access
    /// fails with `NoSuchContainer` until the container is registered.
    pub fn bucket(&self, name: &str) -> BucketRef {
        BucketRef::top_level(self.clone(), name)
    }

    /// The unique-key index registered alongside bucket `name`.
    pub fn unique_index(&self, name: &str) -> StrongboxResult<UniqueKeyIndex> {
        let unique_name = format!("{name}{UNIQUE_SUFFIX}");
        let mapper_name = format!("{name}{MAPPER_SUFFIX}");
        let unique = self
            .database(&unique_name)?
            .ok_or(StorageError::NoSuchContainer { path: unique_name })?;
        let mapper = self
            .database(&mapper_name)?
            .ok_or(StorageError::NoSuchContainer { path: mapper_name })?;
        Ok(UniqueKeyIndex::new(name, unique, mapper))
    }

    /// Run `f` inside a read-only transaction.
    pub fn view<R>(&self, f: impl FnOnce(&RoTxn<'_>) -> StrongboxResult<R>) -> StrongboxResult<R> {
        let rtxn = self.read_txn()?;
        f(&rtxn)
    }

    /// Run `f` inside a read-write transaction, committing on `Ok` and
    /// aborting on `Err`.
    pub fn update<R>(
        &self,
        f: impl FnOnce(&mut RwTxn<'_>) -> StrongboxResult<R>,
    ) -> StrongboxResult<R> {
        let mut wtxn = self.write_txn()?;
        let out = f(&mut wtxn)?;
        wtxn.commit().engine()?;
        Ok(out)
    }

    pub(crate) fn read_txn(&self) -> StrongboxResult<RoTxn<'_>> {
        self.inner.env.read_txn().engine()
    }

    pub(crate) fn write_txn(&self) -> StrongboxResult<RwTxn<'_>> {
        self.inner.env.write_txn().engine()
    }

    pub(crate) fn database(&self, name: &str) -> StrongboxResult<Option<RawDb>> {
        let buckets = self
            .inner
            .buckets
            .read()
            .map_err(|_| StorageError::LockPoisoned)?;
        Ok(buckets.get(name).copied())
    }

    fn register(&self, names: &[String]) -> StrongboxResult<()> {
        for name in names {
            if name.is_empty() {
                return Err(StorageError::InvalidKey {
                    reason: "container name must not be empty".to_string(),
                }
                .into());
            }
        }

        // The write transaction is taken before the registry lock; crud writes
        // take them in the same order.
        let mut wtxn = self.write_txn()?;
        let mut created = Vec::with_capacity(names.len());
        for name in names {
            if self.database(name)?.is_some() {
                continue;
            }
            let db: RawDb = self
                .inner
                .env
                .create_database(&mut wtxn, Some(name.as_str()))
                .engine()?;
            created.push((name.clone(), db));
        }
        wtxn.commit().engine()?;

        let mut buckets = self
            .inner
            .buckets
            .write()
            .map_err(|_| StorageError::LockPoisoned)?;
        for (name, db) in created {
            info!(bucket = %name, "Registered container");
            buckets.insert(name, db);
        }
        Ok(())
    }
}
