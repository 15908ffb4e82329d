//! Strongbox Storage - Embedded Typed Storage
//!
//! Typed CRUD, secondary unique-key indexes and a versioned read-through
//! cache on top of a single-file LMDB environment.
//!
//! # Layers
//!
//! - [`Store`]: the process-wide storage context and container registry
//! - [`BucketRef`]: handle to a top-level or nested container
//! - [`Crud`]: key-path addressed CRUD over an [`EntryCodec`]
//! - [`UniqueKeyIndex`]: secondary unique key kept inside the caller's transaction
//! - [`MessageCrud`]: typed CRUD for serde records
//! - [`CachedMessageCrud`]: [`MessageCrud`] fronted by a [`Cache`]
//!
//! # Example
//!
//! ```ignore
//! let store = Store::open(&StorageConfig::from_env())?;
//! let bucket = store.ensure_bucket("roles")?;
//! let roles = MessageCrud::new(bucket, |r: &Role| r.id.as_bytes().to_vec());
//! let roles = CachedMessageCrud::without_metrics(roles);
//! roles.upsert(&role)?;
//! ```

pub mod bucket;
pub mod cache;
pub mod crud;
pub mod layout;
pub mod store;
pub mod unique;

pub use bucket::{Bucket, BucketRef};
pub use cache::{
    Cache, CacheEvent, CacheMetrics, CacheStats, CacheStatsRecorder, MapCache, NoopMetrics,
};
pub use crud::{BatchRead, CachedMessageCrud, Crud, EntryCodec, JsonCodec, KeyFn, MessageCrud};
pub use store::{Store, MAPPER_SUFFIX, UNIQUE_SUFFIX};
pub use unique::UniqueKeyIndex;

pub use strongbox_core::{
    Entry, ErrorKind, KeyPath, StorageConfig, StorageError, StrongboxError, StrongboxResult,
    WriteError, WriteOutcome, WriteResult,
};
