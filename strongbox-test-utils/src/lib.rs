//! Strongbox Test Utilities
//!
//! Shared test infrastructure for the Strongbox workspace:
//! - Temporary stores that clean up after themselves
//! - Sample record types with key functions
//! - Proptest generators for those records
//! - Assertions on error kinds

pub use strongbox_core::{
    ErrorKind, KeyPath, StorageConfig, StorageError, StrongboxError, StrongboxResult, WriteError,
    WriteResult,
};
pub use strongbox_storage::{
    BucketRef, CachedMessageCrud, MessageCrud, Store, UniqueKeyIndex,
};

use serde::{Deserialize, Serialize};
use tempfile::TempDir;
use uuid::Uuid;

// ============================================================================
// TEMPORARY STORES
// ============================================================================

/// A [`Store`] backed by a file in a temporary directory.
///
/// The directory is removed when the `TestStore` is dropped, so keep it
/// alive for as long as the store is used.
pub struct TestStore {
    pub store: Store,
    _dir: TempDir,
}

impl TestStore {
    /// Open a small store in a fresh temporary directory.
    ///
    /// # Panics
    ///
    /// Panics if the directory or the store cannot be created.
    pub fn new() -> Self {
        let dir = TempDir::new().expect("TempDir creation should succeed");
        let config = StorageConfig::new(dir.path().join("strongbox.db")).with_map_size_mb(32);
        let store = Store::open(&config).expect("store open should succeed");
        Self { store, _dir: dir }
    }

    pub fn bucket(&self, name: &str) -> BucketRef {
        self.store
            .ensure_bucket(name)
            .expect("bucket registration should succeed")
    }

    pub fn unique_bucket(&self, name: &str) -> (BucketRef, UniqueKeyIndex) {
        self.store
            .ensure_unique_bucket(name)
            .expect("unique bucket registration should succeed")
    }

    pub fn roles(&self) -> MessageCrud<Role> {
        MessageCrud::new(self.bucket("roles"), role_key)
    }

    pub fn cached_roles(&self) -> CachedMessageCrud<Role> {
        CachedMessageCrud::without_metrics(self.roles())
    }
}

impl Default for TestStore {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// SAMPLE RECORDS
// ============================================================================

/// A role: primary key `id`, unique by `name`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Role {
    pub id: String,
    pub name: String,
    pub description: String,
}

impl Role {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            description: format!("role {id}"),
            id,
            name: name.into(),
        }
    }
}

pub fn role_key(role: &Role) -> Vec<u8> {
    role.id.as_bytes().to_vec()
}

/// A deployment stored under its cluster's nested container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Deployment {
    pub id: String,
    pub cluster_id: String,
    pub replicas: u32,
}

pub fn deployment_key(deployment: &Deployment) -> Vec<u8> {
    deployment.id.as_bytes().to_vec()
}

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

pub mod generators {
    //! Proptest strategies for the sample records.

    use super::*;
    use proptest::prelude::*;

    /// Short lowercase identifiers, so generated sets collide often.
    pub fn arb_id() -> impl Strategy<Value = String> {
        "[a-f]{1,3}"
    }

    pub fn arb_role() -> impl Strategy<Value = Role> {
        (arb_id(), "[a-z]{1,8}", ".{0,32}").prop_map(|(id, name, description)| Role {
            id,
            name,
            description,
        })
    }

    /// Roles with pairwise distinct ids.
    pub fn arb_distinct_roles(max: usize) -> impl Strategy<Value = Vec<Role>> {
        proptest::collection::btree_map(arb_id(), arb_role(), 1..=max).prop_map(|by_id| {
            by_id
                .into_iter()
                .map(|(id, role)| Role { id, ..role })
                .collect()
        })
    }

    pub fn arb_deployment() -> impl Strategy<Value = Deployment> {
        (arb_id(), "c[0-3]", 0u32..10).prop_map(|(id, cluster_id, replicas)| Deployment {
            id,
            cluster_id,
            replicas,
        })
    }
}

// ============================================================================
// FIXTURES
// ============================================================================

pub mod fixtures {
    //! Pre-built records for common scenarios.

    use super::*;

    /// A role with a random v7 id.
    pub fn random_role(name: &str) -> Role {
        Role::new(Uuid::now_v7().to_string(), name)
    }

    pub fn admin_role() -> Role {
        Role::new("role-admin", "admin")
    }

    pub fn deployment(cluster_id: &str, id: &str) -> Deployment {
        Deployment {
            id: id.to_string(),
            cluster_id: cluster_id.to_string(),
            replicas: 1,
        }
    }
}

// ============================================================================
// CUSTOM ASSERTIONS
// ============================================================================

pub mod assertions {
    //! Assertions on Strongbox error kinds.

    use super::*;

    /// Assert that a result failed with the given [`ErrorKind`].
    #[track_caller]
    pub fn assert_kind<T: std::fmt::Debug>(result: &StrongboxResult<T>, kind: ErrorKind) {
        match result {
            Err(error) => assert_eq!(error.kind(), kind, "Wrong error kind: {error}"),
            Ok(value) => panic!("Expected {kind:?} error, got Ok({value:?})"),
        }
    }

    /// Assert that a write failed with the given [`ErrorKind`].
    #[track_caller]
    pub fn assert_write_kind(result: &WriteResult, kind: ErrorKind) {
        match result {
            Err(error) => assert_eq!(error.kind(), kind, "Wrong error kind: {error}"),
            Ok(outcome) => panic!("Expected {kind:?} error, got Ok({outcome:?})"),
        }
    }

    #[track_caller]
    pub fn assert_conflict<T: std::fmt::Debug>(result: &StrongboxResult<T>) {
        assert_kind(result, ErrorKind::Conflict);
    }

    #[track_caller]
    pub fn assert_not_found<T: std::fmt::Debug>(result: &StrongboxResult<T>) {
        assert_kind(result, ErrorKind::NotFound);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_fixture_round_trip() {
        let test_store = TestStore::new();
        let roles = test_store.roles();
        roles.create(&fixtures::admin_role()).expect("create");
        assert_eq!(
            roles.read(b"role-admin").expect("read"),
            Some(fixtures::admin_role())
        );
    }

    #[test]
    fn test_random_roles_have_distinct_ids() {
        let a = fixtures::random_role("a");
        let b = fixtures::random_role("b");
        assert_ne!(a.id, b.id);
    }
}
