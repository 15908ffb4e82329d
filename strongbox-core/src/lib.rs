//! Strongbox Core - Shared Types
//!
//! Error taxonomy, key paths, write versions and configuration shared by the
//! storage crate and its consumers. Nothing here touches the embedded engine.

pub mod config;
pub mod error;
pub mod key;
pub mod version;

pub use config::StorageConfig;
pub use error::{ConfigError, ErrorKind, StorageError, StrongboxError, StrongboxResult};
pub use key::{Entry, KeyPath};
pub use version::{WriteError, WriteOutcome, WriteResult};
