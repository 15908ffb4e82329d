//! Error types for Strongbox operations

use thiserror::Error;

/// Storage layer errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StorageError {
    #[error("No such container: {path}")]
    NoSuchContainer { path: String },

    #[error("Entry not found at {path}")]
    NotFound { path: String },

    #[error("Entry already exists at {path}")]
    AlreadyExists { path: String },

    #[error("Incompatible value at {path}: expected {expected}, found {found}")]
    IncompatibleValue {
        path: String,
        expected: &'static str,
        found: &'static str,
    },

    #[error("Unique key {key:?} is already taken in {bucket}")]
    UniqueKeyConflict { bucket: String, key: String },

    #[error("No unique key registered for {primary_key:?} in {bucket}")]
    UniqueKeyNotFound { bucket: String, primary_key: String },

    #[error("Invalid key: {reason}")]
    InvalidKey { reason: String },

    #[error("Serialization failed: {reason}")]
    Serialization { reason: String },

    #[error("Transaction failed: {reason}")]
    TransactionFailed { reason: String },

    #[error("Storage lock poisoned")]
    LockPoisoned,
}

/// Configuration errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {reason}")]
    Io { path: String, reason: String },

    #[error("Failed to parse config TOML: {reason}")]
    Parse { reason: String },

    #[error("Invalid value for {field}: {value} - {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },
}

/// Master error type for all Strongbox errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StrongboxError {
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
}

/// Result type alias for Strongbox operations.
pub type StrongboxResult<T> = Result<T, StrongboxError>;

/// Coarse classification callers map onto their own responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// A container, entry or unique-key mapping was expected but absent.
    NotFound,
    /// Create against an existing key, or a unique-key collision.
    Conflict,
    /// A payload could not be encoded or decoded.
    Serialization,
    /// The embedded engine failed (I/O, map full, lock poisoning).
    Transaction,
    /// The caller passed a key the layout cannot represent.
    InvalidArgument,
    /// Configuration could not be loaded or is invalid.
    Config,
}

impl StorageError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            StorageError::NoSuchContainer { .. }
            | StorageError::NotFound { .. }
            | StorageError::UniqueKeyNotFound { .. } => ErrorKind::NotFound,
            StorageError::AlreadyExists { .. } | StorageError::UniqueKeyConflict { .. } => {
                ErrorKind::Conflict
            }
            StorageError::Serialization { .. } => ErrorKind::Serialization,
            StorageError::TransactionFailed { .. } | StorageError::LockPoisoned => {
                ErrorKind::Transaction
            }
            StorageError::InvalidKey { .. } | StorageError::IncompatibleValue { .. } => {
                ErrorKind::InvalidArgument
            }
        }
    }
}

impl StrongboxError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            StrongboxError::Storage(e) => e.kind(),
            StrongboxError::Config(_) => ErrorKind::Config,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.kind() == ErrorKind::NotFound
    }

    pub fn is_conflict(&self) -> bool {
        self.kind() == ErrorKind::Conflict
    }

    /// Shorthand for wrapping a serde failure.
    pub fn serialization(reason: impl ToString) -> Self {
        StorageError::Serialization {
            reason: reason.to_string(),
        }
        .into()
    }

    /// Shorthand for wrapping an engine failure.
    pub fn transaction(reason: impl ToString) -> Self {
        StorageError::TransactionFailed {
            reason: reason.to_string(),
        }
        .into()
    }
}

// =============================================================================
// TESTS
// =============================================================================
