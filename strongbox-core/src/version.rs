//! Write versions handed out by the crud layer.
//!
//! Every write attempt draws a number from a process-local monotonic counter
//! while it holds the engine's single writer lock, so versions are ordered
//! by commit order. The cache layer compares these numbers to decide whether
//! a value it is about to store is fresher than what it already holds.

use thiserror::Error;

use crate::error::{ErrorKind, StrongboxError};

/// Result of a committed write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteOutcome {
    /// Version drawn by the committing attempt.
    pub version: u64,
    /// Number of versions the write consumed, including the committing one.
    pub attempts: u64,
}

/// A failed write, with the number of versions it consumed before failing.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{error} (after {attempts} attempt(s))")]
pub struct WriteError {
    pub attempts: u64,
    #[source]
    pub error: StrongboxError,
}

impl WriteError {
    pub fn new(attempts: u64, error: impl Into<StrongboxError>) -> Self {
        Self {
            attempts,
            error: error.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        self.error.kind()
    }

    pub fn is_not_found(&self) -> bool {
        self.error.is_not_found()
    }

    pub fn is_conflict(&self) -> bool {
        self.error.is_conflict()
    }
}

impl From<WriteError> for StrongboxError {
    fn from(e: WriteError) -> Self {
        e.error
    }
}

/// Result alias for write operations.
pub type WriteResult = Result<WriteOutcome, WriteError>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StorageError;

    #[test]
    fn test_write_error_converts_with_question_mark() {
        fn inner() -> WriteResult {
            Err(WriteError::new(
                1,
                StorageError::AlreadyExists {
                    path: "roles/r1".to_string(),
                },
            ))
        }
        fn outer() -> Result<(), StrongboxError> {
            inner()?;
            Ok(())
        }

        let err = outer().expect_err("conflict should propagate");
        assert!(err.is_conflict());
    }

    #[test]
    fn test_write_error_display_mentions_attempts() {
        let err = WriteError::new(
            2,
            StorageError::TransactionFailed {
                reason: "MDB_MAP_FULL".to_string(),
            },
        );
        let msg = err.to_string();
        assert!(msg.contains("MDB_MAP_FULL"));
        assert!(msg.contains("after 2 attempt(s)"));
        assert_eq!(err.kind(), ErrorKind::Transaction);
    }
}
