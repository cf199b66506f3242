//! Storage abstraction for boardroom memberships.
//!
//! Backend crates (e.g., boardroom-store-sqlite, boardroom-store-memory) implement the
//! traits in [`store`] so the membership engine never depends on a concrete database
//! engine or schema details.

mod store;
mod types;

pub use store::*;
pub use types::*;

use thiserror::Error;

/// Uniform error type for all storage backends.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("not found")]
    NotFound,
    #[error("already exists")]
    AlreadyExists,
    /// Concurrent writer contention (serialization failure, busy database).
    /// Retrying the whole operation is safe.
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("backend error: {0}")]
    Backend(String),
}

impl StoreError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, StoreError::Conflict(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_conflicts_are_retryable() {
        assert!(StoreError::Conflict("busy".into()).is_retryable());
        assert!(!StoreError::NotFound.is_retryable());
        assert!(!StoreError::AlreadyExists.is_retryable());
        assert!(!StoreError::Backend("disk".into()).is_retryable());
    }

    #[test]
    fn store_error_display() {
        assert_eq!(StoreError::NotFound.to_string(), "not found");
        assert!(StoreError::Backend("disk full".into())
            .to_string()
            .contains("disk full"));
    }
}
