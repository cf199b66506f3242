use boardroom_storage::StoreError;
use thiserror::Error;

/// Coarse classification callers map to their own status codes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    NotFound,
    Conflict,
    Forbidden,
    BadRequest,
    Internal,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::NotFound => "not_found",
            ErrorKind::Conflict => "conflict",
            ErrorKind::Forbidden => "forbidden",
            ErrorKind::BadRequest => "bad_request",
            ErrorKind::Internal => "internal",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Every failure the membership engine reports. Each carries a human-readable reason.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum EngineError {
    #[error("not found: {0}")]
    NotFound(String),
    /// `retryable` is set only for contention reported by the store.
    #[error("conflict: {reason}")]
    Conflict { reason: String, retryable: bool },
    #[error("forbidden: {0}")]
    Forbidden(String),
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error("internal error: {0}")]
    Internal(String),
}

impl EngineError {
    pub fn not_found(reason: impl Into<String>) -> Self {
        EngineError::NotFound(reason.into())
    }

    /// A validation conflict (duplicate membership, already owner, ...). Never retried.
    pub fn conflict(reason: impl Into<String>) -> Self {
        EngineError::Conflict {
            reason: reason.into(),
            retryable: false,
        }
    }

    pub fn forbidden(reason: impl Into<String>) -> Self {
        EngineError::Forbidden(reason.into())
    }

    pub fn bad_request(reason: impl Into<String>) -> Self {
        EngineError::BadRequest(reason.into())
    }

    pub fn internal(reason: impl Into<String>) -> Self {
        EngineError::Internal(reason.into())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            EngineError::NotFound(_) => ErrorKind::NotFound,
            EngineError::Conflict { .. } => ErrorKind::Conflict,
            EngineError::Forbidden(_) => ErrorKind::Forbidden,
            EngineError::BadRequest(_) => ErrorKind::BadRequest,
            EngineError::Internal(_) => ErrorKind::Internal,
        }
    }

    pub fn reason(&self) -> &str {
        match self {
            EngineError::NotFound(r)
            | EngineError::Forbidden(r)
            | EngineError::BadRequest(r)
            | EngineError::Internal(r) => r,
            EngineError::Conflict { reason, .. } => reason,
        }
    }

    /// Whether re-running the whole operation may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, EngineError::Conflict { retryable: true, .. })
    }

    /// Store failures while applying already-validated writes are internal errors;
    /// store contention stays a retryable conflict.
    pub(crate) fn into_write_failure(self, context: &str) -> Self {
        match self {
            e if e.is_retryable() => e,
            EngineError::Internal(reason) => EngineError::Internal(format!("{context}: {reason}")),
            other => EngineError::Internal(format!("{context}: {}", other.reason())),
        }
    }
}

impl From<StoreError> for EngineError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound => EngineError::not_found("record not found"),
            StoreError::AlreadyExists => EngineError::conflict("record already exists"),
            StoreError::Conflict(reason) => EngineError::Conflict {
                reason,
                retryable: true,
            },
            StoreError::Backend(reason) => EngineError::Internal(reason),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_errors_map_to_kinds() {
        assert_eq!(
            EngineError::from(StoreError::NotFound).kind(),
            ErrorKind::NotFound
        );
        assert_eq!(
            EngineError::from(StoreError::AlreadyExists).kind(),
            ErrorKind::Conflict
        );
        assert_eq!(
            EngineError::from(StoreError::Backend("disk".into())).kind(),
            ErrorKind::Internal
        );
    }

    #[test]
    fn only_store_conflicts_are_retryable() {
        assert!(EngineError::from(StoreError::Conflict("busy".into())).is_retryable());
        assert!(!EngineError::from(StoreError::AlreadyExists).is_retryable());
        assert!(!EngineError::conflict("already a member").is_retryable());
        assert!(!EngineError::internal("boom").is_retryable());
    }

    #[test]
    fn write_failures_become_internal() {
        let e = EngineError::not_found("gone").into_write_failure("cascade removal");
        assert_eq!(e.kind(), ErrorKind::Internal);
        assert!(e.reason().contains("cascade removal"));

        let busy = EngineError::from(StoreError::Conflict("locked".into()))
            .into_write_failure("cascade removal");
        assert!(busy.is_retryable());
    }

    #[test]
    fn display_carries_reason() {
        let e = EngineError::forbidden("cannot remove sole owner; transfer ownership first");
        assert_eq!(
            e.to_string(),
            "forbidden: cannot remove sole owner; transfer ownership first"
        );
        assert_eq!(e.kind().to_string(), "forbidden");
    }
}
