//! The storage failure surface shared by all backends.

use thiserror::Error;

/// Errors a storage backend may return.
///
/// The taxonomy is deliberately small: callers decide retry behavior from
/// the variant alone. Only [`StoreError::Unavailable`] is transient and
/// eligible for automatic retry; the other variants describe conditions
/// that will not change on their own.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// The referenced record does not exist (or is not visible to the
    /// caller).
    #[error("not found: {0}")]
    NotFound(String),

    /// A conditional transition lost its race or a uniqueness constraint
    /// was violated.
    #[error("conflict: {0}")]
    Conflict(String),

    /// The backend is temporarily unreachable; safe to retry with backoff.
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Result type alias for storage operations.
pub type StoreResult<T> = std::result::Result<T, StoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = StoreError::Conflict("code already consumed".into());
        assert_eq!(err.to_string(), "conflict: code already consumed");
    }

    #[test]
    fn error_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<StoreError>();
    }
}
