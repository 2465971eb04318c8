//! Error types for the coordination components.
//!
//! Each variant maps to one class of the operation-level taxonomy:
//! validation failures surface to the caller and are never retried;
//! pairing redemption failures are surfaced verbatim (the condition is not
//! transient); a lost conditional transition is safe to retry once with a
//! fresh resource; transient store failures are retried with bounded
//! backoff before being surfaced with the original intent preserved.

use crate::store::MessageDraft;
use famlink_types::StoreError;

/// Errors from pairing registry operations.
#[derive(Debug, thiserror::Error)]
pub enum PairingError {
    /// The code is not known to the registry.
    #[error("unknown pairing code")]
    UnknownCode,

    /// The code exists but is past its expiry.
    #[error("pairing code expired")]
    Expired,

    /// The code was already redeemed.
    #[error("pairing code already consumed")]
    AlreadyConsumed,

    /// The child already has an active relationship with a parent.
    #[error("child is already paired")]
    ChildAlreadyPaired,

    /// Code generation could not produce an unused code within the
    /// configured number of attempts.
    #[error("could not allocate a unique pairing code after {attempts} attempts")]
    CodeSpace {
        /// How many generation attempts were made.
        attempts: u32,
    },

    /// The storage backend failed.
    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

/// Errors from sending a message.
#[derive(Debug, thiserror::Error)]
pub enum SendError {
    /// The message text was empty or whitespace-only.
    #[error("message text is empty")]
    EmptyText,

    /// The conversation does not resolve to an active relationship.
    #[error("conversation does not resolve to an active relationship")]
    UnknownConversation,

    /// The sender is not a member of the conversation's pair.
    #[error("sender is not a member of this conversation")]
    NotParticipant,

    /// The store stayed unavailable through every retry. The draft is
    /// preserved so the caller can re-trigger the send manually.
    #[error("send failed after {attempts} attempts: {source}")]
    RetriesExhausted {
        /// How many attempts were made.
        attempts: u32,
        /// The original send intent.
        draft: MessageDraft,
        /// The terminal store failure.
        #[source]
        source: StoreError,
    },

    /// The storage backend failed in a non-transient way.
    #[error("store error: {0}")]
    Store(StoreError),
}

/// Errors from feed subscription and typing operations.
#[derive(Debug, thiserror::Error)]
pub enum FeedError {
    /// The conversation does not resolve to an active relationship.
    #[error("conversation does not resolve to an active relationship")]
    UnknownConversation,

    /// The user is not a member of the conversation's pair.
    #[error("user is not a member of this conversation")]
    NotParticipant,

    /// The storage backend failed.
    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

/// Result type alias for pairing operations.
pub type PairingResult<T> = std::result::Result<T, PairingError>;

/// Result type alias for send operations.
pub type SendResult<T> = std::result::Result<T, SendError>;

/// Result type alias for feed operations.
pub type FeedResult<T> = std::result::Result<T, FeedError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_error_converts_into_pairing_error() {
        let err: PairingError = StoreError::Unavailable("backend down".into()).into();
        assert!(matches!(err, PairingError::Store(_)));
    }

    #[test]
    fn errors_are_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<PairingError>();
        assert_send_sync::<SendError>();
        assert_send_sync::<FeedError>();
    }
}
