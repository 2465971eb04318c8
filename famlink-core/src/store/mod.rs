//! Storage seams for the coordination core.
//!
//! The core requires four guarantees from a backend: conditional atomic
//! single-record updates (code redemption), ordered append with a
//! monotonic store-assigned sort key (messages), query-by-field filtering
//! (active relationships), and durable notification records. Any backend
//! offering those is substitutable behind these traits; [`MemoryStore`]
//! is the in-process implementation.
//!
//! The conditional contracts live in the trait, not at call sites: a
//! backend must implement [`PairingStore::consume_code`] and
//! [`PairingStore::insert_relationship`] as single atomic transitions,
//! never as read-then-write.

mod memory;

pub use memory::MemoryStore;

use async_trait::async_trait;
use famlink_types::{
    ConversationId, EpochMillis, Message, MessageId, MessageKind, Notification, NotificationId,
    PairCode, PairingCode, Relationship, RelationshipId, StoreResult, UserId,
};

/// A send intent, before the store assigns ordering.
///
/// Also the shape preserved on terminal send failure so the caller can
/// re-trigger the exact same send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageDraft {
    /// Target conversation.
    pub conversation_id: ConversationId,
    /// Sending user.
    pub sender_id: UserId,
    /// Message body.
    pub text: String,
    /// Message category.
    pub kind: MessageKind,
}

/// Storage for pairing codes and relationships.
#[async_trait]
pub trait PairingStore: Send + Sync {
    /// Insert a fresh pairing code.
    ///
    /// Fails with `Conflict` if a code with the same value is already
    /// resident (consumed or not); the registry retries with a new value.
    async fn insert_code(&self, code: PairingCode) -> StoreResult<()>;

    /// Remove all unconsumed codes for an issuer. Returns how many were
    /// revoked.
    async fn revoke_unconsumed(&self, issuer: &UserId) -> StoreResult<u64>;

    /// Look up a code by value.
    async fn find_code(&self, code: &PairCode) -> StoreResult<Option<PairingCode>>;

    /// Atomically mark a code consumed.
    ///
    /// This is the single conditional transition that makes redemption
    /// race-safe: exactly one of any number of concurrent callers
    /// receives the record; the rest fail with `Conflict`. Unknown codes
    /// fail with `NotFound`.
    async fn consume_code(&self, code: &PairCode) -> StoreResult<PairingCode>;

    /// Insert an active relationship.
    ///
    /// Fails with `Conflict` if the child already has an active
    /// relationship (a child pairs with exactly one parent).
    async fn insert_relationship(&self, relationship: Relationship) -> StoreResult<()>;

    /// Set a relationship inactive.
    ///
    /// Returns the record if this call performed the active→inactive
    /// transition; `None` if the relationship was already inactive or
    /// does not exist (idempotent).
    async fn deactivate_relationship(
        &self,
        id: &RelationshipId,
    ) -> StoreResult<Option<Relationship>>;

    /// Look up a relationship by id.
    async fn relationship(&self, id: &RelationshipId) -> StoreResult<Option<Relationship>>;

    /// All active relationships owned by a parent, oldest first.
    async fn active_for_parent(&self, parent: &UserId) -> StoreResult<Vec<Relationship>>;

    /// The child's active relationship, if any.
    async fn active_for_child(&self, child: &UserId) -> StoreResult<Option<Relationship>>;

    /// The active relationship whose pair derives this conversation.
    async fn active_for_conversation(
        &self,
        conversation: &ConversationId,
    ) -> StoreResult<Option<Relationship>>;

    /// Every active relationship.
    async fn active_relationships(&self) -> StoreResult<Vec<Relationship>>;

    /// Delete codes past their expiry. Returns how many were removed.
    async fn purge_expired_codes(&self, now: EpochMillis) -> StoreResult<u64>;
}

/// Ordered, append-mostly message storage.
#[async_trait]
pub trait MessageLog: Send + Sync {
    /// Append a message, assigning its sequence and a monotonically
    /// non-decreasing store timestamp. Atomic: the message is either
    /// fully visible to subsequent reads or absent.
    async fn append(&self, draft: MessageDraft) -> StoreResult<Message>;

    /// Full ordered history for a conversation ((sentAt, seq) ascending).
    async fn snapshot(&self, conversation: &ConversationId) -> StoreResult<Vec<Message>>;

    /// Look up a single message.
    async fn message(&self, id: &MessageId) -> StoreResult<Option<Message>>;

    /// Set `delivered_at` if unset. Idempotent: the first timestamp wins.
    async fn set_delivered(&self, id: &MessageId, at: EpochMillis) -> StoreResult<Message>;

    /// Set `read_at` if unset, setting `delivered_at` first if needed so
    /// a read message is always delivered. Idempotent.
    async fn set_read(&self, id: &MessageId, at: EpochMillis) -> StoreResult<Message>;
}

/// Storage for notification records.
#[async_trait]
pub trait NotificationStore: Send + Sync {
    /// Insert a notification record.
    async fn insert(&self, notification: Notification) -> StoreResult<()>;

    /// All notifications for a recipient, newest first.
    async fn for_recipient(&self, recipient: &UserId) -> StoreResult<Vec<Notification>>;

    /// Mark one of the recipient's notifications read. Fails with
    /// `NotFound` if the record is absent or belongs to someone else.
    async fn mark_read(
        &self,
        id: &NotificationId,
        recipient: &UserId,
        at: EpochMillis,
    ) -> StoreResult<Notification>;

    /// Mark all of the recipient's notifications read. Returns how many
    /// records changed.
    async fn mark_all_read(&self, recipient: &UserId, at: EpochMillis) -> StoreResult<u64>;

    /// Delete one of the recipient's notifications. Fails with `NotFound`
    /// if the record is absent or belongs to someone else.
    async fn delete(&self, id: &NotificationId, recipient: &UserId) -> StoreResult<()>;

    /// Count of the recipient's unread notifications. Always derived from
    /// the records, never cached.
    async fn unread_count(&self, recipient: &UserId) -> StoreResult<u64>;
}
